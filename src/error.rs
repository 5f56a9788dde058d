//! # Error kinds
//!
//! Mirrors the teacher's per-layer `thiserror::Error` enums (`disk_base::CommandError`,
//! `fs::Error`), but collapsed into the six kinds spec.md §7 names so callers can match on
//! kind without downcasting a `DYNERR`. Workers still return `DYNERR` at their public
//! boundary, constructed from `CoreError`, for parity with the teacher's fallible functions.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Unrecognized stream contents, corrupted container, unreadable fork.
    #[error("structural error: {0}")]
    Structural(String),
    /// Name collision, path too long, resource fork not representable, damaged entry.
    #[error("policy error: {0}")]
    Policy(String),
    /// User answered Cancel to a prompt.
    #[error("operation cancelled by user")]
    Consent,
    /// Import/export converter failure.
    #[error("conversion error: {0}")]
    Conversion(String),
    /// Could not set dates, extended attributes, or permission bits.
    #[error("attribute error: {0}")]
    Attribute(String),
    /// I/O failure unrelated to format (disk full, permission denied).
    #[error("fatal I/O error: {0}")]
    Fatal(#[from] std::io::Error),
    /// No commit transaction is open where one was required.
    #[error("no transaction is open")]
    NoTransaction,
    /// A second transaction was requested while one was already open.
    #[error("a transaction is already open")]
    TransactionAlreadyOpen,
    /// Node tree topology was violated (dangling child, closed stream, broken parent link).
    #[error("node tree invariant violated: {0}")]
    TreeInvariant(String),
    /// `PartSource` was used out of its required open/read/rewind/close sequence.
    #[error("part source used out of sequence: {0}")]
    PartSourceSequence(String),
}

impl CoreError {
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }
    pub fn attribute(msg: impl Into<String>) -> Self {
        Self::Attribute(msg.into())
    }
}
