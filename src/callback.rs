//! # Callback protocol (C1)
//!
//! A single polymorphic callback is used by every long-running worker (spec.md §4.1). The
//! caller supplies one `Callback` taking a [`CallbackFacts`] and returning a [`CallbackResult`].
//! Modeled after the teacher's `clap`-free command layer style: plain enums, `thiserror` only
//! where fallibility is real, everything else matched exhaustively.

use std::fmt;

/// Why the worker is calling back into the host.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Reason {
    /// Informational; not a suspension point.
    Progress,
    /// A suspension point: worker is asking whether to continue.
    QueryCancel,
    /// The destination cannot hold the entry's resource fork.
    ResourceForkIgnored,
    /// The adjusted destination name already exists.
    FileNameExists,
    /// The adjusted destination name exceeds the target's length limit.
    PathTooLong,
    /// Could not set dates/permissions/extended attributes on the output.
    AttrFailure,
    /// Creating or replacing the destination entry failed.
    OverwriteFailure,
    /// An import/export converter failed.
    ConversionFailure,
    /// Any other non-recoverable-per-entry failure.
    Failure,
}

/// What the host wants the worker to do in response to a callback.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CallbackResult {
    Continue,
    Cancel,
    Skip,
    Overwrite,
}

impl Reason {
    /// The subset of [`CallbackResult`] this reason recognizes. An unrecognized response is
    /// treated as `Cancel` (spec.md §7 propagation policy).
    pub fn accepted_results(&self) -> &'static [CallbackResult] {
        use CallbackResult::*;
        match self {
            Reason::Progress => &[Continue],
            Reason::QueryCancel => &[Continue, Cancel],
            Reason::FileNameExists => &[Overwrite, Skip, Cancel],
            Reason::ResourceForkIgnored => &[Continue, Cancel],
            Reason::PathTooLong => &[Skip, Cancel],
            Reason::AttrFailure => &[Continue, Cancel],
            Reason::OverwriteFailure => &[Skip, Cancel],
            Reason::ConversionFailure => &[Skip, Cancel],
            Reason::Failure => &[Continue, Cancel],
        }
    }
    /// Normalize a host response: an unrecognized result for this reason becomes `Cancel`.
    pub fn normalize(&self, result: CallbackResult) -> CallbackResult {
        if self.accepted_results().contains(&result) {
            result
        } else {
            CallbackResult::Cancel
        }
    }
}

/// Which fork (or non-fork item) a callback concerns.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AffectedFork {
    Data,
    Rsrc,
    DiskImage,
    Raw,
    Unknown,
}

/// How DOS-text conversion, if any, is being applied to this transfer (spec.md §4.8).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DosTextMode {
    None,
    SetHighBit,
    StripHighBit,
}

/// A character, or the sentinel meaning "this storage system has no path separator".
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum PathSeparator {
    Char(char),
    None,
}

impl fmt::Display for PathSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSeparator::Char(c) => write!(f, "{}", c),
            PathSeparator::None => write!(f, ""),
        }
    }
}

/// Everything a worker tells the host at a callback point.
#[derive(Clone, Debug)]
pub struct CallbackFacts {
    pub reason: Reason,
    pub orig_path: String,
    pub orig_sep: PathSeparator,
    pub new_path: String,
    pub new_sep: PathSeparator,
    pub fork: AffectedFork,
    /// Whole-number percent in [0, 99]; 100 is never emitted (spec.md §6).
    pub progress_percent: Option<u8>,
    pub dos_text_mode: DosTextMode,
    pub converter_tag: Option<String>,
    pub failure_message: Option<String>,
}

impl CallbackFacts {
    pub fn new(reason: Reason, orig_path: impl Into<String>) -> Self {
        Self {
            reason,
            orig_path: orig_path.into(),
            orig_sep: PathSeparator::None,
            new_path: String::new(),
            new_sep: PathSeparator::None,
            fork: AffectedFork::Unknown,
            progress_percent: None,
            dos_text_mode: DosTextMode::None,
            converter_tag: None,
            failure_message: None,
        }
    }
    pub fn progress(orig_path: impl Into<String>, percent: u8) -> Self {
        let mut facts = Self::new(Reason::Progress, orig_path);
        facts.progress_percent = Some(percent.min(99));
        facts
    }
    pub fn query_cancel(orig_path: impl Into<String>) -> Self {
        Self::new(Reason::QueryCancel, orig_path)
    }
    pub fn failure(orig_path: impl Into<String>, reason: Reason, message: impl Into<String>) -> Self {
        let mut facts = Self::new(reason, orig_path);
        facts.failure_message = Some(message.into());
        facts
    }
}

/// The polymorphic callback signature used by every worker.
pub type Callback<'a> = dyn FnMut(CallbackFacts) -> CallbackResult + 'a;

/// Issue `reason` through `cb` and normalize the response against what `reason` accepts.
pub fn ask(cb: &mut Callback, facts: CallbackFacts) -> CallbackResult {
    let reason = facts.reason;
    let result = cb(facts);
    reason.normalize(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_result_becomes_cancel() {
        assert_eq!(Reason::FileNameExists.normalize(CallbackResult::Continue), CallbackResult::Cancel);
        assert_eq!(Reason::FileNameExists.normalize(CallbackResult::Overwrite), CallbackResult::Overwrite);
    }

    #[test]
    fn progress_clamped_below_100() {
        let facts = CallbackFacts::progress("a/b", 150);
        assert_eq!(facts.progress_percent, Some(99));
    }

    #[test]
    fn ask_normalizes_through_callback() {
        let mut cb = |_: CallbackFacts| CallbackResult::Overwrite;
        let r = ask(&mut cb, CallbackFacts::query_cancel("x"));
        assert_eq!(r, CallbackResult::Cancel);
    }
}
