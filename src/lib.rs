//! # `retrocore` — disk/archive content-manipulation engine
//!
//! This library is the CORE of a retrocomputing disk image and archive utility: it lets a
//! host application view, extract, inject, copy, and modify files stored in vintage disk
//! images and file archives, including nested containers (a ZIP inside a disk image inside
//! another archive) and paired AppleDouble "sidecar" records (the MacZip convention).
//!
//! ## Architecture
//!
//! Four trees and families of workers, built on five abstract capabilities:
//! * [`capability::Archive`], [`capability::FileSystem`], [`capability::DiskImage`],
//!   [`capability::MultiPart`], [`capability::Converter`] are consumed, never implemented,
//!   by the CORE; concrete codecs (NuFX, ZIP, ProDOS, HFS, ...) live outside this crate.
//! * [`diskarc`] is the mutation tree: each node owns one physical stream and commits
//!   changes upward to its parent.
//! * [`worktree`] is the presentation tree: a parallel hierarchy that discovers nested
//!   archives and disk images on demand, governed by a pluggable depth policy.
//! * [`workers`] contains the add/extract/copy pipeline that moves forked files between
//!   archives and file systems.
//! * [`clip`] builds serializable, lazily-materialized manifests for clipboard/drag-drop.
//!
//! None of these hold process-global state; an [`hook::AppHook`] is threaded through as a
//! parameter everywhere logging or feature flags are needed.

pub mod error;
pub mod hook;
pub mod callback;
pub mod attribs;
pub mod adf;
pub mod partsrc;
pub mod maczip;
pub mod capability;
pub mod diskarc;
pub mod worktree;
pub mod workers;
pub mod clip;

/// Convenience alias used throughout the crate, matching the teacher's `DYNERR`.
pub type DYNERR = Box<dyn std::error::Error>;
/// Convenience alias for void-returning fallible operations, matching the teacher's `STDRESULT`.
pub type STDRESULT = Result<(), DYNERR>;
