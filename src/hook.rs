//! # Application hook
//!
//! Design note (spec.md §9): "Global mutable state: none should exist. An 'app hook' object
//! plays the role of a logging and feature-flag sink and is threaded through as a parameter
//! — do not hide it in process globals." Every worker, tree operation, and clip builder in
//! this crate takes `&dyn AppHook` instead of reading environment/statics.

use std::fmt;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Sink for logging and feature-flag queries. Implementations may forward to the `log`
/// crate (the default), a GUI status bar, or a test-capturing buffer.
pub trait AppHook {
    /// Record a message at the given level. Default forwards to the `log` facade at the
    /// same granularity the teacher uses (info for successful high-level steps, warn for
    /// recoverable anomalies, error immediately before returning an `Err`).
    fn log(&self, level: LogLevel, msg: &dyn fmt::Display) {
        match level {
            LogLevel::Info => log::info!("{}", msg),
            LogLevel::Warn => log::warn!("{}", msg),
            LogLevel::Error => log::error!("{}", msg),
        }
    }
    /// Whether MacZip sidecar pairing (spec.md §4.3) is enabled for archive operations.
    fn maczip_enabled(&self) -> bool {
        true
    }
    /// Whether duplicate-name checks (Add worker, clip synthesis) are case-sensitive.
    /// The default matches spec.md §4.6 step 5 / §8 property 6: case-insensitive.
    fn case_sensitive_names(&self) -> bool {
        false
    }
}

/// Default hook: logs through the `log` facade, MacZip on, case-insensitive names.
#[derive(Default, Clone, Copy)]
pub struct DefaultHook;

impl AppHook for DefaultHook {}

/// Hook that swallows all logging and disables MacZip; useful for callers that want a
/// pure no-op sink (e.g. benchmarking raw throughput without log overhead).
#[derive(Default, Clone, Copy)]
pub struct NullHook;

impl AppHook for NullHook {
    fn log(&self, _level: LogLevel, _msg: &dyn fmt::Display) {}
    fn maczip_enabled(&self) -> bool {
        false
    }
}
