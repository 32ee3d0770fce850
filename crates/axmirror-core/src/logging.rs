//! Logging facilities for axmirror.
//!
//! axmirror uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in the host application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! The macros below are thin wrappers around the `tracing` macros with
//! consistent target naming, so a host can filter the snapshot subsystem
//! (e.g. `RUST_LOG=axmirror::drain=trace`).

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core threading machinery target.
    pub const CORE: &str = "axmirror_core";
    /// Snapshot tree structure and diffing target.
    pub const TREE: &str = "axmirror::tree";
    /// Pending-change drain target.
    pub const DRAIN: &str = "axmirror::drain";
    /// Text marker navigation target.
    pub const MARKER: &str = "axmirror::marker";
}

/// A guard that tracks the duration of an operation via a tracing span.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span, active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "axmirror::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[macro_export]
macro_rules! ax_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "axmirror::tree", $($arg)*)
    };
}

#[macro_export]
macro_rules! ax_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "axmirror::tree", $($arg)*)
    };
}

#[macro_export]
macro_rules! ax_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "axmirror::tree", $($arg)*)
    };
}
