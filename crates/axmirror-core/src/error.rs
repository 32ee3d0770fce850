//! Error types shared by the axmirror crates.

use thiserror::Error;

/// Errors that can occur in the core threading machinery.
///
/// Query-path failures in the snapshot/marker layer are expressed as
/// `Option`/empty values, not errors; these variants cover the
/// infrastructure paths where a typed error is actually actionable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The owner run loop was dropped, so no further invocations can be
    /// serviced.
    #[error("owner run loop has shut down")]
    OwnerLoopClosed,

    /// An invocation was dropped by the owner thread before it ran to
    /// completion, so no result will ever be produced.
    #[error("invocation was dropped before completion")]
    InvocationDropped,

    /// A thread role was registered twice from different threads.
    #[error("thread role '{0}' is already bound to a different thread")]
    RoleAlreadyBound(&'static str),
}

/// A specialized Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
