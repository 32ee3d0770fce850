//! Error types for the snapshot tree crate.

use axmirror_core::CoreError;
use thiserror::Error;

use crate::id::TreeId;

/// Errors that can occur during tree construction and registry
/// operations.
///
/// Query-path failures (unresolved ids, out-of-range offsets, unorderable
/// markers) are deliberately not errors; they produce empty values per the
/// fail-soft policy.
#[derive(Error, Debug)]
pub enum TreeError {
    /// A tree with this id is already registered.
    #[error("tree {0} is already registered")]
    TreeAlreadyRegistered(TreeId),

    /// No tree with this id is registered.
    #[error("unknown tree {0}")]
    UnknownTree(TreeId),

    /// No owner-thread proxy was configured, so the blocking fallback path
    /// is unavailable.
    #[error("tree has no owner-thread proxy")]
    NoOwnerProxy,

    /// Error from the core threading machinery.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
