//! Identifiers for trees and nodes.
//!
//! Both identifier types wrap a `NonZeroU64` so that `Option<NodeId>` is
//! pointer-sized and zero can serve as the wire encoding of "no id".

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one snapshot tree within a process.
///
/// Unique for the lifetime of the process; generated when a tree is
/// created and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(NonZeroU64);

impl TreeId {
    /// Generate the next process-unique tree id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        // fetch_add starts at 1, so the result is always non-zero.
        Self(NonZeroU64::new(NEXT.fetch_add(1, Ordering::Relaxed)).unwrap())
    }

    /// Reconstruct a tree id from its raw value. Returns `None` for zero.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The raw numeric value.
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeId({})", self.0)
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one accessible node within a tree.
///
/// Assigned by the live tree on the owner thread; the snapshot side never
/// mints node ids of its own.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NonZeroU64);

impl NodeId {
    /// Reconstruct a node id from its raw value. Returns `None` for zero.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The raw numeric value.
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
