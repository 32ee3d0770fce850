//! The explicit tree registry service.
//!
//! Cross-tree lookup goes through a [`TreeRegistry`] instance passed by
//! reference to whatever needs it, rather than through ambient global
//! state. The registry's lifecycle is init-on-first-tree and
//! teardown-on-last-tree: a tree registers itself at creation and is
//! removed when its destruction drain completes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{TreeError, TreeResult};
use crate::id::TreeId;
use crate::tree::SnapshotTree;

/// Registry of live snapshot trees, keyed by tree id.
#[derive(Default)]
pub struct TreeRegistry {
    trees: Mutex<HashMap<TreeId, Arc<SnapshotTree>>>,
}

impl TreeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a tree. Fails if the id is already present.
    pub fn register(&self, tree: Arc<SnapshotTree>) -> TreeResult<()> {
        let mut trees = self.trees.lock();
        let id = tree.id();
        if trees.contains_key(&id) {
            return Err(TreeError::TreeAlreadyRegistered(id));
        }
        trees.insert(id, tree);
        tracing::debug!(target: "axmirror::tree", tree = %id, "registered tree");
        Ok(())
    }

    /// Look up a tree by id.
    pub fn tree_for_id(&self, id: TreeId) -> Option<Arc<SnapshotTree>> {
        self.trees.lock().get(&id).cloned()
    }

    /// Remove a tree from the registry, returning it if present.
    pub fn remove(&self, id: TreeId) -> Option<Arc<SnapshotTree>> {
        let removed = self.trees.lock().remove(&id);
        if removed.is_some() {
            tracing::debug!(target: "axmirror::tree", tree = %id, "removed tree");
        }
        removed
    }

    /// Number of registered trees.
    pub fn len(&self) -> usize {
        self.trees.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.lock().is_empty()
    }
}
