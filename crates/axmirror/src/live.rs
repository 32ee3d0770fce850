//! The owner-thread interface to the live accessible tree.
//!
//! The live tree is an external collaborator: it computes roles, children,
//! and properties from layout and DOM state. The snapshot layer only calls
//! into it on the owner thread, and only to compute diffs; reader-thread
//! queries are always served from the snapshot.

use std::collections::HashMap;

use crate::id::NodeId;
use crate::node::{NodeData, PlatformHandle};
use crate::property::{NodeProperty, PropertyValue};
use crate::role::Role;

/// The live accessible tree, as seen by the diffing machinery.
///
/// All methods are owner-thread-only. Ids are minted by the implementor;
/// the snapshot layer never invents ids.
pub trait LiveTreeSource {
    /// The live root node, if the tree has one.
    fn root_id(&self) -> Option<NodeId>;

    /// Whether the live node behind `id` has been destroyed.
    fn is_detached(&self, id: NodeId) -> bool;

    /// Whether the live node is pruned from the accessible tree. Ignored
    /// nodes never produce node changes.
    fn is_ignored(&self, id: NodeId) -> bool {
        let _ = id;
        false
    }

    /// Whether a descendant of this node changed in a way that requires
    /// revisiting its subtree even when its own child-id list is
    /// unchanged.
    fn has_dirty_subtree(&self, id: NodeId) -> bool {
        let _ = id;
        false
    }

    /// The live parent of `id` in the accessible tree.
    fn parent_id(&self, id: NodeId) -> Option<NodeId>;

    /// The live node's current ordered children.
    fn children_ids(&self, id: NodeId) -> Vec<NodeId>;

    /// Resolve the live node into a full snapshot record. `None` when the
    /// node no longer exists.
    fn node_data(&self, id: NodeId) -> Option<NodeData>;

    /// The platform wrapper for this node, shared with the platform layer.
    fn platform_handle(&self, id: NodeId) -> Option<PlatformHandle>;
}

/// An in-memory [`LiveTreeSource`] for hosts whose accessible tree is not
/// layout-coupled, and for tests.
///
/// Nodes are plain records mutated through the setters; the diffing
/// machinery observes whatever state the tree holds when asked.
#[derive(Default)]
pub struct StaticLiveTree {
    nodes: HashMap<NodeId, StaticLiveNode>,
    root: Option<NodeId>,
}

struct StaticLiveNode {
    data: NodeData,
    handle: PlatformHandle,
    detached: bool,
    ignored: bool,
}

impl StaticLiveTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a node record.
    pub fn insert(&mut self, data: NodeData) {
        self.nodes.insert(
            data.id,
            StaticLiveNode {
                data,
                handle: PlatformHandle::new(),
                detached: false,
                ignored: false,
            },
        );
    }

    /// Shorthand: insert a node with role, parent, and children.
    pub fn insert_node(
        &mut self,
        id: NodeId,
        role: Role,
        parent: Option<NodeId>,
        children: Vec<NodeId>,
    ) {
        let mut data = NodeData::new(id, role);
        data.parent_id = parent;
        data.children_ids = children;
        self.insert(data);
    }

    /// Declare the root node.
    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// Replace a node's child-id list.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.data.children_ids = children;
        }
    }

    /// Replace a node's parent.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.data.parent_id = parent;
        }
    }

    /// Set a property on a node.
    pub fn set_property(&mut self, id: NodeId, property: NodeProperty, value: PropertyValue) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.data.set_property(property, value);
        }
    }

    /// Mark a node's live object destroyed.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.detached = true;
        }
    }

    /// Mark a node ignored.
    pub fn set_ignored(&mut self, id: NodeId, ignored: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.ignored = ignored;
        }
    }

    /// Drop a node record entirely.
    pub fn remove(&mut self, id: NodeId) {
        self.nodes.remove(&id);
    }

    /// The platform handle of a node, for inspecting attachment state.
    pub fn handle(&self, id: NodeId) -> Option<PlatformHandle> {
        self.nodes.get(&id).map(|node| node.handle.clone())
    }
}

impl LiveTreeSource for StaticLiveTree {
    fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    fn is_detached(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_none_or(|node| node.detached)
    }

    fn is_ignored(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|node| node.ignored)
    }

    fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.data.parent_id)
    }

    fn children_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|node| node.data.children_ids.clone())
            .unwrap_or_default()
    }

    fn node_data(&self, id: NodeId) -> Option<NodeData> {
        let node = self.nodes.get(&id)?;
        if node.detached {
            return None;
        }
        Some(node.data.clone())
    }

    fn platform_handle(&self, id: NodeId) -> Option<PlatformHandle> {
        self.nodes.get(&id).map(|node| node.handle.clone())
    }
}
