//! The cross-thread snapshot tree.
//!
//! A [`SnapshotTree`] is the shared synchronization core between the two
//! thread roles:
//!
//! - The **owner thread** observes changes in the live tree, computes
//!   minimal diffs against its private parent/child id map, and enqueues
//!   the results into the pending-change queues.
//! - The **reader thread** owns a [`TreeReader`], whose
//!   [`apply_pending_changes`](TreeReader::apply_pending_changes) drains
//!   the queues under the lock and applies them to its private node map.
//!   No lock is held while the reader serves subsequent read queries.
//!
//! The pending-change queues are the only shared mutable state and are
//! guarded by a single mutex; every category of pending data drains
//! atomically under one acquisition so the reader never observes a torn
//! intermediate state (e.g. a property patch for a node whose append has
//! not been installed yet).

mod registry;

pub use registry::TreeRegistry;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use axmirror_core::{OwnerProxy, ThreadAffinity};
use axmirror_core::{debug_assert_owner_thread, debug_assert_reader_thread};
use parking_lot::Mutex;

use crate::error::{TreeError, TreeResult};
use crate::geometry::{GeometryCache, Rect};
use crate::id::{NodeId, TreeId};
use crate::live::LiveTreeSource;
use crate::node::{NodeData, NodeSnapshot, PlatformHandle};
use crate::property::{NodeProperty, PropertyValue, PropertyVec, property_in};
use crate::range::TextMarkerRange;
use crate::role::Role;

/// Whether a children update should immediately resolve and queue the
/// collected changes, or leave them for a later batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveNodeChanges {
    No,
    Yes,
}

/// One queued append: a full node record plus the platform handle to
/// attach when the record is installed.
pub struct NodeChange {
    pub data: NodeData,
    pub handle: Option<PlatformHandle>,
}

/// One queued property patch for an existing node.
pub struct PropertyChange {
    pub node_id: NodeId,
    pub properties: PropertyVec,
}

/// Options for a deferred node update queued on the owner side.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdateOptions {
    pub properties: HashSet<NodeProperty>,
    pub update_node: bool,
    pub update_children: bool,
}

impl NodeUpdateOptions {
    /// Re-snapshot the whole node record.
    pub fn node_update() -> Self {
        Self {
            update_node: true,
            ..Self::default()
        }
    }

    /// Re-diff the node's children.
    pub fn children_update() -> Self {
        Self {
            update_children: true,
            ..Self::default()
        }
    }

    /// Recompute only the given properties.
    pub fn properties(properties: impl IntoIterator<Item = NodeProperty>) -> Self {
        Self {
            properties: properties.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// The parent id and children ids the owner thread last synced for a node.
#[derive(Debug, Clone, Default)]
struct ParentChildren {
    parent_id: Option<NodeId>,
    children_ids: Vec<NodeId>,
}

/// Everything the owner thread has queued for the next drain. Guarded by
/// one lock; see the module docs for why.
#[derive(Default)]
struct PendingChanges {
    queued_for_destruction: bool,
    root_node_id: Option<NodeId>,
    /// `Some(new_focus)` when a focus change is pending; the inner Option
    /// is the focused node itself.
    focused_node_id: Option<Option<NodeId>>,
    appends: Vec<NodeChange>,
    parent_updates: HashMap<NodeId, Option<NodeId>>,
    children_updates: Vec<(NodeId, Vec<NodeId>)>,
    property_changes: Vec<PropertyChange>,
    subtree_removals: HashSet<NodeId>,
    protected_from_deletion: HashSet<NodeId>,
    sorted_live_regions: Option<Vec<NodeId>>,
    selected_range: Option<TextMarkerRange>,
}

/// Owner-thread private bookkeeping. Only ever touched under the owner
/// mutex, from the owner thread.
#[derive(Default)]
struct OwnerState {
    /// The owner's view of the tree's parent/child relationships. Every
    /// connected node has exactly one entry here.
    node_map: HashMap<NodeId, ParentChildren>,
    /// Nodes appended without being connected into `node_map`.
    unconnected_nodes: HashSet<NodeId>,
    /// Ids that will be resolved into full `NodeChange` appends.
    unresolved_pending_appends: HashSet<NodeId>,
    /// Subtree roots that are no longer connected and should be removed.
    subtrees_to_remove: Vec<NodeId>,
    /// Ids protected from the next removal sweep because they were
    /// re-parented rather than actually removed.
    protected_from_deletion: HashSet<NodeId>,
    /// Ids whose parent pointer changed and must be synced to the reader.
    needs_parent_update: HashSet<NodeId>,
    collecting_node_changes: bool,

    // Deferred updates drained by `process_queued_node_updates`.
    needs_update_children: Vec<NodeId>,
    needs_update_node: Vec<NodeId>,
    needs_property_updates: HashMap<NodeId, HashSet<NodeProperty>>,
    /// Key is the node being removed; value is its parent in the live
    /// tree, if any.
    needs_node_removal: HashMap<NodeId, Option<NodeId>>,
}

type FrameResolver = Box<dyn Fn(NodeId) -> Option<Rect> + Send>;

/// Builder for [`SnapshotTree`].
#[derive(Default)]
pub struct SnapshotTreeBuilder {
    geometry: Option<Arc<GeometryCache>>,
    owner_proxy: Option<OwnerProxy>,
}

impl SnapshotTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a geometry cache with the tree.
    pub fn geometry(mut self, geometry: Arc<GeometryCache>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Provide the proxy the reader thread uses for blocking owner-thread
    /// round-trips. Without one, fallback queries degrade to empty
    /// results.
    pub fn owner_proxy(mut self, proxy: OwnerProxy) -> Self {
        self.owner_proxy = Some(proxy);
        self
    }

    /// Build the tree and register it.
    pub fn build(self, registry: &Arc<TreeRegistry>) -> TreeResult<Arc<SnapshotTree>> {
        let tree = Arc::new(SnapshotTree {
            id: TreeId::next(),
            registry: Arc::downgrade(registry),
            geometry: self.geometry.unwrap_or_default(),
            owner_proxy: self.owner_proxy,
            frame_resolver: Mutex::new(None),
            pending: Mutex::new(PendingChanges::default()),
            owner: Mutex::new(OwnerState::default()),
            loading_progress: AtomicU64::new(0f64.to_bits()),
            processing_progress: AtomicU64::new(1f64.to_bits()),
            is_empty_content_tree: AtomicBool::new(false),
            replacing_tree: Mutex::new(None),
        });
        registry.register(tree.clone())?;
        Ok(tree)
    }
}

/// The shared synchronization core of one snapshot tree.
///
/// Owner-thread methods compute and enqueue diffs; the reader-thread view
/// lives in [`TreeReader`]. The tree itself holds no resolved node
/// snapshots.
pub struct SnapshotTree {
    id: TreeId,
    registry: Weak<TreeRegistry>,
    geometry: Arc<GeometryCache>,
    owner_proxy: Option<OwnerProxy>,
    frame_resolver: Mutex<Option<FrameResolver>>,
    pending: Mutex<PendingChanges>,
    owner: Mutex<OwnerState>,
    /// f64 bits; written by the owner thread, read from the reader thread.
    loading_progress: AtomicU64,
    processing_progress: AtomicU64,
    is_empty_content_tree: AtomicBool,
    /// An empty-content placeholder tree this tree will replace; receives
    /// progress reports while this tree's appends resolve.
    replacing_tree: Mutex<Option<Arc<SnapshotTree>>>,
}

impl SnapshotTree {
    #[inline]
    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn geometry(&self) -> &Arc<GeometryCache> {
        &self.geometry
    }

    /// True for placeholder trees built by
    /// [`generate_empty_content`](Self::generate_empty_content).
    pub fn is_empty_content_tree(&self) -> bool {
        self.is_empty_content_tree.load(Ordering::Relaxed)
    }

    // ---- Owner-thread API -------------------------------------------------

    /// Generate node changes for the whole subtree rooted at `root` and
    /// queue them.
    pub fn generate_subtree(&self, source: &dyn LiveTreeSource, root: NodeId) {
        debug_assert_owner_thread!();
        if source.is_detached(root) {
            return;
        }
        let mut owner = self.owner.lock();
        self.collect_node_changes_for_subtree(&mut owner, source, root);
        self.queue_removals_and_unresolved_changes(&mut owner, source);
    }

    /// Build a placeholder tree consisting only of the scroll root and the
    /// content area. Used while the full tree is generated; the real tree
    /// calls [`set_replacing_tree`](Self::set_replacing_tree) with this
    /// one to report build progress into it.
    pub fn generate_empty_content(&self, source: &dyn LiveTreeSource) {
        debug_assert_owner_thread!();
        let Some(root) = source.root_id() else {
            return;
        };
        let Some(mut root_data) = source.node_data(root) else {
            return;
        };
        self.is_empty_content_tree.store(true, Ordering::Relaxed);

        let content = root_data
            .children_ids
            .iter()
            .copied()
            .find(|child| source.node_data(*child).map(|d| d.role) == Some(Role::ContentArea));

        let mut owner = self.owner.lock();
        root_data.children_ids = content.into_iter().collect();
        owner.node_map.insert(
            root,
            ParentChildren {
                parent_id: None,
                children_ids: root_data.children_ids.clone(),
            },
        );
        let mut appends = vec![NodeChange {
            handle: source.platform_handle(root),
            data: root_data,
        }];
        if let Some(content_id) = content
            && let Some(mut content_data) = source.node_data(content_id)
        {
            content_data.parent_id = Some(root);
            content_data.children_ids.clear();
            owner.node_map.insert(
                content_id,
                ParentChildren {
                    parent_id: Some(root),
                    children_ids: Vec::new(),
                },
            );
            appends.push(NodeChange {
                handle: source.platform_handle(content_id),
                data: content_data,
            });
        }

        {
            let mut pending = self.pending.lock();
            pending.root_node_id = Some(root);
            pending.focused_node_id = Some(content.or(Some(root)));
            for change in appends {
                self.queue_change_locked(&mut pending, &owner, change);
            }
        }
        self.processing_progress
            .store(0f64.to_bits(), Ordering::Relaxed);
    }

    /// Declare the empty-content tree this tree replaces once built.
    pub fn set_replacing_tree(&self, tree: Arc<SnapshotTree>) {
        *self.replacing_tree.lock() = Some(tree);
    }

    /// Diff a live node's current children against the last-known
    /// child-id list and queue the resulting changes.
    pub fn update_children(
        &self,
        source: &dyn LiveTreeSource,
        id: NodeId,
        resolve: ResolveNodeChanges,
    ) {
        debug_assert_owner_thread!();
        let mut owner = self.owner.lock();
        self.update_children_locked(&mut owner, source, id, resolve);
    }

    fn update_children_locked(
        &self,
        owner: &mut OwnerState,
        source: &dyn LiveTreeSource,
        id: NodeId,
        resolve: ResolveNodeChanges,
    ) {
        if owner.node_map.is_empty() {
            // The tree has not been generated yet; nothing to diff.
            return;
        }
        if source.is_detached(id) {
            return;
        }

        // A children-changed notification may arrive for a node with no
        // snapshot counterpart (e.g. a container that was empty until
        // now). Diff against the closest ancestor the node map knows.
        let mut ancestor = Some(id);
        while let Some(current) = ancestor {
            if owner.node_map.contains_key(&current) {
                break;
            }
            ancestor = source.parent_id(current);
        }
        let Some(ancestor) = ancestor else {
            tracing::trace!(target: "axmirror::tree", node = %id, "no in-map ancestor, bailing");
            return;
        };

        let old = owner.node_map.get(&ancestor).cloned().unwrap_or_default();
        let mut old_children_ids = old.children_ids;
        let new_children_ids = source.children_ids(ancestor);

        let mut children_changed = old_children_ids.len() != new_children_ids.len();
        for child in &new_children_ids {
            if let Some(index) = old_children_ids.iter().position(|old_id| old_id == child) {
                // Prevent deletion of this child below by removing it from
                // the old list.
                old_children_ids.remove(index);
                // Propagate subtree updates downwards for this
                // already-existing child.
                if source.has_dirty_subtree(*child) {
                    self.queue_node_update_locked(owner, *child, &NodeUpdateOptions::children_update());
                }
            } else {
                children_changed = true;
                tracing::trace!(
                    target: "axmirror::tree",
                    parent = %ancestor, child = %child, "gaining new subtree"
                );
                self.collect_node_changes_for_subtree(owner, source, *child);
            }
        }
        owner.node_map.insert(
            ancestor,
            ParentChildren {
                parent_id: old.parent_id,
                children_ids: new_children_ids,
            },
        );
        // The ancestor is definitively part of the tree by way of getting
        // here; protect it in case it was re-parented.
        owner.protected_from_deletion.insert(ancestor);

        // What is left in old_children_ids is no longer parented by the
        // ancestor: drop the subtrees from the node map and queue their
        // removal from the reader map.
        for old_child in &old_children_ids {
            self.remove_subtree_from_node_map_locked(owner, *old_child, Some(ancestor));
        }

        let role = source.node_data(ancestor).map(|d| d.role).unwrap_or_default();
        if children_changed || role.always_update_on_children_change() {
            self.queue_node_update_locked(owner, ancestor, &NodeUpdateOptions::node_update());
        }

        owner.subtrees_to_remove.append(&mut old_children_ids);
        if resolve == ResolveNodeChanges::Yes {
            self.queue_removals_and_unresolved_changes(owner, source);
        }
    }

    /// Re-snapshot one node's full record.
    pub fn update_node(&self, source: &dyn LiveTreeSource, id: NodeId) {
        debug_assert_owner_thread!();
        let mut owner = self.owner.lock();
        self.update_node_locked(&mut owner, source, id);
    }

    fn update_node_locked(&self, owner: &mut OwnerState, source: &dyn LiveTreeSource, id: NodeId) {
        // If a batch of node changes is being collected, fold this update
        // into it so the same object doesn't produce two appends.
        if owner.collecting_node_changes || !owner.unresolved_pending_appends.is_empty() {
            owner.unresolved_pending_appends.insert(id);
            return;
        }

        if let Some(change) = self.node_change_for_object(owner, source, id) {
            let mut pending = self.pending.lock();
            self.queue_change_locked(&mut pending, owner, change);
            return;
        }

        // The node itself can't produce a change (e.g. it lives under a
        // node that doesn't expose accessible children). Refresh the
        // parent record instead, which owns whatever text the node
        // contributed.
        if let Some(parent) = source.parent_id(id)
            && let Some(change) = self.node_change_for_object(owner, source, parent)
        {
            let mut pending = self.pending.lock();
            self.queue_change_locked(&mut pending, owner, change);
        }
    }

    /// Recompute the given properties for a node and queue a patch.
    pub fn update_node_properties(
        &self,
        source: &dyn LiveTreeSource,
        id: NodeId,
        properties: &HashSet<NodeProperty>,
    ) {
        debug_assert_owner_thread!();
        let mut owner = self.owner.lock();
        self.update_node_properties_locked(&mut owner, source, id, properties);
    }

    fn update_node_properties_locked(
        &self,
        _owner: &mut OwnerState,
        source: &dyn LiveTreeSource,
        id: NodeId,
        properties: &HashSet<NodeProperty>,
    ) {
        let Some(data) = source.node_data(id) else {
            return;
        };
        let mut patch: PropertyVec = Vec::with_capacity(properties.len());
        for property in properties {
            let value = if let Some(flag) = property.as_flag() {
                PropertyValue::Bool(data.flags.contains(flag))
            } else {
                // Absent means default; the patch then removes the entry
                // on the reader side, keeping the bag sparse.
                property_in(&data.properties, *property)
            };
            patch.push((*property, value));
        }
        self.pending.lock().property_changes.push(PropertyChange {
            node_id: id,
            properties: patch,
        });
    }

    /// Recompute the given properties for a node and all its descendants.
    pub fn update_properties_for_self_and_descendants(
        &self,
        source: &dyn LiveTreeSource,
        id: NodeId,
        properties: &HashSet<NodeProperty>,
    ) {
        debug_assert_owner_thread!();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.queue_node_update(current, &NodeUpdateOptions::properties(properties.iter().copied()));
            stack.extend(source.children_ids(current));
        }
    }

    /// Queue a deferred update, merged with anything already queued for
    /// the node.
    pub fn queue_node_update(&self, id: NodeId, options: &NodeUpdateOptions) {
        debug_assert_owner_thread!();
        let mut owner = self.owner.lock();
        self.queue_node_update_locked(&mut owner, id, options);
    }

    fn queue_node_update_locked(
        &self,
        owner: &mut OwnerState,
        id: NodeId,
        options: &NodeUpdateOptions,
    ) {
        if !options.update_node && !options.properties.is_empty() {
            // A whole-node update subsumes individual property updates.
            if owner.needs_update_node.contains(&id) {
                return;
            }
            owner
                .needs_property_updates
                .entry(id)
                .or_default()
                .extend(options.properties.iter().copied());
        }

        if options.update_children && !owner.needs_update_children.contains(&id) {
            owner.needs_update_children.push(id);
        }
        if options.update_node && !owner.needs_update_node.contains(&id) {
            owner.needs_update_node.push(id);
        }
    }

    /// Queue a deferred removal of a node and its subtree.
    pub fn queue_node_removal(&self, source: &dyn LiveTreeSource, id: NodeId) {
        debug_assert_owner_thread!();
        let parent = source.parent_id(id);
        self.owner.lock().needs_node_removal.insert(id, parent);
    }

    /// Drain every deferred update queued via
    /// [`queue_node_update`](Self::queue_node_update) /
    /// [`queue_node_removal`](Self::queue_node_removal), in removal →
    /// children → node → property order, then queue the results.
    pub fn process_queued_node_updates(&self, source: &dyn LiveTreeSource) {
        debug_assert_owner_thread!();
        let mut owner = self.owner.lock();

        for (id, parent) in std::mem::take(&mut owner.needs_node_removal) {
            self.remove_node_locked(&mut owner, id, parent);
        }

        for id in std::mem::take(&mut owner.needs_update_children) {
            self.update_children_locked(&mut owner, source, id, ResolveNodeChanges::No);
        }

        for id in std::mem::take(&mut owner.needs_update_node) {
            owner.unresolved_pending_appends.insert(id);
        }

        for (id, properties) in std::mem::take(&mut owner.needs_property_updates) {
            // Skip nodes that will be fully re-snapshot anyway.
            if owner.unresolved_pending_appends.contains(&id) {
                continue;
            }
            self.update_node_properties_locked(&mut owner, source, id, &properties);
        }

        self.queue_removals_and_unresolved_changes(&mut owner, source);
    }

    /// Remove a node and its subtree immediately.
    pub fn remove_node(&self, id: NodeId, parent_id: Option<NodeId>) {
        debug_assert_owner_thread!();
        let mut owner = self.owner.lock();
        self.remove_node_locked(&mut owner, id, parent_id);
    }

    fn remove_node_locked(&self, owner: &mut OwnerState, id: NodeId, parent_id: Option<NodeId>) {
        tracing::trace!(target: "axmirror::tree", node = %id, "removing node");
        owner.unresolved_pending_appends.remove(&id);
        self.remove_subtree_from_node_map_locked(owner, id, parent_id);
        let mut pending = self.pending.lock();
        self.queue_removals_locked(&mut pending, owner, vec![id]);
    }

    fn remove_subtree_from_node_map_locked(
        &self,
        owner: &mut OwnerState,
        id: NodeId,
        parent_id: Option<NodeId>,
    ) {
        if owner.unconnected_nodes.remove(&id) {
            return;
        }
        let Some(entry) = owner.node_map.get(&id) else {
            tracing::trace!(target: "axmirror::tree", node = %id, "not in node map, skipping removal");
            return;
        };
        // A parent mismatch means the node was re-parented after this
        // removal was decided; the new parent owns it now, so bail.
        if entry.parent_id != parent_id {
            tracing::trace!(
                target: "axmirror::tree",
                node = %id, "removal requested from a stale parent, bailing"
            );
            return;
        }

        let mut removals = vec![id];
        while let Some(current) = removals.pop() {
            if owner.unresolved_pending_appends.contains(&current)
                || owner.protected_from_deletion.contains(&current)
            {
                continue;
            }
            if let Some(entry) = owner.node_map.remove(&current) {
                removals.extend(entry.children_ids);
            }
        }
    }

    /// Append a node that is not connected into the structural node map.
    ///
    /// The reader map will hold the record until the corresponding live
    /// entity goes away; no parent/children bookkeeping is done for it.
    pub fn add_unconnected_node(&self, source: &dyn LiveTreeSource, id: NodeId) {
        debug_assert_owner_thread!();
        let mut owner = self.owner.lock();
        if owner.unconnected_nodes.contains(&id) {
            return;
        }
        if source.is_detached(id) {
            return;
        }
        let Some(data) = source.node_data(id) else {
            return;
        };
        let change = NodeChange {
            handle: source.platform_handle(id),
            data,
        };
        self.pending.lock().appends.push(change);
        owner.unconnected_nodes.insert(id);
    }

    /// Record a focus change for the next drain.
    pub fn set_focused_node_id(&self, id: Option<NodeId>) {
        debug_assert_owner_thread!();
        self.pending.lock().focused_node_id = Some(id);
    }

    /// Record the root node for the next drain.
    pub fn set_pending_root_node_id(&self, id: NodeId) {
        debug_assert_owner_thread!();
        self.pending.lock().root_node_id = Some(id);
    }

    /// Record a selection change for the next drain.
    pub fn set_selected_marker_range(&self, range: TextMarkerRange) {
        debug_assert_owner_thread!();
        self.pending.lock().selected_range = Some(range);
    }

    /// Replace the sorted live-region id list on the next drain.
    pub fn sorted_live_regions_did_change(&self, ids: Vec<NodeId>) {
        debug_assert_owner_thread!();
        self.pending.lock().sorted_live_regions = Some(ids);
    }

    /// Publish the page loading-progress estimate.
    pub fn update_loading_progress(&self, progress: f64) {
        self.loading_progress
            .store(progress.to_bits(), Ordering::Relaxed);
    }

    /// The last published loading-progress estimate. Readable from any
    /// thread.
    pub fn loading_progress(&self) -> f64 {
        f64::from_bits(self.loading_progress.load(Ordering::Relaxed))
    }

    fn report_loading_progress(&self, processing: f64) {
        self.processing_progress
            .store(processing.to_bits(), Ordering::Relaxed);
    }

    /// How much of a replacing tree's initial build has completed, in
    /// `0.0..=1.0`.
    pub fn processing_progress(&self) -> f64 {
        f64::from_bits(self.processing_progress.load(Ordering::Relaxed))
    }

    /// Cache a node's viewport-relative frame.
    pub fn update_frame(&self, id: NodeId, frame: Rect) {
        debug_assert_owner_thread!();
        self.geometry.cache_frame(id, frame);
    }

    /// Install the owner-side callback the blocking fallback path uses to
    /// compute frames the snapshot doesn't carry.
    pub fn set_frame_resolver(
        &self,
        resolver: impl Fn(NodeId) -> Option<Rect> + Send + 'static,
    ) {
        *self.frame_resolver.lock() = Some(Box::new(resolver));
    }

    /// Resolve a frame on the owner thread, caching the result.
    pub fn resolve_frame_on_owner(&self, id: NodeId) -> Option<Rect> {
        debug_assert_owner_thread!();
        let frame = self.frame_resolver.lock().as_ref().and_then(|f| f(id));
        if let Some(frame) = frame {
            self.geometry.cache_frame(id, frame);
        }
        frame
    }

    /// Queue this tree to destroy itself on the reader thread.
    ///
    /// The tree can't be torn down on the owner thread because the reader
    /// may be mid-query; the next drain detaches everything instead.
    pub fn queue_for_destruction(&self) {
        debug_assert_owner_thread!();
        self.pending.lock().queued_for_destruction = true;
    }

    /// Run a closure on the owner thread, blocking until it completes.
    pub fn call_owner<F, R>(&self, f: F) -> TreeResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let proxy = self.owner_proxy.as_ref().ok_or(TreeError::NoOwnerProxy)?;
        proxy.call(f).map_err(TreeError::from)
    }

    // ---- Internal owner-side helpers --------------------------------------

    fn should_create_node_change(
        &self,
        owner: &OwnerState,
        source: &dyn LiveTreeSource,
        id: NodeId,
    ) -> bool {
        !source.is_detached(id)
            && (!source.is_ignored(id) || owner.unconnected_nodes.contains(&id))
    }

    fn node_change_for_object(
        &self,
        owner: &mut OwnerState,
        source: &dyn LiveTreeSource,
        id: NodeId,
    ) -> Option<NodeChange> {
        if !self.should_create_node_change(owner, source, id) {
            return None;
        }
        let data = source.node_data(id)?;
        owner.node_map.insert(
            id,
            ParentChildren {
                parent_id: data.parent_id,
                children_ids: data.children_ids.clone(),
            },
        );
        if source.root_id() == Some(id) {
            self.pending.lock().root_node_id = Some(id);
        }
        Some(NodeChange {
            handle: source.platform_handle(id),
            data,
        })
    }

    fn collect_node_changes_for_subtree(
        &self,
        owner: &mut OwnerState,
        source: &dyn LiveTreeSource,
        id: NodeId,
    ) {
        if source.is_detached(id) {
            tracing::trace!(target: "axmirror::tree", node = %id, "cannot collect changes for detached node");
            return;
        }
        let was_collecting = owner.collecting_node_changes;
        owner.collecting_node_changes = true;
        self.collect_subtree_inner(owner, source, id);
        owner.collecting_node_changes = was_collecting;
    }

    fn collect_subtree_inner(
        &self,
        owner: &mut OwnerState,
        source: &dyn LiveTreeSource,
        id: NodeId,
    ) {
        let parent_id = source.parent_id(id);
        let children = source.children_ids(id);

        if !owner.node_map.contains_key(&id) {
            owner.unresolved_pending_appends.insert(id);

            let mut children_ids = Vec::with_capacity(children.len());
            for child in children {
                if child == id {
                    debug_assert!(false, "node listed itself as a child");
                    continue;
                }
                children_ids.push(child);
                self.collect_subtree_inner(owner, source, child);
            }
            owner.node_map.insert(
                id,
                ParentChildren {
                    parent_id,
                    children_ids,
                },
            );
        } else {
            // Already in the tree: no full node change needed (creating
            // one is expensive). The object may have been re-parented
            // here, in which case its old parent will try to queue it for
            // removal; protect it.
            owner.protected_from_deletion.insert(id);
            if let Some(parent) = parent_id
                && owner.node_map.get(&id).is_some_and(|e| e.parent_id != Some(parent))
                && !owner.unresolved_pending_appends.contains(&id)
            {
                owner.needs_parent_update.insert(id);
            }
            // Only the parent pointer is refreshed; the old children must
            // stay around for update_children to diff against.
            if let Some(entry) = owner.node_map.get_mut(&id) {
                entry.parent_id = parent_id;
            }

            for child in children {
                if child == id {
                    debug_assert!(false, "node listed itself as a child");
                    continue;
                }
                self.collect_subtree_inner(owner, source, child);
            }
        }
    }

    fn resolve_appends(
        &self,
        owner: &mut OwnerState,
        source: &dyn LiveTreeSource,
    ) -> Vec<NodeChange> {
        if owner.unresolved_pending_appends.is_empty() {
            return Vec::new();
        }

        let replacing = self.replacing_tree.lock().clone();

        // Resolving appends can add more ids to the unresolved set as we
        // iterate, so swap it out; late additions are picked up in the
        // next cycle.
        let unresolved: Vec<NodeId> =
            std::mem::take(&mut owner.unresolved_pending_appends).into_iter().collect();
        let total = unresolved.len();

        let mut resolved = Vec::with_capacity(total);
        for (index, id) in unresolved.into_iter().enumerate() {
            if let Some(replacing) = &replacing {
                replacing.report_loading_progress((index + 1) as f64 / total as f64);
            }
            if let Some(change) = self.node_change_for_object(owner, source, id) {
                resolved.push(change);
            }
        }
        if let Some(replacing) = &replacing {
            replacing.report_loading_progress(1.0);
        }
        resolved
    }

    fn queue_removals_and_unresolved_changes(
        &self,
        owner: &mut OwnerState,
        source: &dyn LiveTreeSource,
    ) {
        let appends = self.resolve_appends(owner, source);
        let removals = std::mem::take(&mut owner.subtrees_to_remove);
        self.queue_appends_and_removals(owner, appends, removals);
    }

    fn queue_appends_and_removals(
        &self,
        owner: &mut OwnerState,
        appends: Vec<NodeChange>,
        removals: Vec<NodeId>,
    ) {
        let mut pending = self.pending.lock();
        for change in appends {
            self.queue_change_locked(&mut pending, owner, change);
        }

        for id in std::mem::take(&mut owner.needs_parent_update) {
            debug_assert!(
                owner.node_map.contains_key(&id),
                "node queued for parent update is missing from the node map"
            );
            if let Some(entry) = owner.node_map.get(&id) {
                pending.parent_updates.insert(id, entry.parent_id);
            }
        }

        self.queue_removals_locked(&mut pending, owner, removals);
    }

    fn queue_change_locked(
        &self,
        pending: &mut PendingChanges,
        owner: &OwnerState,
        change: NodeChange,
    ) {
        let id = change.data.id;
        let parent_id = change.data.parent_id;
        debug_assert!(parent_id != Some(id), "node is its own parent");
        pending.appends.push(change);

        // Sync the sibling list of the parent and the node's own children
        // so structural patches land in the same drain as the append.
        if let Some(parent) = parent_id
            && let Some(entry) = owner.node_map.get(&parent)
        {
            pending
                .children_updates
                .push((parent, entry.children_ids.clone()));
        }
        if let Some(entry) = owner.node_map.get(&id) {
            pending.children_updates.push((id, entry.children_ids.clone()));
        }
    }

    fn queue_removals_locked(
        &self,
        pending: &mut PendingChanges,
        owner: &mut OwnerState,
        removals: Vec<NodeId>,
    ) {
        pending.subtree_removals.extend(removals);
        pending
            .protected_from_deletion
            .extend(std::mem::take(&mut owner.protected_from_deletion));
    }
}

/// The reader thread's exclusive view of one snapshot tree.
///
/// Owns the drained node map outright: pending-change entries carry
/// values that are moved into this map during a drain and never aliased
/// afterwards. All read queries are plain map lookups with no
/// synchronization.
pub struct TreeReader {
    tree: Arc<SnapshotTree>,
    affinity: ThreadAffinity,
    nodes: HashMap<NodeId, NodeSnapshot>,
    root_id: Option<NodeId>,
    focused_id: Option<NodeId>,
    sorted_live_regions: Vec<NodeId>,
    selected_range: Option<TextMarkerRange>,
    destroyed: bool,
}

impl TreeReader {
    /// Create the reader view. Must be called on the reader thread; the
    /// reader is bound to the constructing thread from then on.
    pub fn new(tree: Arc<SnapshotTree>) -> Self {
        debug_assert_reader_thread!();
        Self {
            tree,
            affinity: ThreadAffinity::current(),
            nodes: HashMap::new(),
            root_id: None,
            focused_id: None,
            sorted_live_regions: Vec::new(),
            selected_range: None,
            destroyed: false,
        }
    }

    pub fn tree(&self) -> &Arc<SnapshotTree> {
        &self.tree
    }

    #[inline]
    pub fn tree_id(&self) -> TreeId {
        self.tree.id
    }

    /// Whether the destruction drain has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Drain all queued changes into the reader map.
    ///
    /// Returns `false` once the tree has been destroyed; no further drains
    /// happen after that. Apply order within one drain is load-bearing:
    /// focus, removals, appends, parent patches, child-list patches,
    /// property patches, auxiliary swaps, root resolution. Deletions must
    /// precede appends so a node being replaced is freed before the
    /// replacement takes its slot.
    pub fn apply_pending_changes(&mut self) -> bool {
        self.affinity.debug_assert_same_thread();
        debug_assert_reader_thread!();
        if self.destroyed {
            return false;
        }

        let tree_id = self.tree.id;
        let mut pending = self.tree.pending.lock();

        if pending.queued_for_destruction {
            tracing::debug!(target: "axmirror::drain", tree = %tree_id, "destruction drain");
            for node in self.nodes.values_mut() {
                node.detach_platform_handle();
            }
            self.nodes.clear();
            self.root_id = None;
            self.focused_id = None;
            pending.appends.clear();
            self.destroyed = true;
            drop(pending);
            if let Some(registry) = self.tree.registry.upgrade() {
                registry.remove(tree_id);
            }
            return false;
        }

        if let Some(focused) = pending.focused_node_id.take() {
            self.focused_id = focused;
        }

        // (2) Subtree removals, recursive, skipping anything protected
        // because it was concurrently re-parented.
        let protected = std::mem::take(&mut pending.protected_from_deletion);
        let mut removals: Vec<NodeId> = pending.subtree_removals.drain().collect();
        while let Some(id) = removals.pop() {
            if protected.contains(&id) {
                continue;
            }
            if let Some(mut node) = self.nodes.remove(&id) {
                node.detach_platform_handle();
                removals.extend(
                    node.children_ids()
                        .iter()
                        .copied()
                        .filter(|child| !protected.contains(child)),
                );
            }
        }

        // (3) Appends. A replacement frees the old record first (removals
        // above already ran), then detaches its handle and installs the
        // new record with the handle re-attached.
        for change in pending.appends.drain(..) {
            let NodeChange { data, handle } = change;
            let id = data.id;
            tracing::trace!(target: "axmirror::drain", tree = %tree_id, node = %id, "append");
            let mut new_node = NodeSnapshot::from_data(tree_id, data);
            if let Some(mut existing) = self.nodes.remove(&id) {
                existing.detach_platform_handle();
            }
            if let Some(handle) = handle {
                new_node.attach_platform_handle(handle);
            }
            self.nodes.insert(id, new_node);
        }

        // (4) Parent-pointer patches.
        for (id, parent) in pending.parent_updates.drain() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.set_parent(parent);
            }
        }

        // (5) Child-list patches.
        for (id, children) in pending.children_updates.drain(..) {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.set_children_ids(children);
            }
        }

        // (6) Property patches.
        for change in pending.property_changes.drain(..) {
            if let Some(node) = self.nodes.get_mut(&change.node_id) {
                for (property, value) in change.properties {
                    node.set_property(property, value);
                }
                node.shrink_properties_after_updates();
            }
        }

        // (7) Auxiliary swap-in fields.
        if let Some(regions) = pending.sorted_live_regions.take() {
            self.sorted_live_regions = regions;
        }
        if let Some(range) = pending.selected_range.take() {
            self.selected_range = Some(range);
        }

        // (8) Root resolution, last, so every append above is visible.
        if let Some(root) = pending.root_node_id {
            if self.nodes.contains_key(&root) {
                self.root_id = Some(root);
                pending.root_node_id = None;
            }
        }

        true
    }

    /// O(1) lookup of a node snapshot. Never blocks and never falls back
    /// to the owner thread.
    #[inline]
    pub fn object_for_id(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.get(&id)
    }

    /// The resolved root node.
    pub fn root(&self) -> Option<&NodeSnapshot> {
        self.root_id.and_then(|id| self.object_for_id(id))
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    pub fn focused_node_id(&self) -> Option<NodeId> {
        self.focused_id
    }

    pub fn focused_node(&self) -> Option<&NodeSnapshot> {
        self.focused_id.and_then(|id| self.object_for_id(id))
    }

    pub fn selected_marker_range(&self) -> Option<&TextMarkerRange> {
        self.selected_range.as_ref()
    }

    pub fn sorted_live_regions(&self) -> &[NodeId] {
        &self.sorted_live_regions
    }

    pub fn loading_progress(&self) -> f64 {
        self.tree.loading_progress()
    }

    /// Number of resolved nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---- Reader-side traversal --------------------------------------------

    /// The first child of `id` that has been resolved into the map.
    pub fn first_resolved_child(&self, id: NodeId) -> Option<NodeId> {
        self.object_for_id(id)?
            .children_ids()
            .iter()
            .copied()
            .find(|child| self.nodes.contains_key(child))
    }

    /// The next resolved sibling of `id`.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.object_for_id(self.object_for_id(id)?.parent_id()?)?;
        let siblings = parent.children_ids();
        let position = siblings.iter().position(|child| *child == id)?;
        siblings[position + 1..]
            .iter()
            .copied()
            .find(|child| self.nodes.contains_key(child))
    }

    /// The previous resolved sibling of `id`.
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.object_for_id(self.object_for_id(id)?.parent_id()?)?;
        let siblings = parent.children_ids();
        let position = siblings.iter().position(|child| *child == id)?;
        siblings[..position]
            .iter()
            .rev()
            .copied()
            .find(|child| self.nodes.contains_key(child))
    }

    /// The deepest last resolved descendant of `id`, or `id` itself.
    pub fn deepest_last_child(&self, id: NodeId) -> NodeId {
        let mut current = id;
        loop {
            let Some(node) = self.object_for_id(current) else {
                return current;
            };
            let Some(last) = node
                .children_ids()
                .iter()
                .rev()
                .copied()
                .find(|child| self.nodes.contains_key(child))
            else {
                return current;
            };
            current = last;
        }
    }

    /// The next node in pre-order traversal.
    pub fn next_in_pre_order(&self, id: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_resolved_child(id) {
            return Some(child);
        }
        let mut current = id;
        loop {
            if let Some(sibling) = self.next_sibling(current) {
                return Some(sibling);
            }
            current = self.object_for_id(current)?.parent_id()?;
        }
    }

    /// The previous node in pre-order traversal.
    pub fn previous_in_pre_order(&self, id: NodeId) -> Option<NodeId> {
        if let Some(sibling) = self.previous_sibling(id) {
            return Some(self.deepest_last_child(sibling));
        }
        self.object_for_id(id)?.parent_id()
    }

    /// The closest self-or-ancestor that roots an editable region.
    pub fn editable_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let node = self.object_for_id(candidate)?;
            if node.is_editable_root() || node.role().is_text_control() {
                return Some(candidate);
            }
            current = node.parent_id();
        }
        None
    }

    /// Whether `ancestor` is on `id`'s parent chain (self excluded).
    pub fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.object_for_id(id).and_then(|node| node.parent_id());
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.object_for_id(candidate).and_then(|node| node.parent_id());
        }
        false
    }

    /// The node's viewport-relative frame.
    ///
    /// Consults the snapshot record, then the shared geometry cache, and
    /// finally performs the blocking owner-thread round-trip. This is the
    /// only read path that can block; callers treat it as a slow path.
    pub fn relative_frame(&self, id: NodeId) -> Option<Rect> {
        if let Some(node) = self.object_for_id(id)
            && let Some(frame) = node.rect_value(NodeProperty::RelativeFrame)
        {
            return Some(frame);
        }
        if let Some(frame) = self.tree.geometry.frame_for(id) {
            return Some(frame);
        }

        tracing::debug!(target: "axmirror::tree", node = %id, "frame not cached, blocking on owner thread");
        let tree = self.tree.clone();
        // An absent or torn-down owner loop degrades to an empty result,
        // never an error signal.
        self.tree
            .call_owner(move || tree.resolve_frame_on_owner(id))
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::StaticLiveTree;
    use crate::property::PropertyValue;

    fn node_id(raw: u64) -> NodeId {
        NodeId::from_raw(raw).unwrap()
    }

    /// root(1) -> [a(2), b(3)]
    fn small_live_tree() -> StaticLiveTree {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::Group, None, vec![node_id(2), node_id(3)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.insert_node(node_id(3), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_root(node_id(1));
        live
    }

    fn build_reader(live: &StaticLiveTree) -> TreeReader {
        let registry = TreeRegistry::new();
        let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
        tree.generate_subtree(live, live.root_id().unwrap());
        let mut reader = TreeReader::new(tree);
        reader.apply_pending_changes();
        reader
    }

    #[test]
    fn test_generate_and_drain() {
        let live = small_live_tree();
        let reader = build_reader(&live);

        assert_eq!(reader.len(), 3);
        assert_eq!(reader.root_id(), Some(node_id(1)));
        let root = reader.root().unwrap();
        assert_eq!(root.children_ids(), &[node_id(2), node_id(3)]);
        assert_eq!(
            reader.object_for_id(node_id(2)).unwrap().parent_id(),
            Some(node_id(1))
        );
        // Handles were attached during the drain.
        assert_eq!(live.handle(node_id(2)).unwrap().attached_node(), Some(node_id(2)));
    }

    #[test]
    fn test_absent_id_resolves_to_none() {
        let live = small_live_tree();
        let reader = build_reader(&live);
        assert!(reader.object_for_id(node_id(99)).is_none());
    }

    #[test]
    fn test_empty_drain_is_idempotent() {
        let live = small_live_tree();
        let mut reader = build_reader(&live);

        let before = reader.object_for_id(node_id(2)).unwrap() as *const _;
        assert!(reader.apply_pending_changes());
        let after = reader.object_for_id(node_id(2)).unwrap() as *const _;
        // No node is re-created by an empty drain.
        assert_eq!(before, after);
    }

    #[test]
    fn test_update_children_appends_new_child() {
        let mut live = small_live_tree();
        let mut reader = build_reader(&live);

        live.insert_node(node_id(4), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_children(node_id(1), vec![node_id(2), node_id(3), node_id(4)]);
        reader
            .tree()
            .update_children(&live, node_id(1), ResolveNodeChanges::Yes);
        reader.apply_pending_changes();

        assert_eq!(reader.len(), 4);
        assert_eq!(
            reader.root().unwrap().children_ids(),
            &[node_id(2), node_id(3), node_id(4)]
        );
    }

    #[test]
    fn test_update_children_removes_vanished_child() {
        let mut live = small_live_tree();
        let mut reader = build_reader(&live);
        let removed_handle = live.handle(node_id(3)).unwrap();

        live.set_children(node_id(1), vec![node_id(2)]);
        live.remove(node_id(3));
        reader
            .tree()
            .update_children(&live, node_id(1), ResolveNodeChanges::Yes);
        // The ancestor's own node update was deferred; process it so the
        // refreshed child list lands in the same drain as the removal.
        reader.tree().process_queued_node_updates(&live);
        reader.apply_pending_changes();

        assert!(reader.object_for_id(node_id(3)).is_none());
        assert_eq!(reader.root().unwrap().children_ids(), &[node_id(2)]);
        // Detach happened after the node's own bookkeeping.
        assert!(!removed_handle.is_attached());
    }

    #[test]
    fn test_reparented_child_is_protected_from_deletion() {
        // root(1) -> [container(2) -> [text(4)], container(3)]
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::Group, None, vec![node_id(2), node_id(3)]);
        live.insert_node(node_id(2), Role::Group, Some(node_id(1)), vec![node_id(4)]);
        live.insert_node(node_id(3), Role::Group, Some(node_id(1)), vec![]);
        live.insert_node(node_id(4), Role::StaticText, Some(node_id(2)), vec![]);
        live.set_root(node_id(1));
        let mut reader = build_reader(&live);
        assert_eq!(reader.len(), 4);

        // Move text(4) from container(2) to container(3), then diff both
        // parents in one batch. Without deletion protection the old
        // parent's sweep would delete the node out from under the new one.
        live.set_children(node_id(2), vec![]);
        live.set_children(node_id(3), vec![node_id(4)]);
        live.set_parent(node_id(4), Some(node_id(3)));

        let tree = reader.tree().clone();
        tree.update_children(&live, node_id(3), ResolveNodeChanges::No);
        tree.update_children(&live, node_id(2), ResolveNodeChanges::No);
        tree.process_queued_node_updates(&live);
        reader.apply_pending_changes();

        let text = reader.object_for_id(node_id(4)).expect("survived re-parenting");
        assert_eq!(text.parent_id(), Some(node_id(3)));
        assert_eq!(
            reader.object_for_id(node_id(3)).unwrap().children_ids(),
            &[node_id(4)]
        );
        assert!(reader.object_for_id(node_id(2)).unwrap().children_ids().is_empty());
    }

    #[test]
    fn test_removal_and_same_id_append_in_one_drain() {
        let mut live = small_live_tree();
        let mut reader = build_reader(&live);
        let old_handle = live.handle(node_id(3)).unwrap();

        // Queue a removal for node 3 and an append reusing its id within
        // the same drain.
        let tree = reader.tree().clone();
        tree.remove_node(node_id(3), Some(node_id(1)));

        live.insert_node(node_id(3), Role::Button, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(3),
            NodeProperty::Title,
            PropertyValue::String("fresh".into()),
        );
        tree.update_node(&live, node_id(3));
        reader.apply_pending_changes();

        let node = reader.object_for_id(node_id(3)).expect("new record installed");
        assert_eq!(node.role(), Role::Button);
        assert_eq!(node.string_value(NodeProperty::Title), "fresh");
        // The old record's platform handle was detached; the new handle is
        // attached.
        assert!(!old_handle.is_attached());
        assert!(node.platform_handle().unwrap().is_attached());
    }

    #[test]
    fn test_property_patch_and_default_removal() {
        let mut live = small_live_tree();
        let mut reader = build_reader(&live);
        let tree = reader.tree().clone();

        live.set_property(
            node_id(2),
            NodeProperty::Description,
            PropertyValue::String("desc".into()),
        );
        let props: HashSet<_> = [NodeProperty::Description].into_iter().collect();
        tree.update_node_properties(&live, node_id(2), &props);
        reader.apply_pending_changes();
        assert_eq!(
            reader.object_for_id(node_id(2)).unwrap().string_value(NodeProperty::Description),
            "desc"
        );

        // Patch back to the default: the entry disappears from the bag.
        live.set_property(
            node_id(2),
            NodeProperty::Description,
            PropertyValue::String(String::new()),
        );
        tree.update_node_properties(&live, node_id(2), &props);
        reader.apply_pending_changes();
        assert_eq!(
            reader
                .object_for_id(node_id(2))
                .unwrap()
                .property_value(NodeProperty::Description),
            PropertyValue::Null
        );
    }

    #[test]
    fn test_focus_and_live_regions_swap_in() {
        let live = small_live_tree();
        let mut reader = build_reader(&live);
        let tree = reader.tree().clone();

        tree.set_focused_node_id(Some(node_id(2)));
        tree.sorted_live_regions_did_change(vec![node_id(3)]);
        reader.apply_pending_changes();

        assert_eq!(reader.focused_node_id(), Some(node_id(2)));
        assert_eq!(reader.sorted_live_regions(), &[node_id(3)]);
    }

    #[test]
    fn test_destruction_drain() {
        let live = small_live_tree();
        // Own the registry for the lifetime of the test: the tree only holds a
        // Weak back-reference, so the registry service must outlive it here the
        // way the application root would in real usage.
        let _registry_owner = TreeRegistry::new();
        let tree = SnapshotTreeBuilder::new().build(&_registry_owner).unwrap();
        tree.generate_subtree(&live, live.root_id().unwrap());
        let mut reader = TreeReader::new(tree);
        reader.apply_pending_changes();
        let tree = reader.tree().clone();
        let registry = tree.registry.upgrade().unwrap();
        let handle = live.handle(node_id(2)).unwrap();

        tree.queue_for_destruction();
        assert!(!reader.apply_pending_changes());
        assert!(reader.is_destroyed());
        assert!(reader.is_empty());
        assert!(!handle.is_attached());
        // The tree removed itself from the registry.
        assert!(registry.tree_for_id(tree.id()).is_none());
        // Further drains are refused.
        assert!(!reader.apply_pending_changes());
    }

    #[test]
    fn test_queued_node_updates_batch() {
        let mut live = small_live_tree();
        let mut reader = build_reader(&live);
        let tree = reader.tree().clone();

        live.set_property(
            node_id(2),
            NodeProperty::Title,
            PropertyValue::String("t".into()),
        );
        tree.queue_node_update(
            node_id(2),
            &NodeUpdateOptions::properties([NodeProperty::Title]),
        );
        // A whole-node update for the same id subsumes the property one.
        tree.queue_node_update(node_id(2), &NodeUpdateOptions::node_update());
        tree.process_queued_node_updates(&live);
        reader.apply_pending_changes();

        assert_eq!(
            reader.object_for_id(node_id(2)).unwrap().string_value(NodeProperty::Title),
            "t"
        );
    }

    #[test]
    fn test_unconnected_node_append() {
        let mut live = small_live_tree();
        let mut reader = build_reader(&live);
        let tree = reader.tree().clone();

        live.insert_node(node_id(9), Role::Image, None, vec![]);
        tree.add_unconnected_node(&live, node_id(9));
        reader.apply_pending_changes();

        assert!(reader.object_for_id(node_id(9)).is_some());
        // Unconnected nodes don't participate in structure.
        assert_eq!(reader.root().unwrap().children_ids().len(), 2);
    }

    #[test]
    fn test_loading_progress_visible_to_reader() {
        let live = small_live_tree();
        let reader = build_reader(&live);
        reader.tree().update_loading_progress(0.5);
        assert_eq!(reader.loading_progress(), 0.5);
    }

    #[test]
    fn test_empty_content_tree() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ScrollArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::ContentArea, Some(node_id(1)), vec![node_id(3)]);
        live.insert_node(node_id(3), Role::StaticText, Some(node_id(2)), vec![]);
        live.set_root(node_id(1));

        let registry = TreeRegistry::new();
        let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
        tree.generate_empty_content(&live);
        assert!(tree.is_empty_content_tree());

        let mut reader = TreeReader::new(tree);
        reader.apply_pending_changes();
        // Only the scroll root and content area exist in the placeholder.
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.root_id(), Some(node_id(1)));
        assert_eq!(reader.focused_node_id(), Some(node_id(2)));
        assert!(reader.object_for_id(node_id(3)).is_none());
    }

    #[test]
    fn test_replacing_tree_progress() {
        let live = small_live_tree();

        let registry = TreeRegistry::new();
        let placeholder = SnapshotTreeBuilder::new().build(&registry).unwrap();
        placeholder.generate_empty_content(&live);
        assert_eq!(placeholder.processing_progress(), 0.0);

        let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
        tree.set_replacing_tree(placeholder.clone());
        tree.generate_subtree(&live, node_id(1));
        assert_eq!(placeholder.processing_progress(), 1.0);
    }
}
