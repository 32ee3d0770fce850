//! Node snapshots: the reader-thread record of one accessible node.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::id::{NodeId, TreeId};
use crate::property::{
    EmissionBehavior, NodeProperty, PropertyFlag, PropertyFlags, PropertyValue, PropertyVec,
    property_in, set_property_in,
};
use crate::role::Role;
use crate::text_run::TextRuns;

/// An opaque platform wrapper handle, attached 1:1 to each snapshot node.
///
/// The snapshot tree's only obligations are attach-on-append and
/// detach-on-remove/destroy, in that order relative to its own
/// bookkeeping. The handle is shared with the platform layer, so the
/// attachment state is observable from outside the tree.
#[derive(Clone)]
pub struct PlatformHandle {
    inner: Arc<HandleState>,
}

struct HandleState {
    attached_to: Mutex<Option<NodeId>>,
}

impl PlatformHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleState {
                attached_to: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn attach(&self, id: NodeId) {
        *self.inner.attached_to.lock() = Some(id);
    }

    pub(crate) fn detach(&self) {
        *self.inner.attached_to.lock() = None;
    }

    /// Whether the handle is currently attached to a snapshot node.
    pub fn is_attached(&self) -> bool {
        self.inner.attached_to.lock().is_some()
    }

    /// The node this handle is attached to, if any.
    pub fn attached_node(&self) -> Option<NodeId> {
        *self.inner.attached_to.lock()
    }

    /// Whether two handles refer to the same platform wrapper.
    pub fn same_wrapper(&self, other: &PlatformHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for PlatformHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlatformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformHandle")
            .field("attached_to", &self.attached_node())
            .finish()
    }
}

/// The record built on the owner thread for one node append.
///
/// Carries values, not shared references; it is consumed (moved) into the
/// reader map during a drain and never aliased afterwards.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub id: NodeId,
    pub role: Role,
    pub parent_id: Option<NodeId>,
    pub children_ids: Vec<NodeId>,
    pub properties: PropertyVec,
    pub flags: PropertyFlags,
}

impl NodeData {
    pub fn new(id: NodeId, role: Role) -> Self {
        Self {
            id,
            role,
            parent_id: None,
            children_ids: Vec::new(),
            properties: Vec::new(),
            flags: PropertyFlags::empty(),
        }
    }

    /// Store a property, routing flags and dropping defaults.
    pub fn set_property(&mut self, property: NodeProperty, value: PropertyValue) {
        set_property_in(property, value, &mut self.properties, &mut self.flags);
    }
}

/// The reader-thread snapshot of one accessible node.
///
/// Immutable between drains: only `apply_pending_changes` replaces or
/// patches records, and only on the reader thread.
pub struct NodeSnapshot {
    tree_id: TreeId,
    id: NodeId,
    role: Role,
    parent_id: Option<NodeId>,
    children_ids: Vec<NodeId>,
    properties: PropertyVec,
    flags: PropertyFlags,
    platform_handle: Option<PlatformHandle>,
}

impl NodeSnapshot {
    pub(crate) fn from_data(tree_id: TreeId, data: NodeData) -> Self {
        Self {
            tree_id,
            id: data.id,
            role: data.role,
            parent_id: data.parent_id,
            children_ids: data.children_ids,
            properties: data.properties,
            flags: data.flags,
            platform_handle: None,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn tree_id(&self) -> TreeId {
        self.tree_id
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    /// The ordered child-id list. May reference ids that have not been
    /// resolved into the reader map yet; lookups through the tree skip
    /// those until their appends drain.
    #[inline]
    pub fn children_ids(&self) -> &[NodeId] {
        &self.children_ids
    }

    pub(crate) fn set_parent(&mut self, parent_id: Option<NodeId>) {
        self.parent_id = parent_id;
    }

    pub(crate) fn set_children_ids(&mut self, children_ids: Vec<NodeId>) {
        self.children_ids = children_ids;
    }

    pub(crate) fn set_property(&mut self, property: NodeProperty, value: PropertyValue) {
        set_property_in(property, value, &mut self.properties, &mut self.flags);
    }

    pub(crate) fn shrink_properties_after_updates(&mut self) {
        self.properties.shrink_to_fit();
    }

    /// Fetch a property value; `Null` (the property's default) when
    /// absent. Absence is the normal encoding of "default value", not an
    /// error.
    pub fn property_value(&self, property: NodeProperty) -> PropertyValue {
        if let Some(flag) = property.as_flag() {
            return PropertyValue::Bool(self.flags.contains(flag));
        }
        property_in(&self.properties, property)
    }

    /// Boolean property accessor over both the flag word and the bag.
    pub fn bool_value(&self, property: NodeProperty) -> bool {
        match self.property_value(property) {
            PropertyValue::Bool(b) => b,
            _ => false,
        }
    }

    /// String property accessor; empty string when absent.
    pub fn string_value(&self, property: NodeProperty) -> String {
        match self.property_value(property) {
            PropertyValue::String(s) => s,
            _ => String::new(),
        }
    }

    /// Float property accessor; zero when absent.
    pub fn float_value(&self, property: NodeProperty) -> f64 {
        match self.property_value(property) {
            PropertyValue::Float(f) => f,
            _ => 0.0,
        }
    }

    /// Unsigned property accessor; zero when absent.
    pub fn uint_value(&self, property: NodeProperty) -> u32 {
        match self.property_value(property) {
            PropertyValue::UInt(u) => u,
            _ => 0,
        }
    }

    /// Rect property accessor; `None` when not cached (the caller decides
    /// whether to escalate to the owner thread).
    pub fn rect_value(&self, property: NodeProperty) -> Option<crate::geometry::Rect> {
        match self.property_value(property) {
            PropertyValue::Rect(r) => Some(r),
            _ => None,
        }
    }

    /// The node's cached text runs, if any were summarized.
    pub fn text_runs(&self) -> Option<Arc<TextRuns>> {
        match self.property_value(NodeProperty::TextRuns) {
            PropertyValue::TextRuns(runs) => Some(runs),
            _ => None,
        }
    }

    /// True when the node carries at least one non-empty text run.
    pub fn has_text_runs(&self) -> bool {
        self.text_runs().is_some_and(|runs| !runs.is_empty())
    }

    /// What this node contributes to flattened text at its boundary.
    pub fn emission_behavior(&self) -> EmissionBehavior {
        EmissionBehavior::from_flags(self.flags)
    }

    /// Whether crossing into this node introduces a rendered line break.
    pub fn emits_newline(&self) -> bool {
        matches!(
            self.emission_behavior(),
            EmissionBehavior::Newline | EmissionBehavior::DoubleNewline
        )
    }

    /// Whether this node is the root of an editable region.
    pub fn is_editable_root(&self) -> bool {
        self.flags.contains(PropertyFlag::IsEditableRoot)
    }

    pub fn is_ignored(&self) -> bool {
        self.flags.contains(PropertyFlag::IsIgnored)
    }

    pub(crate) fn attach_platform_handle(&mut self, handle: PlatformHandle) {
        handle.attach(self.id);
        self.platform_handle = Some(handle);
    }

    pub(crate) fn detach_platform_handle(&mut self) {
        if let Some(handle) = self.platform_handle.take() {
            handle.detach();
        }
    }

    pub fn platform_handle(&self) -> Option<&PlatformHandle> {
        self.platform_handle.as_ref()
    }

    /// One-line human-readable description, for diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "{:?} {:?} parent={:?} children={}",
            self.role,
            self.id,
            self.parent_id,
            self.children_ids.len()
        )
    }
}

impl fmt::Debug for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSnapshot")
            .field("tree_id", &self.tree_id)
            .field("id", &self.id)
            .field("role", &self.role)
            .field("parent_id", &self.parent_id)
            .field("children_ids", &self.children_ids)
            .field("properties", &self.properties.len())
            .finish()
    }
}
