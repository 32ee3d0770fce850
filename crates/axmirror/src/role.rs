//! Node roles.

/// The role of a snapshot node.
///
/// This is a simplified closed set covering the structural distinctions
/// the snapshot and marker layers actually consult. Resolving a live
/// object's semantics down to one of these tags is the live tree's job;
/// the snapshot side only reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Role {
    /// A generic node with no specific role.
    #[default]
    Unknown,

    /// The scrollable root container of a tree.
    ScrollArea,

    /// The document content area directly under the scroll root. A marker
    /// at offset 0 of this node is the canonical start-of-content
    /// position.
    ContentArea,

    /// A generic grouping container.
    Group,

    /// A run of static rendered text.
    StaticText,

    /// A hard line break.
    LineBreak,

    /// A single-line text input field.
    TextField,

    /// A multi-line text editing area.
    TextArea,

    /// A push button.
    Button,

    /// A checkbox.
    CheckBox,

    /// A toggle switch.
    Switch,

    /// A hyperlink.
    Link,

    /// An image.
    Image,

    /// A progress indicator.
    ProgressIndicator,

    /// A list of items.
    List,

    /// An item within a list.
    ListItem,

    /// The bullet or number rendered before a list item's content.
    ListMarker,

    /// A table/grid.
    Table,

    /// A row within a table.
    Row,

    /// A cell within a table.
    Cell,
}

impl Role {
    /// Whether nodes with this role are text controls (their own content
    /// start counts as a line-index origin).
    #[inline]
    pub fn is_text_control(self) -> bool {
        matches!(self, Role::TextField | Role::TextArea)
    }

    /// Whether this role marks a hard line break node.
    #[inline]
    pub fn is_line_break(self) -> bool {
        self == Role::LineBreak
    }

    /// Roles that must be re-snapshot even when their child-id list did
    /// not change. These roles are not allowed to have accessible
    /// children, but can have render-tree children whose changes affect
    /// many of their own properties (e.g. anything derived from the text
    /// under the element).
    #[inline]
    pub fn always_update_on_children_change(self) -> bool {
        matches!(
            self,
            Role::Button | Role::CheckBox | Role::Switch | Role::ProgressIndicator
        )
    }
}
