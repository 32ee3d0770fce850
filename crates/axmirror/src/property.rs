//! The sparse node property bag and its value sum type.
//!
//! A node's properties are stored two ways:
//!
//! - The most common boolean properties live in a packed bit-flag word
//!   ([`PropertyFlags`]). This is purely a space optimization, not a
//!   semantic distinction.
//! - Everything else lives in a sparse vector of `(key, value)` pairs,
//!   where absence encodes "this property has its default value".
//!
//! The flag space and the bag space are disjoint by construction: a
//! property either always maps to a flag ([`NodeProperty::as_flag`]
//! returns `Some`) or always lives in the bag, never both.

use std::sync::Arc;

use static_assertions::const_assert;

use crate::geometry::{Point, Rect};
use crate::id::NodeId;
use crate::text_run::{LineId, TextRuns};

/// A contiguous character range, counted in Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharacterRange {
    pub location: usize,
    pub length: usize,
}

impl CharacterRange {
    pub const fn new(location: usize, length: usize) -> Self {
        Self { location, length }
    }
}

/// Boolean properties stored in the packed flag word.
///
/// If you edit these, keep the matching [`NodeProperty`] variants and
/// [`NodeProperty::as_flag`] in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PropertyFlag {
    CanSetFocus = 1 << 0,
    CanSetValue = 1 << 1,
    HasBoldFont = 1 << 2,
    HasItalicFont = 1 << 3,
    IsEnabled = 1 << 4,
    IsIgnored = 1 << 5,
    IsInlineText = 1 << 6,
    IsKeyboardFocusable = 1 << 7,
    IsVisited = 1 << 8,
    IsVisible = 1 << 9,
    SupportsExpanded = 1 << 10,
    SupportsDragging = 1 << 11,
    /// The node is the root of an editable region.
    IsEditableRoot = 1 << 12,
    // These three are the variants of `EmissionBehavior`.
    EmitsTab = 1 << 13,
    EmitsNewline = 1 << 14,
    EmitsDoubleNewline = 1 << 15,
}

const LAST_PROPERTY_FLAG: u32 = PropertyFlag::EmitsDoubleNewline as u32;
// The flag word is a u32; the highest flag must still fit.
const_assert!(LAST_PROPERTY_FLAG <= 1 << 31);

/// A packed word of [`PropertyFlag`] bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub fn contains(self, flag: PropertyFlag) -> bool {
        self.0 & flag as u32 != 0
    }

    #[inline]
    pub fn set(&mut self, flag: PropertyFlag, on: bool) {
        if on {
            self.0 |= flag as u32;
        } else {
            self.0 &= !(flag as u32);
        }
    }

    #[inline]
    pub fn insert(&mut self, flag: PropertyFlag) {
        self.set(flag, true);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// What a node contributes to flattened text when a range crosses its
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmissionBehavior {
    #[default]
    None,
    Newline,
    DoubleNewline,
    Tab,
}

impl EmissionBehavior {
    /// Derive the emission behavior from a node's flag word.
    pub fn from_flags(flags: PropertyFlags) -> Self {
        if flags.contains(PropertyFlag::EmitsTab) {
            EmissionBehavior::Tab
        } else if flags.contains(PropertyFlag::EmitsDoubleNewline) {
            EmissionBehavior::DoubleNewline
        } else if flags.contains(PropertyFlag::EmitsNewline) {
            EmissionBehavior::Newline
        } else {
            EmissionBehavior::None
        }
    }
}

/// The closed set of property keys a node snapshot can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NodeProperty {
    // Flag-backed boolean properties. These never appear in the sparse
    // bag; setting one routes to the flag word instead.
    CanSetFocus,
    CanSetValue,
    HasBoldFont,
    HasItalicFont,
    IsEnabled,
    IsIgnored,
    IsInlineText,
    IsKeyboardFocusable,
    IsVisited,
    IsVisible,
    SupportsExpanded,
    SupportsDragging,
    IsEditableRoot,
    EmitsTab,
    EmitsNewline,
    EmitsDoubleNewline,

    // Bag properties.
    AccessKey,
    Description,
    Language,
    Level,
    ListMarkerLineId,
    ListMarkerText,
    MaxValueForRange,
    MinValueForRange,
    PosInSet,
    RelativeFrame,
    ScreenRelativePosition,
    SelectedTextRange,
    SetSize,
    StringValue,
    TextRuns,
    Title,
    Url,
    ValueForRange,
}

impl NodeProperty {
    /// The flag this property is stored as, or `None` for bag properties.
    pub fn as_flag(self) -> Option<PropertyFlag> {
        Some(match self {
            NodeProperty::CanSetFocus => PropertyFlag::CanSetFocus,
            NodeProperty::CanSetValue => PropertyFlag::CanSetValue,
            NodeProperty::HasBoldFont => PropertyFlag::HasBoldFont,
            NodeProperty::HasItalicFont => PropertyFlag::HasItalicFont,
            NodeProperty::IsEnabled => PropertyFlag::IsEnabled,
            NodeProperty::IsIgnored => PropertyFlag::IsIgnored,
            NodeProperty::IsInlineText => PropertyFlag::IsInlineText,
            NodeProperty::IsKeyboardFocusable => PropertyFlag::IsKeyboardFocusable,
            NodeProperty::IsVisited => PropertyFlag::IsVisited,
            NodeProperty::IsVisible => PropertyFlag::IsVisible,
            NodeProperty::SupportsExpanded => PropertyFlag::SupportsExpanded,
            NodeProperty::SupportsDragging => PropertyFlag::SupportsDragging,
            NodeProperty::IsEditableRoot => PropertyFlag::IsEditableRoot,
            NodeProperty::EmitsTab => PropertyFlag::EmitsTab,
            NodeProperty::EmitsNewline => PropertyFlag::EmitsNewline,
            NodeProperty::EmitsDoubleNewline => PropertyFlag::EmitsDoubleNewline,
            _ => return None,
        })
    }
}

/// A property value.
///
/// One case per concrete type the property set needs. When adding a case,
/// the compiler forces [`is_default_value`] to declare its default.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    #[default]
    Null,
    Bool(bool),
    UInt(u32),
    Float(f64),
    String(String),
    NodeId(NodeId),
    NodeIdVec(Vec<NodeId>),
    Point(Point),
    Rect(Rect),
    CharRange(CharacterRange),
    TextRuns(Arc<TextRuns>),
    LineId(LineId),
}

// Keep the value variant compact; it is stored per property per node.
const_assert!(std::mem::size_of::<PropertyValue>() <= 40);

/// Whether a value is the default for its type.
///
/// The bag stays sparse by never storing defaults: a `set_property` call
/// that receives a default value removes the entry instead. This predicate
/// is total over [`PropertyValue`] so newly added kinds must declare their
/// default here.
pub fn is_default_value(value: &PropertyValue) -> bool {
    match value {
        PropertyValue::Null => true,
        PropertyValue::Bool(b) => !b,
        PropertyValue::UInt(u) => *u == 0,
        PropertyValue::Float(f) => *f == 0.0,
        PropertyValue::String(s) => s.is_empty(),
        PropertyValue::NodeId(_) => false,
        PropertyValue::NodeIdVec(v) => v.is_empty(),
        PropertyValue::Point(p) => *p == Point::default(),
        PropertyValue::Rect(r) => *r == Rect::ZERO,
        PropertyValue::CharRange(r) => *r == CharacterRange::default(),
        PropertyValue::TextRuns(runs) => runs.is_empty(),
        PropertyValue::LineId(_) => false,
    }
}

/// The sparse property vector type shared by node records and patches.
pub type PropertyVec = Vec<(NodeProperty, PropertyValue)>;

/// Store a property into a record under construction or under patching.
///
/// Flag-backed properties route to the flag word; default values remove
/// the bag entry to keep it sparse.
pub fn set_property_in(
    property: NodeProperty,
    value: PropertyValue,
    properties: &mut PropertyVec,
    flags: &mut PropertyFlags,
) {
    if let Some(flag) = property.as_flag() {
        flags.set(flag, matches!(value, PropertyValue::Bool(true)));
        return;
    }

    properties.retain(|(key, _)| *key != property);
    if !is_default_value(&value) {
        properties.push((property, value));
    }
}

/// Fetch a property from a sparse vector, `Null` when absent.
pub fn property_in(properties: &PropertyVec, property: NodeProperty) -> PropertyValue {
    properties
        .iter()
        .find(|(key, _)| *key == property)
        .map(|(_, value)| value.clone())
        .unwrap_or(PropertyValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_set_and_clear() {
        let mut flags = PropertyFlags::empty();
        assert!(!flags.contains(PropertyFlag::IsEnabled));

        flags.insert(PropertyFlag::IsEnabled);
        assert!(flags.contains(PropertyFlag::IsEnabled));

        flags.set(PropertyFlag::IsEnabled, false);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_flag_and_bag_spaces_disjoint() {
        assert!(NodeProperty::IsEnabled.as_flag().is_some());
        assert!(NodeProperty::Title.as_flag().is_none());
        assert!(NodeProperty::TextRuns.as_flag().is_none());
    }

    #[test]
    fn test_default_values() {
        assert!(is_default_value(&PropertyValue::Null));
        assert!(is_default_value(&PropertyValue::Bool(false)));
        assert!(!is_default_value(&PropertyValue::Bool(true)));
        assert!(is_default_value(&PropertyValue::String(String::new())));
        assert!(!is_default_value(&PropertyValue::String("x".into())));
        assert!(is_default_value(&PropertyValue::UInt(0)));
        assert!(is_default_value(&PropertyValue::Float(0.0)));
        assert!(is_default_value(&PropertyValue::Rect(Rect::ZERO)));
        assert!(!is_default_value(&PropertyValue::NodeId(
            NodeId::from_raw(1).unwrap()
        )));
        assert!(is_default_value(&PropertyValue::TextRuns(Arc::new(
            TextRuns::default()
        ))));
    }

    #[test]
    fn test_set_property_removes_defaults() {
        let mut properties = PropertyVec::new();
        let mut flags = PropertyFlags::empty();

        set_property_in(
            NodeProperty::Title,
            PropertyValue::String("hi".into()),
            &mut properties,
            &mut flags,
        );
        assert_eq!(properties.len(), 1);

        // Storing the default for the same key removes the entry.
        set_property_in(
            NodeProperty::Title,
            PropertyValue::String(String::new()),
            &mut properties,
            &mut flags,
        );
        assert!(properties.is_empty());
    }

    #[test]
    fn test_set_property_replaces_existing() {
        let mut properties = PropertyVec::new();
        let mut flags = PropertyFlags::empty();

        set_property_in(
            NodeProperty::Description,
            PropertyValue::String("a".into()),
            &mut properties,
            &mut flags,
        );
        set_property_in(
            NodeProperty::Description,
            PropertyValue::String("b".into()),
            &mut properties,
            &mut flags,
        );
        assert_eq!(properties.len(), 1);
        assert_eq!(
            property_in(&properties, NodeProperty::Description),
            PropertyValue::String("b".into())
        );
    }

    #[test]
    fn test_flag_property_routes_to_flags() {
        let mut properties = PropertyVec::new();
        let mut flags = PropertyFlags::empty();

        set_property_in(
            NodeProperty::EmitsNewline,
            PropertyValue::Bool(true),
            &mut properties,
            &mut flags,
        );
        assert!(properties.is_empty());
        assert!(flags.contains(PropertyFlag::EmitsNewline));
        assert_eq!(EmissionBehavior::from_flags(flags), EmissionBehavior::Newline);

        set_property_in(
            NodeProperty::EmitsNewline,
            PropertyValue::Bool(false),
            &mut properties,
            &mut flags,
        );
        assert_eq!(EmissionBehavior::from_flags(flags), EmissionBehavior::None);
    }

    #[test]
    fn test_property_in_absent_is_null() {
        let properties = PropertyVec::new();
        assert_eq!(
            property_in(&properties, NodeProperty::Url),
            PropertyValue::Null
        );
    }
}
