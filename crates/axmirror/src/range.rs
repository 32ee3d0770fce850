//! Marker ranges.
//!
//! A [`TextMarkerRange`] is a pair of markers stored start ≤ end in tree
//! order. Construction normalizes ordering by swapping; a pair that is
//! mutually unordered (e.g. cross-tree) yields an empty range rather than
//! an error. Operations on empty ranges return empty values, never panic.

use std::cmp::Ordering;

use crate::geometry::Rect;
use crate::id::{NodeId, TreeId};
use crate::marker::{CoalesceObjectBreaks, Direction, IgnoreLineBreaks, TextMarker,
    find_object_with_runs};
use crate::property::{CharacterRange, EmissionBehavior, NodeProperty, PropertyValue};
use crate::role::Role;
use crate::tree::TreeReader;
use crate::units::{IncludeTrailingLineBreak, TextUnitBoundary};

/// Which line relative to a marker a line range covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRangeType {
    Current,
    Left,
    Right,
}

/// Which word relative to a marker a word range covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordRangeType {
    Left,
    Right,
}

/// Which sentence relative to a marker a sentence range covers. Only
/// `Current` produces a range today; the other variants yield an empty
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceRangeType {
    Current,
    Left,
    Right,
}

/// An ordered pair of markers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextMarkerRange {
    start: TextMarker,
    end: TextMarker,
}

impl TextMarkerRange {
    /// The empty range.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a range from two markers, normalizing their order.
    ///
    /// A mutually unordered pair (either marker unresolvable, or the
    /// markers belong to different trees) yields the empty range. This is
    /// deliberate, test-visible policy, not an error path.
    pub fn new(reader: &TreeReader, a: TextMarker, b: TextMarker) -> Self {
        match a.order(&b, reader) {
            Some(Ordering::Greater) => Self { start: b, end: a },
            Some(_) => Self { start: a, end: b },
            None => Self::empty(),
        }
    }

    /// Build a range over a character interval of a single node. The
    /// interval is normalized without needing a reader.
    pub fn confined(
        tree_id: Option<TreeId>,
        node_id: Option<NodeId>,
        range: CharacterRange,
    ) -> Self {
        Self {
            start: TextMarker::new(tree_id, node_id, range.location),
            end: TextMarker::new(tree_id, node_id, range.location + range.length),
        }
    }

    /// Build from markers already known to be ordered.
    pub(crate) fn from_ordered(start: TextMarker, end: TextMarker) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn start(&self) -> &TextMarker {
        &self.start
    }

    #[inline]
    pub fn end(&self) -> &TextMarker {
        &self.end
    }

    /// Whether both endpoints exist. The empty range is not valid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.start.is_null() && !self.end.is_null()
    }

    /// Whether the range covers zero positions.
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Whether both endpoints sit in the given node.
    pub fn is_confined_to(&self, node_id: Option<NodeId>) -> bool {
        self.start.node_id() == node_id
            && self.end.node_id() == node_id
            && self.start.tree_id() == self.end.tree_id()
    }

    /// Whether both endpoints sit in one (any) node.
    pub fn is_confined(&self) -> bool {
        self.is_valid() && self.is_confined_to(self.start.node_id())
    }

    /// Human-readable description, for diagnostics.
    pub fn describe(&self) -> String {
        format!("range start={{{}}} end={{{}}}", self.start.describe(), self.end.describe())
    }

    // ---- Intersection -----------------------------------------------------

    /// The overlap of two ranges, or `None` when they don't intersect.
    ///
    /// When both ranges are confined to the same node this is a plain
    /// offset-interval intersection. Otherwise the tree is walked
    /// node-by-node from one range's end toward the other's boundaries,
    /// because there is no global index that compares arbitrary
    /// cross-node offsets cheaply.
    pub fn intersection(&self, other: &TextMarkerRange, reader: &TreeReader) -> Option<TextMarkerRange> {
        if self.start.tree_id() != self.end.tree_id()
            || other.start.tree_id() != other.end.tree_id()
            || self.start.tree_id() != other.start.tree_id()
        {
            return None;
        }

        // Fast path: both ranges span one node.
        if self.start.node_id() == self.end.node_id()
            && other.start.node_id() == other.end.node_id()
        {
            if self.start.node_id() != other.start.node_id() {
                return None;
            }
            let start_offset = self.start.offset().max(other.start.offset());
            let end_offset = self.end.offset().min(other.end.offset());
            if start_offset > end_offset {
                return None;
            }
            return Some(TextMarkerRange::from_ordered(
                TextMarker::new(self.start.tree_id(), self.start.node_id(), start_offset),
                TextMarker::new(self.start.tree_id(), self.start.node_id(), end_offset),
            ));
        }

        if !self.is_valid() || !other.is_valid() {
            return None;
        }

        // Walking forward from |first|'s end, hitting |second|'s end
        // before |second|'s start proves the ranges overlap.
        let can_find_intersection = |first: &TextMarkerRange, second: &TextMarkerRange| -> bool {
            let mut current = first.end.node_id();
            while let Some(id) = current {
                if reader.object_for_id(id).is_none() {
                    return false;
                }
                if Some(id) == second.end.node_id() {
                    return true;
                }
                if Some(id) == second.start.node_id() {
                    // Found the start of the other range after exiting the
                    // origin object: no overlap, unless they share the
                    // boundary node.
                    return first.end.node_id() == second.start.node_id();
                }
                current = reader.next_in_pre_order(id);
            }
            false
        };

        let this_comes_before_other = can_find_intersection(self, other);
        if !this_comes_before_other && !can_find_intersection(other, self) {
            return None;
        }

        let intersection_end = if this_comes_before_other {
            self.end.clone()
        } else {
            other.end.clone()
        };

        // The ranges intersect; search backwards for the later of the two
        // start markers.
        let mut intersection_start = TextMarker::null();
        let mut current = intersection_end.node_id();
        while let Some(id) = current {
            if Some(id) == self.start.node_id() {
                intersection_start = self.start.clone();
                break;
            }
            if Some(id) == other.start.node_id() {
                intersection_start = other.start.clone();
                break;
            }
            current = reader.previous_in_pre_order(id);
        }
        let id = current?;

        if !reader.object_for_id(id)?.has_text_runs() {
            intersection_start = TextMarker::new(self.start.tree_id(), Some(id), 0);
        }
        Some(TextMarkerRange::from_ordered(intersection_start, intersection_end))
    }

    // ---- String materialization -------------------------------------------

    /// Flatten the range's content into a string.
    ///
    /// Traverses from start to end, collecting each text-bearing node's
    /// cached text. Exiting a node that declares newline emission inserts
    /// a newline (two for double-newline, a tab for tab emission), except
    /// when the text already ends with one.
    pub fn to_string(&self, reader: &TreeReader) -> String {
        let start = self.start.to_text_run_marker(reader, None);
        if !start.is_valid(reader) {
            return String::new();
        }
        let end = self.end.to_text_run_marker(reader, None);
        if !end.is_valid(reader) {
            return String::new();
        }

        let mut result = String::new();
        result.push_str(&list_marker_text_on_same_line(reader, &start));

        if start.node_id() == end.node_id() {
            let runs = start.runs(reader).expect("text-run marker");
            let min_offset = start.offset().min(end.offset());
            let max_offset = start.offset().max(end.offset());
            result.push_str(&runs.substring(min_offset, max_offset - min_offset));
            return result;
        }

        let emit_on_exit = |result: &mut String, behavior: EmissionBehavior| match behavior {
            EmissionBehavior::None => {}
            EmissionBehavior::Tab => result.push('\t'),
            EmissionBehavior::Newline | EmissionBehavior::DoubleNewline => {
                // Like a full-document text iterator, don't emit a newline
                // when the most recent character already is one.
                if result.is_empty() || !result.ends_with('\n') {
                    result.push('\n');
                    if behavior == EmissionBehavior::DoubleNewline {
                        result.push('\n');
                    }
                }
            }
        };

        let start_runs = start.runs(reader).expect("text-run marker");
        result.push_str(&start_runs.substring_from(start.offset()));

        let start_id = start.node_id().expect("valid marker");
        let end_id = end.node_id().expect("valid marker");
        let mut exits: Vec<EmissionBehavior> = Vec::new();
        let mut current = {
            let mut collect = |node: &crate::node::NodeSnapshot| {
                exits.push(node.emission_behavior());
            };
            find_object_with_runs(reader, start_id, Direction::Next, None, &mut collect)
        };
        for behavior in exits.drain(..) {
            emit_on_exit(&mut result, behavior);
        }
        while let Some(id) = current {
            if id == end_id {
                break;
            }
            if let Some(node) = reader.object_for_id(id) {
                // A text-bearing node's own declared emission lands before
                // its content.
                emit_on_exit(&mut result, node.emission_behavior());
                if let Some(runs) = node.text_runs() {
                    result.push_str(&runs.text());
                }
            }
            let mut collect = |node: &crate::node::NodeSnapshot| {
                exits.push(node.emission_behavior());
            };
            current = find_object_with_runs(reader, id, Direction::Next, None, &mut collect);
            for behavior in exits.drain(..) {
                emit_on_exit(&mut result, behavior);
            }
        }

        if let Some(end_node) = end.node(reader) {
            emit_on_exit(&mut result, end_node.emission_behavior());
        }
        let end_runs = end.runs(reader).expect("text-run marker");
        result.push_str(&end_runs.substring(0, end.offset()));
        result
    }

    // ---- Geometry ---------------------------------------------------------

    /// The bounds of the range's text relative to the viewport.
    ///
    /// The single-node case projects the sub-range's rectangle from the
    /// cached per-run geometry. The multi-node case unions the partial
    /// rectangles of the first and last nodes with the full rectangles of
    /// every node in between. May fall back to the blocking owner-thread
    /// path for uncached node frames.
    pub fn viewport_relative_frame(&self, reader: &TreeReader) -> Rect {
        let start = self.start.to_text_run_marker(reader, None);
        if !start.is_valid(reader) {
            return Rect::ZERO;
        }
        let end = self.end.to_text_run_marker(reader, None);
        if !end.is_valid(reader) {
            return Rect::ZERO;
        }

        let start_id = start.node_id().expect("valid marker");
        let end_id = end.node_id().expect("valid marker");

        if start_id == end_id {
            return frame_from_runs(reader, start_id, start.offset(), Some(end.offset()));
        }

        let mut result = frame_from_runs(reader, start_id, start.offset(), None);
        let mut current = Some(start_id);
        while let Some(id) = current {
            if id == end_id {
                break;
            }
            result = result.union(&frame_from_runs(reader, id, 0, None));
            current = find_object_with_runs(reader, id, Direction::Next, Some(end_id), &mut |_| {});
        }
        result.union(&frame_from_runs(reader, end_id, 0, Some(end.offset())))
    }

    // ---- Index projection -------------------------------------------------

    /// The range as a character interval into the tree's flattened
    /// content.
    pub fn character_range(&self, reader: &TreeReader) -> Option<CharacterRange> {
        if !self.is_valid() {
            return None;
        }
        let location = self.start.offset_from_root(reader);
        let end = self.end.offset_from_root(reader);
        Some(CharacterRange::new(location, end.saturating_sub(location)))
    }
}

/// The rectangle of `[start, end)` (or through the end of the runs when
/// `end` is `None`) within `node`, anchored at the node's
/// viewport-relative frame.
fn frame_from_runs(
    reader: &TreeReader,
    node_id: NodeId,
    start: usize,
    end: Option<usize>,
) -> Rect {
    let Some(runs) = reader.object_for_id(node_id).and_then(|node| node.text_runs()) else {
        return Rect::ZERO;
    };
    let total = runs.total_length();
    let end = end.unwrap_or(total);
    let frame = reader.relative_frame(node_id).unwrap_or(Rect::ZERO);
    if start == 0 && end == total {
        // The whole node's text: the cached frame already is the answer.
        return frame;
    }
    runs.local_rect(start, end).offset(frame.origin.x, frame.origin.y)
}

/// The text of a list marker rendered on the same line as `marker`, if
/// the marker is directly adjacent to it (offset 0 within a list item).
fn list_marker_text_on_same_line(reader: &TreeReader, marker: &TextMarker) -> String {
    if marker.offset() != 0 {
        return String::new();
    }
    let Some(node) = marker.node(reader) else {
        return String::new();
    };

    // Find a list-item self-or-ancestor.
    let mut current = Some(node.id());
    let mut list_item = None;
    while let Some(id) = current {
        let Some(candidate) = reader.object_for_id(id) else {
            break;
        };
        if candidate.role() == Role::ListItem {
            list_item = Some(id);
            break;
        }
        current = candidate.parent_id();
    }
    let Some(list_item) = list_item else {
        return String::new();
    };

    // Find the marker node among its descendants.
    let mut stack: Vec<NodeId> = reader
        .object_for_id(list_item)
        .map(|node| node.children_ids().to_vec())
        .unwrap_or_default();
    while let Some(id) = stack.pop() {
        let Some(candidate) = reader.object_for_id(id) else {
            continue;
        };
        if candidate.role() == Role::ListMarker {
            let line = match candidate.property_value(NodeProperty::ListMarkerLineId) {
                PropertyValue::LineId(line) => Some(line),
                _ => None,
            };
            if line.is_some() && line == marker.line_id(reader) {
                return candidate.string_value(NodeProperty::ListMarkerText);
            }
            continue;
        }
        stack.extend(candidate.children_ids().iter().copied());
    }
    String::new()
}

// ---- Range-producing marker operations ------------------------------------

impl TextMarker {
    /// The range of the line this marker is on (or the one left/right of
    /// it).
    pub fn line_range(
        &self,
        reader: &TreeReader,
        range_type: LineRangeType,
        include_trailing_line_break: IncludeTrailingLineBreak,
    ) -> TextMarkerRange {
        if !self.is_valid(reader) {
            return TextMarkerRange::empty();
        }
        if !self.is_in_text_run(reader) {
            return self.to_text_run_marker(reader, None).line_range(
                reader,
                range_type,
                include_trailing_line_break,
            );
        }

        match range_type {
            LineRangeType::Current => {
                let start = if self.at_line_start(reader) {
                    self.clone()
                } else {
                    self.previous_line_start(reader, None)
                };
                let end = if self.at_line_end(reader) {
                    self.clone()
                } else {
                    self.next_line_end(reader, include_trailing_line_break, None)
                };
                TextMarkerRange::from_ordered(start, end)
            }
            LineRangeType::Left => {
                // Move backwards off a line start first.
                let mut start = if self.at_line_start(reader) {
                    self.find_marker(
                        reader,
                        Direction::Previous,
                        CoalesceObjectBreaks::Yes,
                        IgnoreLineBreaks::No,
                        None,
                    )
                } else {
                    self.clone()
                };
                if !start.at_line_start(reader) {
                    start = start.previous_line_start(reader, None);
                }
                let end = start.next_line_end(reader, include_trailing_line_break, None);
                TextMarkerRange::from_ordered(start, end)
            }
            LineRangeType::Right => {
                // Move forwards off a line end first.
                let mut start = if self.at_line_end(reader) {
                    self.find_marker(
                        reader,
                        Direction::Next,
                        CoalesceObjectBreaks::Yes,
                        IgnoreLineBreaks::No,
                        None,
                    )
                } else {
                    self.clone()
                };
                if !start.at_line_start(reader) {
                    start = start.previous_line_start(reader, None);
                }
                let end = start.next_line_end(reader, include_trailing_line_break, None);
                TextMarkerRange::from_ordered(start, end)
            }
        }
    }

    /// The full word range immediately left/right of this marker. A
    /// marker inside a word gets that word's range.
    pub fn word_range(&self, reader: &TreeReader, range_type: WordRangeType) -> TextMarkerRange {
        if !self.is_valid(reader) {
            return TextMarkerRange::empty();
        }
        if !self.is_in_text_run(reader) {
            return self.to_text_run_marker(reader, None).word_range(reader, range_type);
        }

        match range_type {
            WordRangeType::Right => {
                let end = self.next_word_end(reader);
                // Going nowhere means there is no word to the right;
                // collapse, matching the live-tree behavior.
                if self.has_same_object_and_offset(&end) {
                    return TextMarkerRange::from_ordered(self.clone(), self.clone());
                }
                let start = end.previous_word_start(reader);
                // Don't return a right word separated from the marker by
                // more than a position (e.g. intervening whitespace).
                match start.order(self, reader) {
                    None => TextMarkerRange::empty(),
                    Some(Ordering::Greater) => {
                        TextMarkerRange::from_ordered(self.clone(), self.clone())
                    }
                    Some(_) => TextMarkerRange::from_ordered(start, end),
                }
            }
            WordRangeType::Left => {
                let start = self.previous_word_start(reader);
                if self.has_same_object_and_offset(&start) {
                    return TextMarkerRange::from_ordered(self.clone(), self.clone());
                }
                let end = start.next_word_end(reader);
                match end.order(self, reader) {
                    None => TextMarkerRange::empty(),
                    Some(Ordering::Less) => {
                        TextMarkerRange::from_ordered(self.clone(), self.clone())
                    }
                    Some(_) => TextMarkerRange::from_ordered(start, end),
                }
            }
        }
    }

    /// The range of the sentence containing this marker.
    pub fn sentence_range(
        &self,
        reader: &TreeReader,
        range_type: SentenceRangeType,
    ) -> TextMarkerRange {
        if !self.is_valid(reader) {
            return TextMarkerRange::empty();
        }
        if !self.is_in_text_run(reader) {
            return self
                .to_text_run_marker(reader, None)
                .sentence_range(reader, range_type);
        }

        if range_type != SentenceRangeType::Current {
            return TextMarkerRange::empty();
        }

        let start = self.previous_sentence_start(reader);
        let mut end = start.next_sentence_end(reader);
        let range = TextMarkerRange::from_ordered(start.clone(), end.clone());
        // A sentence of pure whitespace collapses to its start, matching
        // the live tree.
        let text = range.to_string(reader);
        if text.chars().all(|c| c.is_ascii_whitespace()) {
            end = start.clone();
        }
        TextMarkerRange::from_ordered(start, end)
    }

    /// The range of the paragraph containing this marker.
    pub fn paragraph_range(&self, reader: &TreeReader) -> TextMarkerRange {
        if !self.is_valid(reader) {
            return TextMarkerRange::empty();
        }
        if !self.is_in_text_run(reader) {
            return self.to_text_run_marker(reader, None).paragraph_range(reader);
        }

        let start = self.find_paragraph(reader, Direction::Previous, TextUnitBoundary::Start);
        let mut end = self.find_paragraph(reader, Direction::Next, TextUnitBoundary::End);
        let text = TextMarkerRange::from_ordered(start.clone(), end.clone()).to_string(reader);
        if text.chars().all(|c| c.is_ascii_whitespace()) {
            end = start.clone();
        }
        TextMarkerRange::from_ordered(start, end)
    }

    // ---- Line index APIs --------------------------------------------------

    /// The index of this marker's line relative to the nearest editable
    /// ancestor (or the start of the content when there is none). -1 when
    /// the line can't be computed.
    pub fn line_index(&self, reader: &TreeReader) -> i32 {
        if !self.is_valid(reader) {
            return -1;
        }
        if !self.is_in_text_run(reader) {
            return self.to_text_run_marker(reader, None).line_index(reader);
        }

        let node = self.node(reader).expect("validity checked");
        let start_marker = if node.role().is_text_control() {
            TextMarker::from_node(node, 0)
        } else if let Some(editable) = reader.editable_ancestor(node.id()) {
            TextMarker::new(self.tree_id(), Some(editable), 0)
        } else {
            reader.first_marker()
        };
        // Convert early so it happens once rather than in every call that
        // needs a text-run marker below.
        let start_marker = start_marker.to_text_run_marker(reader, None);

        let mut current_line_id = start_marker.line_id(reader);
        let target_line_id = self.line_id(reader);
        if current_line_id == target_line_id {
            return 0;
        }

        let mut current = start_marker;
        if !current.at_line_end(reader) {
            // Start from a line end so each next_line_end() yields a new
            // line; starting mid-line would count the first line twice.
            current = current.next_line_end(reader, IncludeTrailingLineBreak::No, None);
        }

        let mut index = 0;
        while current_line_id.is_some() && current_line_id != target_line_id {
            current = current.next_line_end(reader, IncludeTrailingLineBreak::No, None);
            current_line_id = current.line_id(reader);
            index += 1;
        }
        index
    }

    /// The location and length of the line `line_index` lines after this
    /// marker, as an interval into the flattened text of a text control.
    pub fn character_range_for_line(
        &self,
        reader: &TreeReader,
        mut line_index: usize,
    ) -> CharacterRange {
        let Some(node) = self.node(reader) else {
            return CharacterRange::default();
        };
        if !node.role().is_text_control() {
            return CharacterRange::default();
        }
        debug_assert!(self.offset() == 0, "only offset-0 anchors are supported");

        let stop_at = reader.id_of_next_sibling_or_parent(node.id());
        let text_run_marker = self.to_text_run_marker(reader, stop_at);
        // A text control with no text descendant has no lines.
        if !text_run_marker.is_valid(reader) {
            return CharacterRange::default();
        }

        let mut preceding_length = 0usize;
        // Include trailing hard line breaks in each line, so a line's
        // length accounts for the newline that ends it.
        let mut current_line_range = text_run_marker.line_range(
            reader,
            LineRangeType::Current,
            IncludeTrailingLineBreak::Yes,
        );
        while line_index > 0 && current_line_range.is_valid() {
            preceding_length += current_line_range.to_string(reader).chars().count();
            let line_end = current_line_range
                .end()
                .next_line_end(reader, IncludeTrailingLineBreak::Yes, stop_at);
            let line_start = line_end.previous_line_start(reader, stop_at);
            current_line_range = TextMarkerRange::from_ordered(line_start, line_end);
            line_index -= 1;
        }
        if !current_line_range.is_valid() {
            return CharacterRange::default();
        }
        CharacterRange::new(
            preceding_length,
            current_line_range.to_string(reader).chars().count(),
        )
    }

    /// The marker range of the line `line_index` lines after this marker.
    pub fn marker_range_for_line_index(
        &self,
        reader: &TreeReader,
        mut line_index: usize,
    ) -> TextMarkerRange {
        debug_assert!(self.offset() == 0, "only offset-0 anchors are supported");
        if !self.is_valid(reader) {
            return TextMarkerRange::empty();
        }
        if !self.is_in_text_run(reader) {
            return self
                .to_text_run_marker(reader, None)
                .marker_range_for_line_index(reader, line_index);
        }

        let mut current_line_range =
            self.line_range(reader, LineRangeType::Current, IncludeTrailingLineBreak::No);
        while line_index > 0 && current_line_range.is_valid() {
            let line_end = current_line_range
                .end()
                .next_line_end(reader, IncludeTrailingLineBreak::No, None);
            let line_start = line_end.previous_line_start(reader, None);
            current_line_range = TextMarkerRange::from_ordered(line_start, line_end);
            line_index -= 1;
        }
        current_line_range
    }

    /// The line number of the position `index` characters into this
    /// marker's descendants, or -1 when the index is out of bounds.
    pub fn line_number_for_index(&self, reader: &TreeReader, mut index: usize) -> i32 {
        let Some(node) = self.node(reader) else {
            return -1;
        };
        let stop_at = reader.id_of_next_sibling_or_parent(node.id());

        let mut line_index = 0;
        let mut current = self.clone();
        while index > 0 {
            let old = current.clone();
            current = old.find_marker(
                reader,
                Direction::Next,
                CoalesceObjectBreaks::Yes,
                IgnoreLineBreaks::Yes,
                stop_at,
            );
            if !current.is_valid(reader) {
                break;
            }
            if old.line_id(reader) != current.line_id(reader) {
                line_index += 1;
            }
            index -= 1;
        }
        // Only report a line when the index was a valid offset into the
        // descendants.
        if index == 0 { line_index } else { -1 }
    }

    /// The range from this marker's style run: positions before and after
    /// it sharing the node's text styling.
    pub fn range_with_same_style(&self, reader: &TreeReader) -> TextMarkerRange {
        if !self.is_valid(reader) {
            return TextMarkerRange::empty();
        }
        let style_of = |id: NodeId| {
            let node = reader.object_for_id(id)?;
            Some((
                node.bool_value(NodeProperty::HasBoldFont),
                node.bool_value(NodeProperty::HasItalicFont),
            ))
        };
        let origin_style = style_of(self.node_id().expect("validity checked"));

        let find_edge = |direction: Direction| -> TextMarker {
            let mut current = self.node_id();
            loop {
                let Some(id) = current else { break };
                let next = find_object_with_runs(reader, id, direction, None, &mut |_| {});
                match next {
                    Some(next_id) if style_of(next_id) == origin_style => {
                        current = Some(next_id);
                    }
                    _ => break,
                }
            }
            match current {
                Some(id) => {
                    let length = reader
                        .object_for_id(id)
                        .and_then(|node| node.text_runs())
                        .map(|runs| runs.total_length())
                        .unwrap_or(0);
                    let offset = match direction {
                        Direction::Next => length,
                        Direction::Previous => 0,
                    };
                    TextMarker::new(self.tree_id(), Some(id), offset)
                }
                None => TextMarker::null(),
            }
        };

        TextMarkerRange::from_ordered(
            find_edge(Direction::Previous),
            find_edge(Direction::Next),
        )
    }
}

impl TreeReader {
    /// The id to stop a descendant-bounded walk at: the node's next
    /// sibling, or its parent when it is the last child.
    pub fn id_of_next_sibling_or_parent(&self, id: NodeId) -> Option<NodeId> {
        self.next_sibling(id)
            .or_else(|| self.object_for_id(id).and_then(|node| node.parent_id()))
    }

    /// The range currently selected, normalized against this reader.
    pub fn selected_range_or_empty(&self) -> TextMarkerRange {
        self.selected_marker_range().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::live::{LiveTreeSource, StaticLiveTree};
    use crate::property::{NodeProperty, PropertyValue};
    use crate::text_run::{TextRun, TextRuns};
    use crate::tree::{SnapshotTreeBuilder, TreeRegistry};

    fn node_id(raw: u64) -> NodeId {
        NodeId::from_raw(raw).unwrap()
    }

    fn runs_value(block: u64, parts: &[(&str, u32)]) -> PropertyValue {
        PropertyValue::TextRuns(Arc::new(TextRuns::new(
            NodeId::from_raw(block),
            parts
                .iter()
                .map(|(text, line)| TextRun::new(*text, *line))
                .collect(),
        )))
    }

    fn build_reader(live: &StaticLiveTree) -> TreeReader {
        let registry = TreeRegistry::new();
        let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
        tree.generate_subtree(live, live.root_id().unwrap());
        let mut reader = TreeReader::new(tree);
        reader.apply_pending_changes();
        reader
    }

    fn marker(reader: &TreeReader, node: u64, offset: usize) -> TextMarker {
        TextMarker::new(Some(reader.tree_id()), Some(node_id(node)), offset)
    }

    /// root(1) -> [a(2)="Hello ", b(3)="world" with newline emission].
    fn hello_world_reader(b_emits_newline: bool) -> TreeReader {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2), node_id(3)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.insert_node(node_id(3), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(node_id(2), NodeProperty::TextRuns, runs_value(1, &[("Hello ", 0)]));
        live.set_property(node_id(3), NodeProperty::TextRuns, runs_value(1, &[("world", 0)]));
        if b_emits_newline {
            live.set_property(node_id(3), NodeProperty::EmitsNewline, PropertyValue::Bool(true));
        }
        live.set_root(node_id(1));
        build_reader(&live)
    }

    #[test]
    fn test_constructor_normalizes_order() {
        let reader = hello_world_reader(false);
        let a = marker(&reader, 2, 1);
        let b = marker(&reader, 3, 2);
        let range = TextMarkerRange::new(&reader, b.clone(), a.clone());
        assert_eq!(range.start(), &a);
        assert_eq!(range.end(), &b);
    }

    #[test]
    fn test_null_marker_yields_empty_range() {
        let reader = hello_world_reader(false);
        let range = TextMarkerRange::new(&reader, TextMarker::null(), marker(&reader, 2, 0));
        assert!(!range.is_valid());
    }

    #[test]
    fn test_unordered_pair_yields_empty_range() {
        let reader = hello_world_reader(false);
        let foreign = TextMarker::new(Some(crate::id::TreeId::next()), Some(node_id(2)), 0);
        let range = TextMarkerRange::new(&reader, foreign, marker(&reader, 2, 0));
        assert!(!range.is_valid());
    }

    #[test]
    fn test_single_node_intersection() {
        let reader = hello_world_reader(false);
        let tree_id = Some(reader.tree_id());
        let a = TextMarkerRange::confined(tree_id, Some(node_id(2)), CharacterRange::new(2, 3));
        let b = TextMarkerRange::confined(tree_id, Some(node_id(2)), CharacterRange::new(4, 4));
        let intersection = a.intersection(&b, &reader).expect("overlap");
        assert_eq!(intersection.start().offset(), 4);
        assert_eq!(intersection.end().offset(), 5);
    }

    #[test]
    fn test_disjoint_intersection_is_none() {
        let reader = hello_world_reader(false);
        let tree_id = Some(reader.tree_id());
        let a = TextMarkerRange::confined(tree_id, Some(node_id(2)), CharacterRange::new(0, 2));
        let b = TextMarkerRange::confined(tree_id, Some(node_id(2)), CharacterRange::new(5, 3));
        assert!(a.intersection(&b, &reader).is_none());
    }

    #[test]
    fn test_cross_node_intersection() {
        let reader = hello_world_reader(false);
        // [2@1 .. 3@3] and [3@1 .. 3@5] overlap in [3@1 .. 3@3].
        let a = TextMarkerRange::new(&reader, marker(&reader, 2, 1), marker(&reader, 3, 3));
        let b = TextMarkerRange::new(&reader, marker(&reader, 3, 1), marker(&reader, 3, 5));
        let intersection = a.intersection(&b, &reader).expect("overlap");
        assert_eq!(intersection.start(), &marker(&reader, 3, 1));
        assert_eq!(intersection.end(), &marker(&reader, 3, 3));
    }

    #[test]
    fn test_to_string_single_node() {
        let reader = hello_world_reader(false);
        let range = TextMarkerRange::new(&reader, marker(&reader, 2, 1), marker(&reader, 2, 4));
        assert_eq!(range.to_string(&reader), "ell");
    }

    #[test]
    fn test_to_string_multi_node() {
        let reader = hello_world_reader(false);
        let range = TextMarkerRange::new(&reader, marker(&reader, 2, 0), marker(&reader, 3, 5));
        assert_eq!(range.to_string(&reader), "Hello world");
    }

    #[test]
    fn test_to_string_with_newline_emission() {
        let reader = hello_world_reader(true);
        let range = TextMarkerRange::new(&reader, marker(&reader, 2, 0), marker(&reader, 3, 5));
        assert_eq!(range.to_string(&reader), "Hello \nworld");
    }

    #[test]
    fn test_to_string_does_not_double_newline() {
        // a ends in a newline already; b's newline emission must not
        // duplicate it.
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2), node_id(3)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.insert_node(node_id(3), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(node_id(2), NodeProperty::TextRuns, runs_value(1, &[("Hello \n", 0)]));
        live.set_property(node_id(3), NodeProperty::TextRuns, runs_value(1, &[("world", 1)]));
        live.set_property(node_id(3), NodeProperty::EmitsNewline, PropertyValue::Bool(true));
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let range = TextMarkerRange::new(&reader, marker(&reader, 2, 0), marker(&reader, 3, 5));
        assert_eq!(range.to_string(&reader), "Hello \nworld");
    }

    #[test]
    fn test_collapsed_range() {
        let reader = hello_world_reader(false);
        let m = marker(&reader, 2, 3);
        let range = TextMarkerRange::new(&reader, m.clone(), m.clone());
        assert!(range.is_valid());
        assert!(range.is_collapsed());
        assert_eq!(range.to_string(&reader), "");
    }

    #[test]
    fn test_is_confined() {
        let reader = hello_world_reader(false);
        let confined =
            TextMarkerRange::new(&reader, marker(&reader, 2, 0), marker(&reader, 2, 3));
        assert!(confined.is_confined());
        assert!(confined.is_confined_to(Some(node_id(2))));

        let spanning =
            TextMarkerRange::new(&reader, marker(&reader, 2, 0), marker(&reader, 3, 1));
        assert!(!spanning.is_confined());
    }

    #[test]
    fn test_character_range() {
        let reader = hello_world_reader(false);
        let range = TextMarkerRange::new(&reader, marker(&reader, 2, 2), marker(&reader, 3, 1));
        let character_range = range.character_range(&reader).unwrap();
        assert_eq!(character_range.location, 2);
        assert_eq!(character_range.length, 5);
    }

    #[test]
    fn test_word_range_right() {
        let reader = hello_world_reader(false);
        // Marker inside "world".
        let m = marker(&reader, 3, 2);
        let range = m.word_range(&reader, WordRangeType::Right);
        assert_eq!(range.to_string(&reader), "world");
    }

    #[test]
    fn test_line_range_current() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(2),
            NodeProperty::TextRuns,
            runs_value(1, &[("one ", 0), ("two", 1)]),
        );
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let m = marker(&reader, 2, 5);
        let range = m.line_range(&reader, LineRangeType::Current, IncludeTrailingLineBreak::No);
        assert_eq!(range.to_string(&reader), "two");
    }

    #[test]
    fn test_sentence_range_current() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(2),
            NodeProperty::TextRuns,
            runs_value(1, &[("One two. Three four.", 0)]),
        );
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let m = marker(&reader, 2, 12);
        let range = m.sentence_range(&reader, SentenceRangeType::Current);
        assert_eq!(range.to_string(&reader), "Three four.");
    }

    #[test]
    fn test_paragraph_range() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(2),
            NodeProperty::TextRuns,
            runs_value(1, &[("first\n", 0), ("second", 1)]),
        );
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let m = marker(&reader, 2, 8);
        let range = m.paragraph_range(&reader);
        assert_eq!(range.to_string(&reader), "second");
    }

    #[test]
    fn test_round_trip_string_length() {
        let reader = hello_world_reader(false);
        // Container-anchored markers: offsets 2..9 into the flattened
        // content "Hello world".
        let range = TextMarkerRange::new(&reader, marker(&reader, 1, 2), marker(&reader, 1, 9));
        let text = range.to_string(&reader);
        assert_eq!(text, "llo wor");

        // Re-derive a range from the string's boundary offsets; the
        // character count must survive the round trip.
        let rederived = TextMarkerRange::new(
            &reader,
            marker(&reader, 1, 2),
            marker(&reader, 1, 2 + text.chars().count()),
        );
        assert_eq!(
            rederived.to_string(&reader).chars().count(),
            text.chars().count()
        );
    }

    #[test]
    fn test_viewport_relative_frame_single_node() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(2),
            NodeProperty::TextRuns,
            PropertyValue::TextRuns(Arc::new(TextRuns::new(
                NodeId::from_raw(1),
                vec![TextRun::with_metrics("abcd", 0, 10.0, vec![5.0; 4])],
            ))),
        );
        live.set_property(
            node_id(2),
            NodeProperty::RelativeFrame,
            PropertyValue::Rect(Rect::new(100.0, 50.0, 20.0, 10.0)),
        );
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let range = TextMarkerRange::new(&reader, marker(&reader, 2, 1), marker(&reader, 2, 3));
        let frame = range.viewport_relative_frame(&reader);
        // Sub-range rect anchored at the node's cached frame.
        assert_eq!(frame, Rect::new(105.0, 50.0, 10.0, 10.0));

        // The whole node's text projects to the cached frame itself.
        let whole = TextMarkerRange::new(&reader, marker(&reader, 2, 0), marker(&reader, 2, 4));
        assert_eq!(
            whole.viewport_relative_frame(&reader),
            Rect::new(100.0, 50.0, 20.0, 10.0)
        );
    }

    #[test]
    fn test_list_marker_text_prepended() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::ListItem, Some(node_id(1)), vec![node_id(3), node_id(4)]);
        live.insert_node(node_id(3), Role::ListMarker, Some(node_id(2)), vec![]);
        live.insert_node(node_id(4), Role::StaticText, Some(node_id(2)), vec![]);
        live.set_property(
            node_id(3),
            NodeProperty::ListMarkerText,
            PropertyValue::String("1. ".into()),
        );
        live.set_property(
            node_id(3),
            NodeProperty::ListMarkerLineId,
            PropertyValue::LineId(crate::text_run::LineId {
                block: NodeId::from_raw(1),
                index: 0,
            }),
        );
        live.set_property(node_id(4), NodeProperty::TextRuns, runs_value(1, &[("item", 0)]));
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let range = TextMarkerRange::new(&reader, marker(&reader, 4, 0), marker(&reader, 4, 4));
        assert_eq!(range.to_string(&reader), "1. item");
    }

    #[test]
    fn test_line_index() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(2),
            NodeProperty::TextRuns,
            runs_value(1, &[("aa ", 0), ("bb ", 1), ("cc", 2)]),
        );
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        assert_eq!(marker(&reader, 2, 1).line_index(&reader), 0);
        assert_eq!(marker(&reader, 2, 4).line_index(&reader), 1);
        assert_eq!(marker(&reader, 2, 7).line_index(&reader), 2);
    }
}
