//! Text position markers.
//!
//! A [`TextMarker`] is a (tree id, node id, offset, affinity) tuple
//! identifying a point in rendered text. Marker identity is not unique:
//! several markers can denote the same visual position (e.g. the end of
//! one node and the start of the next).
//!
//! Every operation here is a pure function over a [`TreeReader`]'s node
//! map. A marker whose node cannot be resolved in the given reader is
//! treated as the canonical null marker: derived operations return
//! null/empty rather than failing.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::id::{NodeId, TreeId};
use crate::node::NodeSnapshot;
use crate::role::Role;
use crate::text_run::{Affinity, LineId, TextRuns, next_grapheme_offset, prev_grapheme_offset};
use crate::tree::TreeReader;

/// Walk direction for marker navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Whether to treat a zero-length gap between two adjacent nodes as a
/// single navigable position rather than two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceObjectBreaks {
    No,
    Yes,
}

/// Whether to skip hard line-break nodes outside editable content while
/// navigating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreLineBreaks {
    No,
    Yes,
}

/// Diagnostic provenance of a marker. Not part of marker equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum MarkerOrigin {
    #[default]
    Unknown,
    PreviousLineStart,
    NextLineEnd,
    NextWordStart,
    NextWordEnd,
    PreviousWordStart,
    PreviousWordEnd,
    PreviousSentenceStart,
    NextSentenceEnd,
    PreviousParagraphStart,
    NextParagraphEnd,
    Position,
}

impl MarkerOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkerOrigin::Unknown => "Unknown",
            MarkerOrigin::PreviousLineStart => "PreviousLineStart",
            MarkerOrigin::NextLineEnd => "NextLineEnd",
            MarkerOrigin::NextWordStart => "NextWordStart",
            MarkerOrigin::NextWordEnd => "NextWordEnd",
            MarkerOrigin::PreviousWordStart => "PreviousWordStart",
            MarkerOrigin::PreviousWordEnd => "PreviousWordEnd",
            MarkerOrigin::PreviousSentenceStart => "PreviousSentenceStart",
            MarkerOrigin::NextSentenceEnd => "NextSentenceEnd",
            MarkerOrigin::PreviousParagraphStart => "PreviousParagraphStart",
            MarkerOrigin::NextParagraphEnd => "NextParagraphEnd",
            MarkerOrigin::Position => "Position",
        }
    }
}

/// A point in rendered text.
#[derive(Debug, Clone, Default)]
pub struct TextMarker {
    tree_id: Option<TreeId>,
    node_id: Option<NodeId>,
    offset: usize,
    affinity: Affinity,
    origin: MarkerOrigin,
}

// Origin is diagnostic provenance and deliberately excluded from
// equality.
impl PartialEq for TextMarker {
    fn eq(&self, other: &Self) -> bool {
        self.tree_id == other.tree_id
            && self.node_id == other.node_id
            && self.offset == other.offset
            && self.affinity == other.affinity
    }
}

impl Eq for TextMarker {}

impl TextMarker {
    /// The canonical null marker.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn new(tree_id: Option<TreeId>, node_id: Option<NodeId>, offset: usize) -> Self {
        Self {
            tree_id,
            node_id,
            offset,
            affinity: Affinity::Downstream,
            origin: MarkerOrigin::Unknown,
        }
    }

    pub fn with_origin(mut self, origin: MarkerOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// A marker at `offset` within the given node.
    pub fn from_node(node: &NodeSnapshot, offset: usize) -> Self {
        Self::new(Some(node.tree_id()), Some(node.id()), offset)
    }

    #[inline]
    pub fn tree_id(&self) -> Option<TreeId> {
        self.tree_id
    }

    #[inline]
    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub fn set_affinity(&mut self, affinity: Affinity) {
        self.affinity = affinity;
    }

    #[inline]
    pub fn is_downstream(&self) -> bool {
        self.affinity == Affinity::Downstream
    }

    #[inline]
    pub fn origin(&self) -> MarkerOrigin {
        self.origin
    }

    /// True when the marker carries no ids at all.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.tree_id.is_none() || self.node_id.is_none()
    }

    /// Resolve the marker's node in the reader's map. `None` for null
    /// markers, cross-tree markers, and ids not (or no longer) resolved.
    pub fn node<'r>(&self, reader: &'r TreeReader) -> Option<&'r NodeSnapshot> {
        if self.tree_id != Some(reader.tree_id()) {
            return None;
        }
        reader.object_for_id(self.node_id?)
    }

    /// Whether the marker resolves to a node in this reader.
    pub fn is_valid(&self, reader: &TreeReader) -> bool {
        self.node(reader).is_some()
    }

    /// The marker's node's cached text runs.
    pub fn runs(&self, reader: &TreeReader) -> Option<Arc<TextRuns>> {
        self.node(reader)?.text_runs()
    }

    /// True when the marker points to an object with non-empty text runs.
    pub fn is_in_text_run(&self, reader: &TreeReader) -> bool {
        self.runs(reader).is_some_and(|runs| !runs.is_empty())
    }

    /// Equality ignoring affinity and origin.
    pub fn has_same_object_and_offset(&self, other: &TextMarker) -> bool {
        self.tree_id == other.tree_id
            && self.node_id == other.node_id
            && self.offset == other.offset
    }

    /// Human-readable description, for diagnostics.
    pub fn describe(&self) -> String {
        if self.is_null() {
            return "null marker".to_string();
        }
        format!(
            "marker node={:?} offset={} affinity={:?} origin={}",
            self.node_id,
            self.offset,
            self.affinity,
            self.origin.as_str()
        )
    }

    // ---- Ordering ---------------------------------------------------------

    /// Compare two markers in the tree order the reader holds.
    ///
    /// Markers in the same node compare by offset. Markers in different
    /// nodes compare by pre-order traversal, with a fast path for the
    /// canonical start-of-content marker. `None` when either marker does
    /// not resolve in this reader (including cross-tree pairs).
    pub fn order(&self, other: &TextMarker, reader: &TreeReader) -> Option<Ordering> {
        let node = self.node(reader)?;
        let other_node = other.node(reader)?;

        if self.node_id == other.node_id {
            return Some(self.offset.cmp(&other.offset));
        }

        // The content-area start is the first possible marker; no
        // traversal needed to order against it.
        if self.offset == 0 && node.role() == Role::ContentArea {
            return Some(Ordering::Less);
        }
        if other.offset == 0 && other_node.role() == Role::ContentArea {
            return Some(Ordering::Greater);
        }

        let a = node.id();
        let b = other_node.id();
        let mut current = reader.next_in_pre_order(a);
        while let Some(id) = current {
            if id == b {
                return Some(Ordering::Less);
            }
            current = reader.next_in_pre_order(id);
        }
        let mut current = reader.next_in_pre_order(b);
        while let Some(id) = current {
            if id == a {
                return Some(Ordering::Greater);
            }
            current = reader.next_in_pre_order(id);
        }
        None
    }

    // ---- Normalization ----------------------------------------------------

    /// Normalize to a marker whose node carries text runs.
    ///
    /// When this marker's node has no runs, its offset is interpreted as
    /// an offset into the flattened text of the run-carrying nodes that
    /// follow it in pre-order, and the marker is rebased onto the node the
    /// offset lands in. Null when no such node exists.
    ///
    /// The offset is clamped into bounds first: clients can legitimately
    /// hold markers whose text has since changed (e.g. during rapid
    /// deletions), and those must degrade gracefully rather than walk off
    /// the end of the runs.
    pub fn to_text_run_marker(&self, reader: &TreeReader, stop_at: Option<NodeId>) -> TextMarker {
        let Some(node) = self.node(reader) else {
            return TextMarker::null();
        };
        let runs = node.text_runs();
        if let Some(runs) = &runs
            && !runs.is_empty()
        {
            let mut marker = self.clone();
            marker.offset = marker.offset.min(runs.total_length());
            return marker;
        }

        // Find the node our offset points into. A marker on a container
        // at offset 6 whose descendants carry "Foo" then "Line1\nLine2"
        // normalizes to the second descendant at offset 3.
        let mut preceding = 0usize;
        let mut current = if runs.is_some() {
            Some(node.id())
        } else {
            find_object_with_runs(reader, node.id(), Direction::Next, stop_at, &mut |_| {})
        };
        while let Some(id) = current {
            let Some(total) = reader
                .object_for_id(id)
                .and_then(|n| n.text_runs())
                .map(|runs| runs.total_length())
            else {
                break;
            };
            if preceding + total >= self.offset {
                break;
            }
            preceding += total;
            current = find_object_with_runs(reader, id, Direction::Next, stop_at, &mut |_| {});
        }

        let Some(id) = current else {
            return TextMarker::null();
        };
        debug_assert!(self.offset >= preceding);
        if self.offset < preceding {
            return self.clone();
        }
        TextMarker::new(self.tree_id, Some(id), self.offset - preceding)
    }

    // ---- Single-step navigation -------------------------------------------

    /// Find the adjacent marker in the given direction.
    ///
    /// Within a node's cached text this advances or retreats one grapheme
    /// cluster (one position on the ASCII-only fast path). At a node's
    /// text boundary it lands on the next or previous run-carrying node's
    /// first or last position. `coalesce` controls whether the zero-length
    /// gap at an object boundary is skipped as a single visual position;
    /// `ignore_line_breaks` skips hard line-break nodes outside editable
    /// content; `stop_at` bounds the traversal and yields a null marker
    /// when reached.
    pub fn find_marker(
        &self,
        reader: &TreeReader,
        direction: Direction,
        coalesce: CoalesceObjectBreaks,
        ignore_line_breaks: IgnoreLineBreaks,
        stop_at: Option<NodeId>,
    ) -> TextMarker {
        let Some(node) = self.node(reader) else {
            return TextMarker::null();
        };
        let Some(runs) = node.text_runs().filter(|runs| !runs.is_empty()) else {
            let normalized = self.to_text_run_marker(reader, stop_at);
            if normalized.is_null() || normalized.node_id == self.node_id {
                return TextMarker::null();
            }
            return normalized.find_marker(reader, direction, coalesce, ignore_line_breaks, stop_at);
        };

        // Hard line breaks outside editable content are invisible to most
        // navigation.
        let should_skip_break = ignore_line_breaks == IgnoreLineBreaks::Yes
            && node.role().is_line_break()
            && reader.editable_ancestor(node.id()).is_none();

        let within_bounds = match direction {
            Direction::Next => self.offset < runs.total_length(),
            Direction::Previous => self.offset > 0,
        };
        if !should_skip_break && within_bounds {
            if runs.contains_only_ascii() {
                // ASCII never has multi-character grapheme clusters, so
                // moving by one offset is always cluster-correct.
                let offset = match direction {
                    Direction::Next => self.offset + 1,
                    Direction::Previous => self.offset - 1,
                };
                return TextMarker::new(self.tree_id, self.node_id, offset);
            }
            let text = runs.text();
            let offset = match direction {
                Direction::Next => {
                    next_grapheme_offset(&text, self.offset).unwrap_or(self.offset + 1)
                }
                Direction::Previous => {
                    prev_grapheme_offset(&text, self.offset).unwrap_or(self.offset - 1)
                }
            };
            return TextMarker::new(self.tree_id, self.node_id, offset);
        }

        // The offset points at the boundary of this node's runs; cross to
        // the adjacent run-carrying node.
        let Some(next_id) =
            find_object_with_runs(reader, node.id(), direction, stop_at, &mut |_| {})
        else {
            return TextMarker::null();
        };
        let Some(next_runs) = reader.object_for_id(next_id).and_then(|n| n.text_runs()) else {
            return TextMarker::null();
        };
        let adjacent_run_length = match direction {
            Direction::Next => next_runs.run_length(0),
            Direction::Previous => next_runs.last_run_length(),
        };
        debug_assert!(adjacent_run_length > 0, "adjacent text node with empty run");
        if adjacent_run_length == 0 {
            return TextMarker::null();
        }

        // Landing one position in, rather than at the exact boundary,
        // skips the zero-length gap between the two objects.
        let starting_offset =
            if coalesce == CoalesceObjectBreaks::Yes || should_skip_break { 1 } else { 0 };
        match direction {
            Direction::Next => TextMarker::new(self.tree_id, Some(next_id), starting_offset),
            Direction::Previous => TextMarker::new(
                self.tree_id,
                Some(next_id),
                next_runs.total_length().saturating_sub(starting_offset),
            ),
        }
    }

    /// The marker `offset` positions forward of this one, moving one
    /// position at a time without coalescing.
    pub fn next_marker_from_offset(
        &self,
        reader: &TreeReader,
        mut offset: usize,
        stop_at: Option<NodeId>,
    ) -> TextMarker {
        if !self.is_valid(reader) {
            return TextMarker::null();
        }
        if !self.is_in_text_run(reader) {
            return self
                .to_text_run_marker(reader, stop_at)
                .next_marker_from_offset(reader, offset, stop_at);
        }

        let mut marker = self.clone();
        while offset > 0 {
            let next = marker.find_marker(
                reader,
                Direction::Next,
                CoalesceObjectBreaks::No,
                IgnoreLineBreaks::No,
                stop_at,
            );
            if next.is_null() {
                break;
            }
            marker = next;
            offset -= 1;
        }
        marker
    }

    /// Navigate to the last marker before `stop_at`, or the last marker
    /// in the tree when `stop_at` is `None`. Assumes this marker precedes
    /// `stop_at` in tree order.
    pub fn find_last_before(&self, reader: &TreeReader, stop_at: Option<NodeId>) -> TextMarker {
        if !self.is_valid(reader) {
            return TextMarker::null();
        }
        if !self.is_in_text_run(reader) {
            let normalized = self.to_text_run_marker(reader, None);
            // A marker pointing at an empty container at the end of the
            // content can't be normalized; it already is the last marker.
            if !normalized.is_valid(reader) {
                return self.clone();
            }
            return normalized.find_last_before(reader, stop_at);
        }

        let mut marker = TextMarker::null();
        let mut next = self.clone();
        while next.is_valid(reader) && (stop_at.is_none() || stop_at != next.node_id) {
            marker = next.clone();
            next = marker.find_marker(
                reader,
                Direction::Next,
                CoalesceObjectBreaks::No,
                IgnoreLineBreaks::No,
                stop_at,
            );
        }
        marker
    }

    /// The last marker in the tree reachable from this one.
    pub fn find_last(&self, reader: &TreeReader) -> TextMarker {
        self.find_last_before(reader, None)
    }

    /// True when two markers on different nodes denote the same visual
    /// position (i.e. sit on the two sides of a zero-length object
    /// boundary).
    pub fn equivalent_text_position(&self, reader: &TreeReader, other: &TextMarker) -> bool {
        if self.node_id == other.node_id {
            return false;
        }
        let next = self.find_marker(
            reader,
            Direction::Next,
            CoalesceObjectBreaks::No,
            IgnoreLineBreaks::Yes,
            None,
        );
        if next == *other {
            return true;
        }
        let previous = self.find_marker(
            reader,
            Direction::Previous,
            CoalesceObjectBreaks::No,
            IgnoreLineBreaks::Yes,
            None,
        );
        previous == *other
    }

    /// The character offset of this marker as if the whole tree were
    /// flattened into one string.
    ///
    /// Walks from the tree's first marker one visual position at a time,
    /// counting increments and inserting a synthetic newline increment
    /// when crossing into a node whose layout emits a line break. Also
    /// double-checks reachability: failing to reach this marker from the
    /// root is a caller bug caught by a debug assertion.
    pub fn offset_from_root(&self, reader: &TreeReader) -> usize {
        if !self.is_valid(reader) {
            return 0;
        }
        let Some(root) = reader.root_id() else {
            return 0;
        };

        let mut offset = 0usize;
        let mut needs_newline_offset = false;
        let mut current = TextMarker::new(self.tree_id, Some(root), 0);

        while current.is_valid(reader) && !self.has_same_object_and_offset(&current) {
            if needs_newline_offset {
                // Only represent a newline once actual text has been
                // counted.
                if offset > 0 {
                    offset += 1;
                }
                needs_newline_offset = false;
            }

            let previous = current.clone();
            let node = current.node(reader).expect("validity checked above");
            let runs = node.text_runs();
            if let Some(runs) = runs.filter(|runs| current.offset < runs.total_length()) {
                // Explore every position while searching, so no
                // coalescing and no line-break skipping here.
                current = previous.find_marker(
                    reader,
                    Direction::Next,
                    CoalesceObjectBreaks::No,
                    IgnoreLineBreaks::No,
                    None,
                );
                if !previous.equivalent_text_position(reader, &current) {
                    offset += 1;
                }
            } else {
                if node.emits_newline() {
                    // The next text we come across is on a new line, so
                    // the previous and current markers won't share a
                    // visual position.
                    needs_newline_offset = true;
                }
                current = match reader.next_in_pre_order(node.id()) {
                    Some(next) => {
                        // Crossing into a line-break-emitting node also
                        // starts a new line.
                        if reader.object_for_id(next).is_some_and(|n| n.emits_newline()) {
                            needs_newline_offset = true;
                        }
                        TextMarker::new(self.tree_id, Some(next), 0)
                    }
                    None => TextMarker::null(),
                };
            }
        }
        if needs_newline_offset && offset > 0 {
            offset += 1;
        }

        debug_assert!(
            self.has_same_object_and_offset(&current),
            "marker unreachable from root: {}",
            self.describe()
        );
        offset
    }

    // ---- Line identity ----------------------------------------------------

    /// The id of the rendered line this marker's offset points into.
    pub fn line_id(&self, reader: &TreeReader) -> Option<LineId> {
        if !self.is_valid(reader) {
            return None;
        }
        if !self.is_in_text_run(reader) {
            return self.to_text_run_marker(reader, None).line_id(reader);
        }
        let runs = self.runs(reader)?;
        let run_index = runs.index_for_offset(self.offset, self.affinity)?;
        runs.line_id(run_index)
    }

    /// Whether this marker sits at the start (`Previous`) or end (`Next`)
    /// of its rendered line.
    pub fn at_line_boundary(&self, reader: &TreeReader, direction: Direction) -> bool {
        if !self.is_valid(reader) {
            return false;
        }
        if !self.is_in_text_run(reader) {
            return self
                .to_text_run_marker(reader, None)
                .at_line_boundary(reader, direction);
        }
        let runs = self.runs(reader).expect("checked by is_in_text_run");
        let Some(run_index) = runs.index_for_offset(self.offset, self.affinity) else {
            debug_assert!(false, "marker offset out of run bounds: {}", self.describe());
            return false;
        };
        self.at_line_boundary_with(reader, direction, &runs, run_index)
    }

    pub(crate) fn at_line_boundary_with(
        &self,
        reader: &TreeReader,
        direction: Direction,
        runs: &TextRuns,
        run_index: usize,
    ) -> bool {
        let node_id = self.node_id.expect("caller resolved the marker");
        let mut next_object =
            find_object_with_runs(reader, node_id, direction, None, &mut |_| {});
        // A line-break node often reports the same line as the preceding
        // static text even though it is a newline; look one object
        // further.
        if let Some(id) = next_object
            && reader.object_for_id(id).is_some_and(|n| n.role().is_line_break())
        {
            next_object = find_object_with_runs(reader, id, direction, None, &mut |_| {});
        }

        let mut next_runs =
            next_object.and_then(|id| reader.object_for_id(id)?.text_runs());
        // If more runs in the same containing block continue our line, we
        // are not at a boundary. The search stops when the containing
        // block changes.
        while let Some(current_next_runs) = next_runs {
            if current_next_runs.containing_block != runs.containing_block {
                break;
            }
            let adjacent_index = match direction {
                Direction::Next => 0,
                Direction::Previous => current_next_runs.last_run_index(),
            };
            if runs.line_id(run_index) == current_next_runs.line_id(adjacent_index) {
                return false;
            }
            next_object = match next_object {
                Some(id) => find_object_with_runs(reader, id, direction, None, &mut |_| {}),
                None => None,
            };
            next_runs = next_object.and_then(|id| reader.object_for_id(id)?.text_runs());
        }

        // The line ends within this object's runs; check the marker's
        // position within its own line.
        let sum_to_run_index = if run_index > 0 {
            runs.run_length_sum_to(run_index - 1)
        } else {
            0
        };
        debug_assert!(self.offset >= sum_to_run_index);
        if self.offset < sum_to_run_index {
            return false;
        }
        let offset_in_line = self.offset - sum_to_run_index;
        match direction {
            Direction::Previous => offset_in_line == 0,
            Direction::Next => runs.run_length(run_index) == offset_in_line,
        }
    }

    pub fn at_line_start(&self, reader: &TreeReader) -> bool {
        self.at_line_boundary(reader, Direction::Previous)
    }

    pub fn at_line_end(&self, reader: &TreeReader) -> bool {
        self.at_line_boundary(reader, Direction::Next)
    }
}

impl TreeReader {
    /// The first marker of this tree: the root at offset 0.
    pub fn first_marker(&self) -> TextMarker {
        match self.root_id() {
            Some(root) => TextMarker::new(Some(self.tree_id()), Some(root), 0),
            None => TextMarker::null(),
        }
    }

    /// The last marker of this tree.
    pub fn last_marker(&self) -> TextMarker {
        self.first_marker().find_last(self)
    }
}

/// Find the next or previous node carrying non-empty text runs, in
/// pre-order, optionally stopping (and returning `None`) at `stop_at`.
///
/// `exit_object` runs each time a node is exited by the traversal: its
/// children (if any) have been processed and the walk is moving beyond
/// it. Range stringification uses this to emit the newline a block
/// contributes when left.
pub(crate) fn find_object_with_runs(
    reader: &TreeReader,
    start: NodeId,
    direction: Direction,
    stop_at: Option<NodeId>,
    exit_object: &mut dyn FnMut(&NodeSnapshot),
) -> Option<NodeId> {
    match direction {
        Direction::Next => {
            let mut current = next_in_pre_order_with_exit(reader, start, stop_at, exit_object)?;
            loop {
                if stop_at == Some(current) {
                    return None;
                }
                let node = reader.object_for_id(current)?;
                if node.has_text_runs() {
                    return Some(current);
                }
                exit_object(node);
                current = next_in_pre_order_with_exit(reader, current, stop_at, exit_object)?;
            }
        }
        Direction::Previous => {
            let mut current = previous_in_pre_order(reader, start)?;
            loop {
                if stop_at == Some(current) {
                    return None;
                }
                let node = reader.object_for_id(current)?;
                if node.has_text_runs() {
                    return Some(current);
                }
                exit_object(node);
                current = previous_in_pre_order(reader, current)?;
            }
        }
    }
}

/// Pre-order successor, invoking `exit_object` for every ancestor the
/// walk climbs out of.
fn next_in_pre_order_with_exit(
    reader: &TreeReader,
    from: NodeId,
    stop_at: Option<NodeId>,
    exit_object: &mut dyn FnMut(&NodeSnapshot),
) -> Option<NodeId> {
    if let Some(child) = reader.first_resolved_child(from) {
        return Some(child);
    }
    let mut current = from;
    loop {
        if let Some(sibling) = reader.next_sibling(current) {
            return Some(sibling);
        }
        if stop_at == Some(current) {
            return None;
        }
        let parent = reader.object_for_id(current)?.parent_id()?;
        if stop_at == Some(parent) {
            return None;
        }
        exit_object(reader.object_for_id(parent)?);
        current = parent;
    }
}

fn previous_in_pre_order(reader: &TreeReader, from: NodeId) -> Option<NodeId> {
    reader.previous_in_pre_order(from)
}
