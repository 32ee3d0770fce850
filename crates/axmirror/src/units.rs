//! Text-unit boundary finders: line, word, sentence, paragraph.
//!
//! Lines come from the precomputed per-run line ids. Words and sentences
//! come from locale-aware segmentation applied to a locally flattened
//! string window that grows node-by-node until a boundary resolves,
//! because segmentation needs surrounding context a single node's text
//! may not contain. Paragraphs have no dedicated break algorithm at all:
//! the boundary is a heuristic over rendered newlines, containing-block
//! changes, and editability changes, preserved quirks and all because
//! downstream behavior depends on them.

use icu::segmenter::options::{SentenceBreakInvariantOptions, WordBreakInvariantOptions};
use icu::segmenter::{SentenceSegmenter, WordSegmenter};

use crate::marker::{
    CoalesceObjectBreaks, Direction, IgnoreLineBreaks, MarkerOrigin, TextMarker,
    find_object_with_runs,
};
use crate::id::NodeId;
use crate::text_run::Affinity;
use crate::tree::TreeReader;

/// Which edge of a text unit to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextUnitBoundary {
    Start,
    End,
}

/// Whether a line-end search may continue through a trailing hard line
/// break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeTrailingLineBreak {
    No,
    Yes,
}

// ---- Locale-aware segmentation over char offsets --------------------------

fn char_for_byte(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count()
}

/// Word boundaries of `text` as (char offset, segment-before-is-word-like)
/// pairs, excluding the leading 0 boundary.
fn word_boundaries(text: &str) -> Vec<(usize, bool)> {
    let segmenter = WordSegmenter::new_dictionary(WordBreakInvariantOptions::default());
    let mut iterator = segmenter.segment_str(text);
    let mut boundaries = Vec::new();
    while let Some(byte) = iterator.next() {
        if byte == 0 {
            continue;
        }
        boundaries.push((char_for_byte(text, byte), iterator.is_word_like()));
    }
    boundaries
}

/// The start of the word-like segment closest before `offset`, `None`
/// when no word precedes it.
pub(crate) fn previous_word_start(text: &str, offset: usize) -> Option<usize> {
    let boundaries = word_boundaries(text);
    let mut previous_boundary = 0usize;
    let mut result = None;
    for (boundary, word_like) in boundaries {
        if word_like && previous_boundary < offset {
            result = Some(previous_boundary);
        }
        previous_boundary = boundary;
    }
    result
}

/// The end of the word-like segment closest before `offset` (exclusive of
/// a word ending exactly at `offset`).
pub(crate) fn previous_word_end(text: &str, offset: usize) -> Option<usize> {
    word_boundaries(text)
        .into_iter()
        .filter(|(boundary, word_like)| *word_like && *boundary < offset)
        .map(|(boundary, _)| boundary)
        .next_back()
}

/// The next segmentation boundary strictly after `offset`, regardless of
/// what kind of segment it ends. Callers deal with whitespace segments
/// themselves, matching the break-iterator contract.
pub(crate) fn next_word_end(text: &str, offset: usize) -> Option<usize> {
    word_boundaries(text)
        .into_iter()
        .map(|(boundary, _)| boundary)
        .find(|boundary| *boundary > offset)
}

/// The start of the first word-like segment strictly after `offset`.
pub(crate) fn next_word_start(text: &str, offset: usize) -> Option<usize> {
    let mut previous_boundary = 0usize;
    for (boundary, word_like) in word_boundaries(text) {
        if word_like && previous_boundary > offset {
            return Some(previous_boundary);
        }
        previous_boundary = boundary;
    }
    None
}

fn sentence_boundaries(text: &str) -> Vec<usize> {
    let segmenter = SentenceSegmenter::new(SentenceBreakInvariantOptions::default());
    segmenter
        .segment_str(text)
        .map(|byte| char_for_byte(text, byte))
        .collect()
}

/// The sentence boundary closest before `offset`.
pub(crate) fn previous_sentence_start(text: &str, offset: usize) -> Option<usize> {
    sentence_boundaries(text)
        .into_iter()
        .filter(|boundary| *boundary < offset)
        .next_back()
}

/// The sentence boundary closest after `offset`, with trailing-newline
/// adjustment: a sentence's end excludes a newline that follows it, but a
/// range that is only newlines runs through them to the next boundary.
pub(crate) fn next_sentence_end(text: &str, offset: usize) -> Option<usize> {
    let boundaries = sentence_boundaries(text);
    let mut end = boundaries.into_iter().find(|boundary| *boundary > offset)?;

    let chars: Vec<char> = text.chars().collect();
    let span_is_whitespace = chars[offset.min(chars.len())..end.min(chars.len())]
        .iter()
        .all(|c| c.is_ascii_whitespace());
    if !span_is_whitespace {
        while end > 0 && chars.get(end - 1) == Some(&'\n') {
            end -= 1;
        }
    } else {
        while end + 1 < chars.len() && chars.get(end) == Some(&'\n') {
            end += 1;
        }
    }
    Some(end)
}

// ---- Unit-boundary finders on TextMarker ----------------------------------

impl TextMarker {
    /// Find a line boundary in the given direction.
    ///
    /// Lines are identified by the per-run line ids: the search walks runs
    /// (and run-carrying nodes) until the line id changes, keeping the
    /// last position seen on the starting line.
    pub fn find_line(
        &self,
        reader: &TreeReader,
        direction: Direction,
        boundary: TextUnitBoundary,
        include_trailing_line_break: IncludeTrailingLineBreak,
        stop_at: Option<NodeId>,
    ) -> TextMarker {
        if !self.is_valid(reader) {
            return TextMarker::null();
        }
        if !self.is_in_text_run(reader) {
            return self.to_text_run_marker(reader, stop_at).find_line(
                reader,
                direction,
                boundary,
                include_trailing_line_break,
                stop_at,
            );
        }

        let mut current_runs = self.runs(reader).expect("is_in_text_run checked");
        let Some(start_run_index) = current_runs.index_for_offset(self.offset(), self.affinity())
        else {
            debug_assert!(false, "marker offset out of run bounds: {}", self.describe());
            return TextMarker::null();
        };
        let mut current_id = self.node_id().expect("validity checked");
        let origin = if boundary == TextUnitBoundary::Start && direction == Direction::Previous {
            MarkerOrigin::PreviousLineStart
        } else {
            MarkerOrigin::NextLineEnd
        };

        // Already at the requested boundary: the caller wants the boundary
        // of the adjacent line instead, so step off this one first.
        if self.at_line_boundary_with(reader, direction, &current_runs, start_run_index) {
            let adjacent = self.find_marker(
                reader,
                direction,
                CoalesceObjectBreaks::No,
                IgnoreLineBreaks::Yes,
                stop_at,
            );
            let finding_next_line_end =
                direction == Direction::Next && boundary == TextUnitBoundary::End;
            let find_on_next_line = finding_next_line_end
                || (direction == Direction::Previous && boundary == TextUnitBoundary::Start);

            if finding_next_line_end && adjacent.node_id() == self.node_id() {
                // Stepping forward from an upstream line-end lands
                // downstream past the next line's single position,
                // skipping that line entirely. Detect the skip and repair
                // it by flipping the adjacent marker's affinity upstream.
                if let Some(adjacent_index) =
                    current_runs.index_for_offset(adjacent.offset(), adjacent.affinity())
                    && adjacent_index > start_run_index
                    && adjacent_index - start_run_index > 1
                {
                    debug_assert!(adjacent_index - start_run_index == 2);
                    let mut repaired = adjacent.clone();
                    repaired.set_affinity(Affinity::Upstream);
                    return repaired;
                }
            }

            if find_on_next_line {
                return adjacent.find_line(
                    reader,
                    direction,
                    boundary,
                    include_trailing_line_break,
                    stop_at,
                );
            }
        }

        // run_length_sum_to(i) is the offset just past run i, so
        // subtracting the run's own length gives the run's start.
        let compute_offset = |run_end_offset: usize, run_length: usize| match boundary {
            TextUnitBoundary::End => run_end_offset,
            TextUnitBoundary::Start => run_end_offset - run_length,
        };

        let start_line_id = current_runs.line_id(start_run_index);
        let mut line_position = TextMarker::new(
            self.tree_id(),
            Some(current_id),
            compute_offset(
                current_runs.run_length_sum_to(start_run_index),
                current_runs.run_length(start_run_index),
            ),
        )
        .with_origin(origin);

        let mut run_index = start_run_index;
        loop {
            debug_assert!(!current_runs.is_empty(), "text node with zero runs");
            if current_runs.is_empty() {
                return TextMarker::null();
            }

            let indices: Vec<usize> = match direction {
                Direction::Next => (run_index..current_runs.size()).collect(),
                Direction::Previous => (0..=run_index).rev().collect(),
            };
            for i in indices {
                if current_runs.line_id(i) != start_line_id {
                    if boundary == TextUnitBoundary::End {
                        // A line-end position at a soft wrap belongs to
                        // the line it ends, not the one that follows.
                        line_position.set_affinity(Affinity::Upstream);
                    }
                    return line_position;
                }
                line_position = TextMarker::new(
                    self.tree_id(),
                    Some(current_id),
                    compute_offset(current_runs.run_length_sum_to(i), current_runs.run_length(i)),
                )
                .with_origin(origin);
            }

            let Some(next_id) =
                find_object_with_runs(reader, current_id, direction, stop_at, &mut |_| {})
            else {
                return line_position;
            };
            let Some(node) = reader.object_for_id(next_id) else {
                return line_position;
            };
            if include_trailing_line_break == IncludeTrailingLineBreak::No
                && node.role().is_line_break()
            {
                return line_position;
            }
            current_runs = node.text_runs().expect("find_object_with_runs guarantees runs");
            current_id = next_id;
            run_index = match direction {
                Direction::Next => 0,
                Direction::Previous => current_runs.last_run_index(),
            };
        }
    }

    /// Find a paragraph boundary in the given direction.
    ///
    /// There is no dedicated paragraph-break algorithm: boundaries are
    /// rendered newlines within runs, plus containing-block and
    /// editability changes between nodes, plus hard line-break nodes.
    pub fn find_paragraph(
        &self,
        reader: &TreeReader,
        direction: Direction,
        boundary: TextUnitBoundary,
    ) -> TextMarker {
        if !self.is_valid(reader) {
            return TextMarker::null();
        }
        if !self.is_in_text_run(reader) {
            return self
                .to_text_run_marker(reader, None)
                .find_paragraph(reader, direction, boundary);
        }

        let mut current_runs = self.runs(reader).expect("is_in_text_run checked");
        let Some(start_run_index) = current_runs.index_for_offset(self.offset(), self.affinity())
        else {
            debug_assert!(false, "marker offset out of run bounds: {}", self.describe());
            return TextMarker::null();
        };
        let mut current_id = self.node_id().expect("validity checked");
        let origin = if direction == Direction::Previous && boundary == TextUnitBoundary::Start {
            MarkerOrigin::PreviousParagraphStart
        } else {
            MarkerOrigin::NextParagraphEnd
        };

        let sum_to = if start_run_index > 0 {
            current_runs.run_length_sum_to(start_run_index - 1)
        } else {
            0
        };
        let offset_in_start_line = self.offset() - sum_to;

        let mut run_index = start_run_index;
        let mut first_node = true;
        loop {
            debug_assert!(!current_runs.is_empty(), "text node with zero runs");
            if current_runs.is_empty() {
                return TextMarker::null();
            }

            let indices: Vec<usize> = match direction {
                Direction::Next => (run_index..current_runs.size()).collect(),
                Direction::Previous => (0..=run_index).rev().collect(),
            };
            for i in indices {
                let at_start_run = first_node && i == start_run_index;
                // A run ending in a newline marks a boundary, unless the
                // starting offset already sits past that newline.
                if current_runs.run_ends_with_line_break(i)
                    && (!at_start_run
                        || (direction == Direction::Next
                            && current_runs.run_length(i) != offset_in_start_line))
                {
                    let sum_including_line = current_runs.run_length_sum_to(i);
                    let newline_offset = match direction {
                        Direction::Next => sum_including_line - 1,
                        Direction::Previous => sum_including_line,
                    };
                    return TextMarker::new(self.tree_id(), Some(current_id), newline_offset)
                        .with_origin(origin);
                }

                if current_runs.run_starts_with_line_break(i)
                    && (!at_start_run
                        || (direction == Direction::Previous && offset_in_start_line != 0))
                {
                    let sum_up_to_line = if i > 0 {
                        current_runs.run_length_sum_to(i - 1)
                    } else {
                        0
                    };
                    let newline_offset = match direction {
                        Direction::Next => 0,
                        Direction::Previous => 1,
                    };
                    return TextMarker::new(
                        self.tree_id(),
                        Some(current_id),
                        sum_up_to_line + newline_offset,
                    )
                    .with_origin(origin);
                }
            }

            let previous_id = current_id;
            let previous_runs = current_runs.clone();
            let next = find_object_with_runs(reader, current_id, direction, None, &mut |_| {});
            let next_node = next.and_then(|id| reader.object_for_id(id));
            let next_runs = next_node.and_then(|node| node.text_runs());

            // Boundaries also arise from block grouping and editability.
            let is_block_boundary = next_runs
                .as_ref()
                .is_some_and(|runs| runs.containing_block != previous_runs.containing_block);
            let is_edit_boundary = !is_block_boundary
                && next.is_some()
                && reader.editable_ancestor(previous_id).is_some()
                    != next.map(|id| reader.editable_ancestor(id).is_some()).unwrap_or(false);

            let hit_line_break = next_node.is_some_and(|node| node.role().is_line_break());
            if next.is_none()
                || next_runs.is_none()
                || hit_line_break
                || is_block_boundary
                || is_edit_boundary
            {
                let edge = match direction {
                    Direction::Next => previous_runs.total_length(),
                    Direction::Previous => 0,
                };
                return TextMarker::new(self.tree_id(), Some(previous_id), edge)
                    .with_origin(origin);
            }

            current_id = next.expect("checked above");
            current_runs = next_runs.expect("checked above");
            run_index = match direction {
                Direction::Next => 0,
                Direction::Previous => current_runs.last_run_index(),
            };
            first_node = false;
        }
    }

    /// Find a word boundary.
    pub fn find_word(
        &self,
        reader: &TreeReader,
        direction: Direction,
        boundary: TextUnitBoundary,
    ) -> TextMarker {
        self.find_word_or_sentence(reader, direction, true, boundary)
    }

    /// Find a sentence boundary.
    pub fn find_sentence(
        &self,
        reader: &TreeReader,
        direction: Direction,
        boundary: TextUnitBoundary,
    ) -> TextMarker {
        self.find_word_or_sentence(reader, direction, false, boundary)
    }

    fn find_word_or_sentence(
        &self,
        reader: &TreeReader,
        direction: Direction,
        find_word: bool,
        boundary: TextUnitBoundary,
    ) -> TextMarker {
        if !self.is_valid(reader) {
            return TextMarker::null();
        }
        if !self.is_in_text_run(reader) {
            return self.to_text_run_marker(reader, None).find_word_or_sentence(
                reader,
                direction,
                find_word,
                boundary,
            );
        }

        let origin = if find_word {
            match (direction, boundary) {
                (Direction::Previous, TextUnitBoundary::Start) => MarkerOrigin::PreviousWordStart,
                (Direction::Previous, TextUnitBoundary::End) => MarkerOrigin::PreviousWordEnd,
                (Direction::Next, TextUnitBoundary::Start) => MarkerOrigin::NextWordStart,
                (Direction::Next, TextUnitBoundary::End) => MarkerOrigin::NextWordEnd,
            }
        } else if direction == Direction::Previous && boundary == TextUnitBoundary::Start {
            MarkerOrigin::PreviousSentenceStart
        } else {
            MarkerOrigin::NextSentenceEnd
        };

        let mut current_runs = self.runs(reader).expect("is_in_text_run checked");
        let mut current_id = self.node_id().expect("validity checked");

        // Clients can hold markers for text that has since shrunk; clamp
        // back into bounds.
        let mut offset = self.offset().min(current_runs.total_length());
        let mut result = self.clone();

        // The segmentation window. object_border tracks where the current
        // object's text sits in the window relative to everything scanned
        // so far.
        let mut flattened = current_runs.text();
        let mut object_border = match direction {
            Direction::Next => 0usize,
            Direction::Previous => flattened.chars().count(),
        };

        loop {
            if find_word {
                match (direction, boundary) {
                    (Direction::Previous, TextUnitBoundary::Start) => {
                        debug_assert!(offset <= flattened.chars().count());
                        if let Some(start) = previous_word_start(&flattened, offset)
                            && start <= object_border
                        {
                            result = TextMarker::new(self.tree_id(), Some(current_id), start)
                                .with_origin(origin);
                        }
                    }
                    (Direction::Previous, TextUnitBoundary::End) => {
                        if let Some(end) = previous_word_end(&flattened, offset)
                            && end <= object_border
                        {
                            result = TextMarker::new(self.tree_id(), Some(current_id), end)
                                .with_origin(origin);
                        }
                    }
                    (Direction::Next, TextUnitBoundary::Start) => {
                        if let Some(start) = next_word_start(&flattened, offset)
                            && start >= object_border
                        {
                            result = TextMarker::new(
                                self.tree_id(),
                                Some(current_id),
                                start - object_border,
                            )
                            .with_origin(origin);
                        }
                    }
                    (Direction::Next, TextUnitBoundary::End) => {
                        if let Some(mut end) = next_word_end(&flattened, offset)
                            && end >= object_border
                        {
                            // The break iterator will happily return a
                            // whitespace-only segment ("Hello| world" ->
                            // "Hello |world"); skip past it to the real
                            // word end.
                            let span: String = flattened
                                .chars()
                                .skip(offset)
                                .take(end - offset)
                                .collect();
                            if !span.is_empty() && span.chars().all(|c| c.is_ascii_whitespace())
                                && let Some(further) =
                                    next_word_end(&flattened, offset + span.chars().count())
                                && further >= object_border
                            {
                                end = further;
                            }
                            if end >= object_border {
                                result = TextMarker::new(
                                    self.tree_id(),
                                    Some(current_id),
                                    end - object_border,
                                )
                                .with_origin(origin);
                            }
                        }
                    }
                }
            } else {
                match boundary {
                    TextUnitBoundary::Start => {
                        let start = previous_sentence_start(&flattened, offset);
                        if direction == Direction::Previous
                            && let Some(start) = start
                            && start < object_border
                        {
                            result = TextMarker::new(self.tree_id(), Some(current_id), start)
                                .with_origin(origin);
                        } else if direction == Direction::Next
                            && let Some(start) = start
                            && start >= object_border
                        {
                            result = TextMarker::new(
                                self.tree_id(),
                                Some(current_id),
                                start - object_border,
                            )
                            .with_origin(origin);
                        }
                    }
                    TextUnitBoundary::End => {
                        let end = next_sentence_end(&flattened, offset);
                        if direction == Direction::Previous
                            && let Some(end) = end
                            && end <= object_border
                        {
                            result = TextMarker::new(self.tree_id(), Some(current_id), end)
                                .with_origin(origin);
                        } else if direction == Direction::Next
                            && let Some(end) = end
                            && end >= object_border
                            && end != offset
                        {
                            result = TextMarker::new(
                                self.tree_id(),
                                Some(current_id),
                                end - object_border,
                            )
                            .with_origin(origin);
                        }
                    }
                }
            }

            let last_object_editable = reader.editable_ancestor(current_id).is_some();
            let Some(next_id) =
                find_object_with_runs(reader, current_id, direction, None, &mut |_| {})
            else {
                return result;
            };
            let Some(next_runs) = reader.object_for_id(next_id).and_then(|n| n.text_runs())
            else {
                return result;
            };

            // A different containing block indicates a paragraph; the
            // window never grows across one.
            if current_runs.containing_block != next_runs.containing_block {
                return result;
            }
            // Words stop at hard line breaks outside editable content.
            // Sentences don't: the iterator may need context past the
            // break to find the boundary.
            let next_is_line_break = reader
                .object_for_id(next_id)
                .is_some_and(|node| node.role().is_line_break());
            let stop_at_line_break = find_word
                && next_is_line_break
                && reader.editable_ancestor(next_id).is_none();
            if stop_at_line_break
                || last_object_editable != reader.editable_ancestor(next_id).is_some()
            {
                return result;
            }

            current_runs = next_runs;
            current_id = next_id;
            let new_text = current_runs.text();
            let new_length = new_text.chars().count();
            match direction {
                Direction::Previous => {
                    flattened.insert_str(0, &new_text);
                    offset += new_length;
                    object_border = new_length;
                }
                Direction::Next => {
                    // The offset is unchanged when moving forward; text is
                    // appended past it.
                    object_border = flattened.chars().count();
                    flattened.push_str(&new_text);
                }
            }
        }
    }

    // ---- Convenience wrappers ---------------------------------------------

    pub fn previous_line_start(&self, reader: &TreeReader, stop_at: Option<NodeId>) -> TextMarker {
        self.find_line(
            reader,
            Direction::Previous,
            TextUnitBoundary::Start,
            IncludeTrailingLineBreak::No,
            stop_at,
        )
    }

    pub fn next_line_end(
        &self,
        reader: &TreeReader,
        include_trailing_line_break: IncludeTrailingLineBreak,
        stop_at: Option<NodeId>,
    ) -> TextMarker {
        self.find_line(
            reader,
            Direction::Next,
            TextUnitBoundary::End,
            include_trailing_line_break,
            stop_at,
        )
    }

    /// The next word-start boundary after this position.
    pub fn next_word_start(&self, reader: &TreeReader) -> TextMarker {
        self.find_word(reader, Direction::Next, TextUnitBoundary::Start)
    }

    /// The next word-end boundary, not including the current position
    /// (unless the marker is already at the end of a containing block).
    pub fn next_word_end(&self, reader: &TreeReader) -> TextMarker {
        self.find_word(reader, Direction::Next, TextUnitBoundary::End)
    }

    /// The previous word-start boundary, not including the current
    /// position (unless the marker is already at the start of a
    /// containing block).
    pub fn previous_word_start(&self, reader: &TreeReader) -> TextMarker {
        self.find_word(reader, Direction::Previous, TextUnitBoundary::Start)
    }

    pub fn previous_word_end(&self, reader: &TreeReader) -> TextMarker {
        self.find_word(reader, Direction::Previous, TextUnitBoundary::End)
    }

    pub fn previous_sentence_start(&self, reader: &TreeReader) -> TextMarker {
        self.find_sentence(reader, Direction::Previous, TextUnitBoundary::Start)
    }

    pub fn next_sentence_end(&self, reader: &TreeReader) -> TextMarker {
        self.find_sentence(reader, Direction::Next, TextUnitBoundary::End)
    }

    /// The previous paragraph start, moving off the current position
    /// first.
    pub fn previous_paragraph_start(&self, reader: &TreeReader) -> TextMarker {
        let mut adjacent = self.find_marker(
            reader,
            Direction::Previous,
            CoalesceObjectBreaks::Yes,
            IgnoreLineBreaks::No,
            None,
        );
        // Stepping onto a hard line break from regular text advances one
        // more, matching the live-tree equivalent.
        if let (Some(node), Some(adjacent_node)) = (self.node(reader), adjacent.node(reader))
            && !node.role().is_line_break()
            && adjacent_node.role().is_line_break()
        {
            adjacent = adjacent.find_marker(
                reader,
                Direction::Previous,
                CoalesceObjectBreaks::No,
                IgnoreLineBreaks::No,
                None,
            );
        }
        adjacent.find_paragraph(reader, Direction::Previous, TextUnitBoundary::Start)
    }

    /// The next paragraph end, moving off the current position first.
    pub fn next_paragraph_end(&self, reader: &TreeReader) -> TextMarker {
        let mut adjacent = self.find_marker(
            reader,
            Direction::Next,
            CoalesceObjectBreaks::Yes,
            IgnoreLineBreaks::No,
            None,
        );
        if let (Some(node), Some(adjacent_node)) = (self.node(reader), adjacent.node(reader))
            && !node.role().is_line_break()
            && adjacent_node.role().is_line_break()
        {
            adjacent = adjacent.find_marker(
                reader,
                Direction::Next,
                CoalesceObjectBreaks::No,
                IgnoreLineBreaks::No,
                None,
            );
        }
        adjacent.find_paragraph(reader, Direction::Next, TextUnitBoundary::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::live::{LiveTreeSource, StaticLiveTree};
    use crate::property::{NodeProperty, PropertyValue};
    use crate::role::Role;
    use crate::text_run::{TextRun, TextRuns};
    use crate::tree::{SnapshotTreeBuilder, TreeReader, TreeRegistry};

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

    /// One text node with two soft-wrapped lines: "hello " / "world".
    fn wrapped_reader() -> TreeReader {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(2),
            NodeProperty::TextRuns,
            runs_value(1, &[("hello ", 0), ("world", 1)]),
        );
        live.set_root(node_id(1));
        build_reader(&live)
    }

    #[test]
    fn test_segmentation_helpers() {
        assert_eq!(previous_word_start("foo bar", 7), Some(4));
        assert_eq!(previous_word_start("foo bar", 2), Some(0));
        assert_eq!(previous_word_start("foo bar", 0), None);
        assert_eq!(next_word_end("foo bar", 0), Some(3));
        assert_eq!(next_word_start("foo bar", 1), Some(4));
        assert_eq!(previous_word_end("foo bar", 7), Some(3));
    }

    #[test]
    fn test_sentence_helpers() {
        let text = "One two. Three four.";
        assert_eq!(previous_sentence_start(text, 12), Some(9));
        assert_eq!(next_sentence_end(text, 0), Some(9));
        assert_eq!(previous_sentence_start(text, 3), Some(0));
    }

    #[test]
    fn test_sentence_end_excludes_trailing_newline() {
        let text = "Hi there.\nNext";
        let end = next_sentence_end(text, 0).unwrap();
        // The newline after the sentence is not part of it.
        assert!(text.chars().nth(end - 1) != Some('\n'));
    }

    #[test]
    fn test_find_line_boundaries_within_wrap() {
        let reader = wrapped_reader();
        // From the middle of the first line.
        let m = marker(&reader, 2, 2);
        let start = m.find_line(
            &reader,
            Direction::Previous,
            TextUnitBoundary::Start,
            IncludeTrailingLineBreak::No,
            None,
        );
        assert_eq!(start.offset(), 0);

        let end = m.find_line(
            &reader,
            Direction::Next,
            TextUnitBoundary::End,
            IncludeTrailingLineBreak::No,
            None,
        );
        // The first line is "hello " (6 chars); its end is upstream at a
        // soft wrap.
        assert_eq!(end.offset(), 6);
        assert_eq!(end.affinity(), Affinity::Upstream);
    }

    #[test]
    fn test_find_line_from_second_line() {
        let reader = wrapped_reader();
        let m = marker(&reader, 2, 8);
        let start = m.find_line(
            &reader,
            Direction::Previous,
            TextUnitBoundary::Start,
            IncludeTrailingLineBreak::No,
            None,
        );
        assert_eq!(start.offset(), 6);

        let end = m.find_line(
            &reader,
            Direction::Next,
            TextUnitBoundary::End,
            IncludeTrailingLineBreak::No,
            None,
        );
        assert_eq!(end.offset(), 11);
    }

    #[test]
    fn test_find_word_boundaries() {
        let reader = wrapped_reader();
        // "hello |world": previous word start from within "world".
        let m = marker(&reader, 2, 8);
        let start = m.previous_word_start(&reader);
        assert_eq!(start.offset(), 6);

        let end = m.next_word_end(&reader);
        assert_eq!(end.offset(), 11);
    }

    #[test]
    fn test_next_word_end_skips_whitespace_segment() {
        let reader = wrapped_reader();
        // From the end of "hello", the next word end is the end of
        // "world", not the end of the whitespace run.
        let m = marker(&reader, 2, 5);
        let end = m.next_word_end(&reader);
        assert_eq!(end.offset(), 11);
    }

    #[test]
    fn test_word_window_grows_across_nodes() {
        // A word split across two text nodes: "hel" + "lo world".
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2), node_id(3)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.insert_node(node_id(3), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(node_id(2), NodeProperty::TextRuns, runs_value(1, &[("hel", 0)]));
        live.set_property(node_id(3), NodeProperty::TextRuns, runs_value(1, &[("lo world", 0)]));
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        // Previous word start from inside node 3 must reach back into
        // node 2, where the word actually begins.
        let m = marker(&reader, 3, 1);
        let start = m.previous_word_start(&reader);
        assert_eq!(start.node_id(), Some(node_id(2)));
        assert_eq!(start.offset(), 0);
    }

    #[test]
    fn test_find_paragraph_at_rendered_newline() {
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

        // From within "second", the paragraph start is just past the
        // newline.
        let m = marker(&reader, 2, 8);
        let start = m.find_paragraph(&reader, Direction::Previous, TextUnitBoundary::Start);
        assert_eq!(start.offset(), 6);

        // From within "first", the paragraph end stops before the
        // newline.
        let m = marker(&reader, 2, 2);
        let end = m.find_paragraph(&reader, Direction::Next, TextUnitBoundary::End);
        assert_eq!(end.offset(), 5);
    }

    #[test]
    fn test_find_paragraph_stops_at_block_boundary() {
        // Two blocks: node 2 in block 2, node 3 in block 3.
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2), node_id(3)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.insert_node(node_id(3), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(node_id(2), NodeProperty::TextRuns, runs_value(2, &[("alpha", 0)]));
        live.set_property(node_id(3), NodeProperty::TextRuns, runs_value(3, &[("beta", 0)]));
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let m = marker(&reader, 2, 1);
        let end = m.find_paragraph(&reader, Direction::Next, TextUnitBoundary::End);
        assert_eq!(end.node_id(), Some(node_id(2)));
        assert_eq!(end.offset(), 5);

        let m = marker(&reader, 3, 2);
        let start = m.find_paragraph(&reader, Direction::Previous, TextUnitBoundary::Start);
        assert_eq!(start.node_id(), Some(node_id(3)));
        assert_eq!(start.offset(), 0);
    }

    #[test]
    fn test_sentence_boundaries_per_block() {
        let mut live = StaticLiveTree::new();
        live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2), node_id(3)]);
        live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
        live.insert_node(node_id(3), Role::StaticText, Some(node_id(1)), vec![]);
        live.set_property(
            node_id(2),
            NodeProperty::TextRuns,
            runs_value(2, &[("First one. ", 0)]),
        );
        live.set_property(
            node_id(3),
            NodeProperty::TextRuns,
            runs_value(3, &[("Second one.", 0)]),
        );
        live.set_root(node_id(1));
        let reader = build_reader(&live);

        let m = marker(&reader, 2, 3);
        let end = m.next_sentence_end(&reader);
        assert_eq!(end.node_id(), Some(node_id(2)));
        // The break iterator puts the boundary after the trailing space.
        assert_eq!(end.offset(), 11);

        // From within the second node, the sentence start is in the
        // second node.
        let m = marker(&reader, 3, 5);
        let start = m.previous_sentence_start(&reader);
        assert_eq!(start.node_id(), Some(node_id(3)));
        assert_eq!(start.offset(), 0);
    }
}
