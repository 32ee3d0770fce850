//! Cached text runs.
//!
//! A text run is a precomputed summary of one rendered line fragment of a
//! node's text: the characters, which visual line they landed on, and
//! (when available) per-character advances and the line height. Together
//! the runs of a node are sufficient to answer offset and line queries on
//! the reader thread without any layout access.
//!
//! All offsets in this module count Unicode scalar values within the
//! node's rendered text, not bytes.

use unicode_segmentation::UnicodeSegmentation;

use crate::geometry::Rect;
use crate::id::NodeId;

/// Disambiguates a position exactly at a soft line-wrap boundary: does it
/// belong to the end of the prior line (upstream) or the start of the next
/// (downstream)?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Affinity {
    Upstream,
    #[default]
    Downstream,
}

/// Identifies one rendered line.
///
/// Line indices are only meaningful within one containing block, so the
/// id pairs the block with the index. Two runs on different nodes compare
/// equal here exactly when layout placed them on the same visual line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId {
    /// The containing block the line belongs to.
    pub block: Option<NodeId>,
    /// The index of the line within its containing block.
    pub index: u32,
}

/// One rendered line fragment of a node's text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    text: String,
    /// Number of Unicode scalar values in `text`, cached at construction.
    char_len: usize,
    /// The index of the line this run landed on within the containing
    /// block.
    pub line_index: u32,
    /// Height of the line this run is part of.
    pub line_height: f32,
    /// Per-character advances. May be empty when geometry was not cached
    /// for this run; geometry queries then under-report width rather than
    /// fail.
    pub advances: Vec<f32>,
}

impl TextRun {
    /// Create a run with no cached geometry.
    pub fn new(text: impl Into<String>, line_index: u32) -> Self {
        let text = text.into();
        let char_len = text.chars().count();
        Self {
            text,
            char_len,
            line_index,
            line_height: 0.0,
            advances: Vec::new(),
        }
    }

    /// Create a run with cached per-character advances and line height.
    pub fn with_metrics(
        text: impl Into<String>,
        line_index: u32,
        line_height: f32,
        advances: Vec<f32>,
    ) -> Self {
        let text = text.into();
        let char_len = text.chars().count();
        Self {
            text,
            char_len,
            line_index,
            line_height,
            advances,
        }
    }

    /// The run's text.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The run's length in characters.
    #[inline]
    pub fn len(&self) -> usize {
        self.char_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    /// Sum the advances of the characters in `[start, end)`, both counted
    /// from the start of this run.
    fn advance_between(&self, start: usize, end: usize) -> f32 {
        debug_assert!(start <= end);
        self.advances
            .iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .sum()
    }
}

/// The cached text runs of one node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextRuns {
    /// The block ancestor whose lines these runs are indexed against.
    pub containing_block: Option<NodeId>,
    runs: Vec<TextRun>,
    /// True when every run is pure ASCII, enabling the single-step
    /// character movement fast path.
    contains_only_ascii: bool,
}

impl TextRuns {
    pub fn new(containing_block: Option<NodeId>, runs: Vec<TextRun>) -> Self {
        let contains_only_ascii = runs.iter().all(|run| run.text.is_ascii());
        Self {
            containing_block,
            runs,
            contains_only_ascii,
        }
    }

    /// Number of runs.
    #[inline]
    pub fn size(&self) -> usize {
        self.runs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// True when every run is pure ASCII.
    #[inline]
    pub fn contains_only_ascii(&self) -> bool {
        self.contains_only_ascii
    }

    /// The run at `index`.
    #[inline]
    pub fn run(&self, index: usize) -> &TextRun {
        &self.runs[index]
    }

    /// The text of the run at `index`.
    #[inline]
    pub fn run_string(&self, index: usize) -> &str {
        &self.runs[index].text
    }

    /// The character length of the run at `index`.
    #[inline]
    pub fn run_length(&self, index: usize) -> usize {
        self.runs[index].char_len
    }

    /// The character length of the last run, or 0 with no runs.
    pub fn last_run_length(&self) -> usize {
        self.runs.last().map_or(0, |run| run.char_len)
    }

    /// Index of the last run.
    #[inline]
    pub fn last_run_index(&self) -> usize {
        self.runs.len().saturating_sub(1)
    }

    /// Total character length across all runs.
    pub fn total_length(&self) -> usize {
        self.runs.iter().map(|run| run.char_len).sum()
    }

    /// Sum of run lengths for runs `0..=index`.
    pub fn run_length_sum_to(&self, index: usize) -> usize {
        self.runs
            .iter()
            .take(index + 1)
            .map(|run| run.char_len)
            .sum()
    }

    /// The line id of the run at `index`.
    pub fn line_id(&self, index: usize) -> Option<LineId> {
        self.runs.get(index).map(|run| LineId {
            block: self.containing_block,
            index: run.line_index,
        })
    }

    /// Find the run a character offset points into.
    ///
    /// An offset at the exact end of a run is ambiguous under soft line
    /// wrapping: downstream affinity resolves it to the start of the next
    /// run, upstream to the end of the current one.
    pub fn index_for_offset(&self, offset: usize, affinity: Affinity) -> Option<usize> {
        let mut cumulative = 0;
        for (i, run) in self.runs.iter().enumerate() {
            cumulative += run.char_len;
            if cumulative > offset {
                // The offset points into the middle of a run, which is
                // never ambiguous.
                return Some(i);
            }
            if cumulative == offset {
                if affinity == Affinity::Downstream && i < self.last_run_index() {
                    return Some(i + 1);
                }
                return Some(i);
            }
        }
        None
    }

    /// The flattened text of all runs.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for run in &self.runs {
            text.push_str(&run.text);
        }
        text
    }

    /// Substring of the flattened text: `length` characters starting at
    /// character `start`. Out-of-range requests are clamped.
    pub fn substring(&self, start: usize, length: usize) -> String {
        self.text().chars().skip(start).take(length).collect()
    }

    /// Substring from character `start` through the end of the runs.
    pub fn substring_from(&self, start: usize) -> String {
        self.text().chars().skip(start).collect()
    }

    /// Whether the run at `index` ends with a rendered newline.
    pub fn run_ends_with_line_break(&self, index: usize) -> bool {
        self.runs
            .get(index)
            .is_some_and(|run| run.text.ends_with('\n'))
    }

    /// Whether the run at `index` starts with a rendered newline.
    pub fn run_starts_with_line_break(&self, index: usize) -> bool {
        self.runs
            .get(index)
            .is_some_and(|run| run.text.starts_with('\n'))
    }

    /// The rectangle covering characters `[start, end)`, relative to the
    /// top-left of this node's own frame.
    ///
    /// A collapsed range (start == end) yields a caret-width rectangle.
    /// Runs without cached advances contribute zero width; too-narrow is
    /// accepted here since the multi-node union path widens the result
    /// with whole-node frames anyway.
    pub fn local_rect(&self, start: usize, end: usize) -> Rect {
        if self.runs.is_empty() {
            return Rect::ZERO;
        }
        let total = self.total_length();
        let smaller = start.min(end).min(total);
        let larger = start.max(end).min(total);

        // Hardcode downstream affinity: a range end exactly at a soft wrap
        // should not drag in the line above.
        let first_run = match self.index_for_offset(smaller, Affinity::Downstream) {
            Some(index) => index,
            None => return Rect::ZERO,
        };
        let last_run = self
            .index_for_offset(larger, Affinity::Downstream)
            .unwrap_or(self.last_run_index());

        // Matches the caret width used by layout for collapsed selections.
        const CARET_WIDTH: f32 = 2.0;

        let mut height_before = 0.0f32;
        for i in 0..first_run {
            height_before += self.runs[i].line_height;
        }

        let mut x_offset = 0.0f32;
        let mut max_width = 0.0f32;
        let mut height = 0.0f32;
        for i in first_run..=last_run {
            let run = &self.runs[i];
            let run_start = if i == 0 {
                0
            } else {
                self.run_length_sum_to(i - 1)
            };

            let range_start_in_run = if i == first_run {
                smaller - run_start
            } else {
                0
            };
            let range_end_in_run = if i == last_run {
                larger - run_start
            } else {
                run.char_len
            };

            let mut width = run.advance_between(range_start_in_run, range_end_in_run);
            if smaller == larger {
                width = CARET_WIDTH;
            }

            if i == first_run {
                x_offset = run.advance_between(0, range_start_in_run);
            } else {
                // The range wrapped onto a new line, so the rect must span
                // from the left edge.
                width += x_offset;
                x_offset = 0.0;
            }

            max_width = max_width.max(width);
            if width > 0.0 {
                height += run.line_height;
            }
        }

        Rect::new(x_offset, height_before, max_width, height)
    }

    /// Human-readable description of the runs, for diagnostics.
    pub fn describe(&self) -> String {
        use std::fmt::Write;

        let mut out = String::from("[");
        for (i, run) in self.runs.iter().enumerate() {
            let _ = write!(
                out,
                "line {}: |{}|(len {})",
                run.line_index,
                run.text.replace('\n', "{newline}"),
                run.char_len
            );
            if i != self.runs.len() - 1 {
                out.push_str(", ");
            }
        }
        out.push(']');
        out
    }
}

/// The character offset just past the grapheme cluster containing (or
/// starting at) `offset`. `None` when `offset` is already at or past the
/// end of the text.
pub(crate) fn next_grapheme_offset(text: &str, offset: usize) -> Option<usize> {
    let mut char_pos = 0;
    for grapheme in text.graphemes(true) {
        let len = grapheme.chars().count();
        if char_pos + len > offset {
            return Some(char_pos + len);
        }
        char_pos += len;
    }
    None
}

/// The character offset of the start of the grapheme cluster preceding
/// `offset`. `None` when `offset` is 0.
pub(crate) fn prev_grapheme_offset(text: &str, offset: usize) -> Option<usize> {
    if offset == 0 {
        return None;
    }
    let mut char_pos = 0;
    for grapheme in text.graphemes(true) {
        let len = grapheme.chars().count();
        if char_pos + len >= offset {
            return Some(char_pos);
        }
        char_pos += len;
    }
    Some(char_pos)
}
