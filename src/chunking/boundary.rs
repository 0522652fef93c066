//! Unit segmentation for each rung of the boundary ladder.
//!
//! Every function here partitions a byte range of the source text into
//! contiguous units. Separators stay attached to the unit they end, so
//! concatenating the units of a range always yields the range itself.

use super::classify::{fence_regex, static_regex};
use crate::core::ChunkStrategy;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// A code-block segment: prose between fences, or one complete fenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte range in the source text.
    pub range: Range<usize>,
    /// Whether the segment is a fenced block.
    pub fenced: bool,
}

fn paragraph_break_regex() -> &'static Regex {
    static_regex!(PARAGRAPH_BREAK, r"\n\s*\n")
}

fn sentence_break_regex() -> &'static Regex {
    static_regex!(SENTENCE_BREAK, r"[.!?]\s+")
}

fn whitespace_regex() -> &'static Regex {
    static_regex!(WHITESPACE, r"\s+")
}

fn protected_regexes() -> [&'static Regex; 5] {
    [
        static_regex!(P_BOLD, r"\*\*[^*\n]+\*\*"),
        static_regex!(P_UNDERLINE, r"__[^_\n]+__"),
        static_regex!(P_STRIKE, r"~~[^~\n]+~~"),
        static_regex!(P_INLINE_CODE, r"`[^`\n]+`"),
        static_regex!(P_LINK, r"\[[^\]\n]+\]\([^)\n]+\)"),
    ]
}

/// Sorted, disjoint byte ranges of inline markdown spans that must not be
/// broken at sentence or word level.
#[derive(Debug, Clone, Default)]
pub struct ProtectedSpans {
    spans: Vec<Range<usize>>,
}

impl ProtectedSpans {
    /// Collects bold, underline, strikethrough, inline code and link spans.
    #[must_use]
    pub fn find(text: &str) -> Self {
        let mut spans: Vec<Range<usize>> = protected_regexes()
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| m.range()))
            .collect();
        spans.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
        for span in spans {
            match merged.last_mut() {
                Some(last) if span.start < last.end => last.end = last.end.max(span.end),
                _ => merged.push(span),
            }
        }
        Self { spans: merged }
    }

    /// Returns `true` if cutting at `offset` would split a span.
    #[must_use]
    pub fn splits(&self, offset: usize) -> bool {
        let idx = self.spans.partition_point(|s| s.start < offset);
        idx > 0 && self.spans[idx - 1].end > offset
    }

    /// Returns the number of spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Checks whether no spans were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Splits `range` of `text` into units for `strategy`.
///
/// Code-block and character strategies are not unit based; for them the
/// whole range is returned as a single unit.
#[must_use]
pub fn units(
    text: &str,
    range: Range<usize>,
    strategy: ChunkStrategy,
    protected: &ProtectedSpans,
) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let base = range.start;

    let points: Vec<usize> = match strategy {
        ChunkStrategy::Paragraph => paragraph_break_regex()
            .find_iter(slice)
            .map(|m| base + m.end())
            .collect(),
        ChunkStrategy::Sentence => sentence_break_regex()
            .find_iter(slice)
            .map(|m| base + m.end())
            .filter(|&p| !protected.splits(p))
            .collect(),
        ChunkStrategy::Line => slice
            .match_indices('\n')
            .map(|(i, _)| base + i + 1)
            .collect(),
        ChunkStrategy::Word => whitespace_regex()
            .find_iter(slice)
            .map(|m| base + m.end())
            .filter(|&p| !protected.splits(p))
            .collect(),
        ChunkStrategy::CodeBlock | ChunkStrategy::Character => Vec::new(),
    };

    cut(range, &points)
}

/// Splits `range` of `text` into alternating prose and fenced segments.
#[must_use]
pub fn code_segments(text: &str, range: Range<usize>) -> Vec<Segment> {
    let slice = &text[range.clone()];
    let base = range.start;
    let mut segments = Vec::new();
    let mut cursor = range.start;

    for m in fence_regex().find_iter(slice) {
        let start = base + m.start();
        let end = base + m.end();
        if start > cursor {
            segments.push(Segment {
                range: cursor..start,
                fenced: false,
            });
        }
        segments.push(Segment {
            range: start..end,
            fenced: true,
        });
        cursor = end;
    }

    if cursor < range.end {
        segments.push(Segment {
            range: cursor..range.end,
            fenced: false,
        });
    }

    segments
}

/// Turns sorted cut points into contiguous non-empty ranges covering `range`.
fn cut(range: Range<usize>, points: &[usize]) -> Vec<Range<usize>> {
    let mut out = Vec::with_capacity(points.len() + 1);
    let mut start = range.start;
    for &p in points {
        if p > start && p < range.end {
            out.push(start..p);
            start = p;
        }
    }
    if start < range.end {
        out.push(start..range.end);
    }
    out
}
