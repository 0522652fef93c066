//! Greedy boundary-ladder splitter.
//!
//! Units of the current strategy are packed into pieces no longer than the
//! body budget. A unit that alone exceeds the budget is split with the next
//! finer strategy, down to grapheme windows, which always succeed.
//!
//! Oversized fenced code blocks are split along their internal lines and
//! every piece is re-fenced with the original language tag.

use super::boundary::{ProtectedSpans, Segment, code_segments, units};
use super::options::MIN_FENCE_PAYLOAD;
use crate::core::ChunkStrategy;
use crate::io::char_len;
use crate::io::unicode::grapheme_windows;
use std::ops::Range;
use tracing::{debug, warn};

const FENCE: &str = "```";

/// One split result, before it becomes a [`crate::core::Chunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    /// Byte range of the source text this piece covers.
    pub range: Range<usize>,
    /// Strategy that produced the piece.
    pub strategy: ChunkStrategy,
    /// Replacement body for re-fenced code; `None` means the source slice.
    pub body: Option<String>,
    /// Language tag of the re-emitted fences.
    pub fence_language: Option<String>,
}

impl Piece {
    const fn source(range: Range<usize>, strategy: ChunkStrategy) -> Self {
        Self {
            range,
            strategy,
            body: None,
            fence_language: None,
        }
    }

    /// Returns the sendable body of the piece.
    #[must_use]
    pub fn body<'a>(&'a self, text: &'a str) -> &'a str {
        self.body.as_deref().unwrap_or(&text[self.range.clone()])
    }
}

/// Splits one source text against a fixed body budget.
#[derive(Debug)]
pub struct Splitter<'a> {
    text: &'a str,
    budget: usize,
    preserve_code: bool,
    protected: ProtectedSpans,
}

impl<'a> Splitter<'a> {
    /// Creates a splitter.
    ///
    /// # Arguments
    ///
    /// * `text` - Source text.
    /// * `budget` - Maximum body length in chars (clamped to at least 1).
    /// * `preserve_code` - Split oversized fences by line and re-fence them.
    /// * `preserve_markdown` - Never break inside inline markdown spans.
    #[must_use]
    pub fn new(text: &'a str, budget: usize, preserve_code: bool, preserve_markdown: bool) -> Self {
        let protected = if preserve_markdown {
            ProtectedSpans::find(text)
        } else {
            ProtectedSpans::default()
        };
        Self {
            text,
            budget: budget.max(1),
            preserve_code,
            protected,
        }
    }

    /// Splits the whole text, starting at `strategy`.
    #[must_use]
    pub fn split(&self, strategy: ChunkStrategy) -> Vec<Piece> {
        let mut out = Vec::new();
        self.split_range(0..self.text.len(), strategy, &mut out);
        out
    }

    fn split_range(&self, range: Range<usize>, strategy: ChunkStrategy, out: &mut Vec<Piece>) {
        if range.is_empty() {
            return;
        }
        match strategy {
            ChunkStrategy::Character => self.split_characters(range, self.budget, out),
            ChunkStrategy::CodeBlock => {
                let segments = code_segments(self.text, range);
                self.accumulate(segments, ChunkStrategy::CodeBlock, out);
            }
            ChunkStrategy::Paragraph
            | ChunkStrategy::Sentence
            | ChunkStrategy::Line
            | ChunkStrategy::Word => {
                let segments = units(self.text, range, strategy, &self.protected)
                    .into_iter()
                    .map(|range| Segment {
                        range,
                        fenced: false,
                    })
                    .collect();
                self.accumulate(segments, strategy, out);
            }
        }
    }

    /// Greedily packs contiguous units into pieces of at most `budget` chars.
    fn accumulate(&self, segments: Vec<Segment>, strategy: ChunkStrategy, out: &mut Vec<Piece>) {
        let mut buffer: Option<Range<usize>> = None;
        let mut buffer_len = 0;

        for segment in segments {
            let len = char_len(&self.text[segment.range.clone()]);

            if len > self.budget {
                if let Some(range) = buffer.take() {
                    out.push(Piece::source(range, strategy));
                }
                buffer_len = 0;
                self.escalate(segment, strategy, out);
                continue;
            }

            match buffer.as_mut() {
                Some(range) if buffer_len + len <= self.budget => {
                    range.end = segment.range.end;
                    buffer_len += len;
                }
                _ => {
                    if let Some(range) = buffer.take() {
                        out.push(Piece::source(range, strategy));
                    }
                    buffer = Some(segment.range);
                    buffer_len = len;
                }
            }
        }

        if let Some(range) = buffer {
            out.push(Piece::source(range, strategy));
        }
    }

    fn escalate(&self, segment: Segment, strategy: ChunkStrategy, out: &mut Vec<Piece>) {
        if segment.fenced && self.preserve_code {
            self.split_fence(segment.range, out);
            return;
        }
        let next = strategy.fallback().unwrap_or(ChunkStrategy::Character);
        debug!(
            from = %strategy,
            to = %next,
            bytes = segment.range.len(),
            "escalating oversized unit"
        );
        self.split_range(segment.range, next, out);
    }

    fn split_characters(&self, range: Range<usize>, window: usize, out: &mut Vec<Piece>) {
        let base = range.start;
        for w in grapheme_windows(&self.text[range], window) {
            out.push(Piece::source(
                base + w.start..base + w.end,
                ChunkStrategy::Character,
            ));
        }
    }

    /// Splits an oversized fenced block along its lines, re-fencing each piece.
    fn split_fence(&self, range: Range<usize>, out: &mut Vec<Piece>) {
        let block = &self.text[range.clone()];
        let Some(header_end) = block.find('\n') else {
            warn!("fenced block without newline, split by line without re-fencing");
            self.split_range(range, ChunkStrategy::Line, out);
            return;
        };

        let language = block[FENCE.len()..header_end].trim().to_string();
        let opening = format!("{FENCE}{language}\n");
        let overhead = char_len(&opening) + char_len(FENCE) + 1;
        let payload_budget = self.budget.saturating_sub(overhead);

        let inner = range.start + header_end + 1..range.end - FENCE.len();
        if payload_budget < MIN_FENCE_PAYLOAD || inner.is_empty() {
            warn!(
                %language,
                budget = self.budget,
                "fence overhead leaves no room, split by line without re-fencing"
            );
            self.split_range(range, ChunkStrategy::Line, out);
            return;
        }

        let groups = self.group_lines(inner, payload_budget);
        let last = groups.len().saturating_sub(1);
        for (i, group) in groups.into_iter().enumerate() {
            let code = self.text[group.clone()]
                .strip_suffix('\n')
                .unwrap_or(&self.text[group.clone()]);
            let body = format!("{opening}{code}\n{FENCE}");
            let start = if i == 0 { range.start } else { group.start };
            let end = if i == last { range.end } else { group.end };
            out.push(Piece {
                range: start..end,
                strategy: ChunkStrategy::CodeBlock,
                body: Some(body),
                fence_language: Some(language.clone()),
            });
        }
    }

    /// Packs the lines of `inner` into groups of at most `budget` chars.
    ///
    /// A line longer than the budget becomes a run of grapheme windows.
    fn group_lines(&self, inner: Range<usize>, budget: usize) -> Vec<Range<usize>> {
        let mut groups = Vec::new();
        let mut current: Option<Range<usize>> = None;
        let mut current_len = 0;

        let protected = ProtectedSpans::default();
        for line in units(self.text, inner, ChunkStrategy::Line, &protected) {
            let len = char_len(&self.text[line.clone()]);

            if len > budget {
                if let Some(group) = current.take() {
                    groups.push(group);
                }
                current_len = 0;
                let base = line.start;
                groups.extend(
                    grapheme_windows(&self.text[line], budget)
                        .into_iter()
                        .map(|w| base + w.start..base + w.end),
                );
                continue;
            }

            match current.as_mut() {
                Some(group) if current_len + len <= budget => {
                    group.end = line.end;
                    current_len += len;
                }
                _ => {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    current = Some(line);
                    current_len = len;
                }
            }
        }

        if let Some(group) = current {
            groups.push(group);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies(text: &str, pieces: &[Piece]) -> Vec<String> {
        pieces.iter().map(|p| p.body(text).to_string()).collect()
    }

    fn rebuilt(text: &str, pieces: &[Piece]) -> String {
        pieces.iter().map(|p| &text[p.range.clone()]).collect()
    }

    #[test]
    fn test_paragraph_packing() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let pieces = Splitter::new(text, 12, true, true).split(ChunkStrategy::Paragraph);
        assert_eq!(bodies(text, &pieces), vec!["aaaa\n\nbbbb\n\n", "cccc"]);
        assert!(pieces.iter().all(|p| p.strategy == ChunkStrategy::Paragraph));
    }

    #[test]
    fn test_oversized_paragraph_escalates_to_sentences() {
        let text = "One two. Three four. Five six.\n\nEnd.";
        let pieces = Splitter::new(text, 12, true, true).split(ChunkStrategy::Paragraph);
        assert_eq!(rebuilt(text, &pieces), text);
        assert_eq!(pieces[0].strategy, ChunkStrategy::Sentence);
        assert!(pieces.iter().all(|p| char_len(p.body(text)) <= 12));
    }

    #[test]
    fn test_long_word_falls_to_characters() {
        let text = "short supercalifragilistic end";
        let pieces = Splitter::new(text, 8, true, true).split(ChunkStrategy::Word);
        assert_eq!(rebuilt(text, &pieces), text);
        assert!(
            pieces
                .iter()
                .any(|p| p.strategy == ChunkStrategy::Character)
        );
        assert!(pieces.iter().all(|p| char_len(p.body(text)) <= 8));
    }

    #[test]
    fn test_character_windows() {
        let text = "abcdefghij";
        let pieces = Splitter::new(text, 4, false, false).split(ChunkStrategy::Character);
        assert_eq!(bodies(text, &pieces), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_small_fence_kept_whole_with_prose() {
        let text = "intro\n```sh\nls\n```\noutro";
        let pieces = Splitter::new(text, 100, true, true).split(ChunkStrategy::CodeBlock);
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].body.is_none());
    }

    #[test]
    fn test_oversized_fence_is_refenced() {
        let code: String = (0..40).map(|i| format!("let x{i} = {i};\n")).collect();
        let text = format!("Intro text.\n```rust\n{code}```\nOutro.");
        let pieces = Splitter::new(&text, 120, true, true).split(ChunkStrategy::CodeBlock);

        assert_eq!(rebuilt(&text, &pieces), text);
        let fenced: Vec<&Piece> = pieces.iter().filter(|p| p.body.is_some()).collect();
        assert!(fenced.len() >= 2);
        for piece in &fenced {
            let body = piece.body(&text);
            assert!(body.starts_with("```rust\n"));
            assert!(body.ends_with("\n```"));
            assert!(char_len(body) <= 120);
            assert_eq!(piece.fence_language.as_deref(), Some("rust"));
        }
    }

    #[test]
    fn test_overlong_code_line_is_windowed_and_refenced() {
        let text = format!("```\n{}\n```", "x".repeat(200));
        let pieces = Splitter::new(&text, 60, true, true).split(ChunkStrategy::CodeBlock);
        assert_eq!(rebuilt(&text, &pieces), text);
        assert!(pieces.len() >= 4);
        for piece in &pieces {
            let body = piece.body(&text);
            assert!(body.starts_with("```\n"));
            assert!(body.ends_with("\n```"));
            assert!(char_len(body) <= 60);
        }
    }

    #[test]
    fn test_fence_without_preserve_splits_by_lines() {
        let code: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let text = format!("```\n{code}```");
        let pieces = Splitter::new(&text, 40, false, true).split(ChunkStrategy::CodeBlock);
        assert_eq!(rebuilt(&text, &pieces), text);
        assert!(pieces.iter().all(|p| p.body.is_none()));
    }

    #[test]
    fn test_fence_without_newline_falls_back() {
        let text = format!("```{}```", "y".repeat(100));
        let pieces = Splitter::new(&text, 30, true, true).split(ChunkStrategy::CodeBlock);
        assert_eq!(rebuilt(&text, &pieces), text);
        assert!(pieces.iter().all(|p| p.body.is_none()));
        assert!(pieces.iter().all(|p| char_len(p.body(&text)) <= 30));
    }

    #[test]
    fn test_long_language_tag_falls_back_to_lines() {
        let language = "l".repeat(30);
        let code: String = (0..10).map(|i| format!("value_{i} = {i}\n")).collect();
        let text = format!("```{language}\n{code}```");
        let pieces = Splitter::new(&text, 40, true, true).split(ChunkStrategy::CodeBlock);

        assert_eq!(rebuilt(&text, &pieces), text);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.body.is_none()));
        assert!(pieces.iter().all(|p| p.fence_language.is_none()));
        assert!(pieces.iter().all(|p| p.strategy != ChunkStrategy::CodeBlock));
        assert!(pieces.iter().all(|p| char_len(p.body(&text)) <= 40));
    }

    #[test]
    fn test_markdown_span_kept_together() {
        let text = "aa **keep these words** bb";
        let pieces = Splitter::new(text, 22, true, true).split(ChunkStrategy::Word);
        assert!(
            bodies(text, &pieces)
                .iter()
                .any(|b| b.contains("**keep these words**"))
        );
        assert_eq!(rebuilt(text, &pieces), text);
    }

    #[test]
    fn test_empty_text() {
        let pieces = Splitter::new("", 10, true, true).split(ChunkStrategy::Paragraph);
        assert!(pieces.is_empty());
    }
}
