//! Batch annotation: indices, navigation, continuation, previews, and the
//! synthesized summary chunk.

use super::options::{ChunkOptions, MAX_PARTS};
use crate::core::{Chunk, ChunkMetadata, ChunkType, DECORATION_SEPARATOR, SUMMARY_INDEX};
use crate::error::{ChunkingError, Result};
use crate::io::char_len;
use crate::io::unicode::{group_thousands, preview, truncate_chars};

/// Marker appended to every chunk except the last of a batch.
pub const CONTINUATION_MARKER: &str = "⬇️ *Continued in next message...*";

/// Navigation header of the summary chunk.
pub const SUMMARY_HEADER: &str = "📋 **SUMMARY** (Read this first)";

/// Length of the preview attached to the first chunk.
pub const FIRST_CHUNK_PREVIEW_CHARS: usize = 100;

/// Length of the preview embedded in the summary chunk.
pub const SUMMARY_PREVIEW_CHARS: usize = 200;

/// Builds the navigation header for part `part` (1-based) of `total`.
///
/// # Examples
///
/// ```
/// use chunk_relay::chunking::navigation_header;
///
/// assert_eq!(navigation_header(2, 5), "📄 **Part 2 of 5**");
/// ```
#[must_use]
pub fn navigation_header(part: usize, total: usize) -> String {
    format!("📄 **Part {part} of {total}**")
}

/// Builds the part footer: position, body length and content type.
///
/// # Examples
///
/// ```
/// use chunk_relay::chunking::navigation_footer;
/// use chunk_relay::core::ChunkType;
///
/// assert_eq!(
///     navigation_footer(2, 5, 1200, ChunkType::Code),
///     "📄 Part 2/5 (1200 chars, code)"
/// );
/// ```
#[must_use]
pub fn navigation_footer(part: usize, total: usize, chars: usize, content_type: ChunkType) -> String {
    format!("📄 Part {part}/{total} ({chars} chars, {content_type})")
}

/// Finalizes a batch of raw chunks in place.
///
/// Sets `index`/`total` and the original length on every chunk, appends
/// the continuation marker to all but the last, and, for multi-chunk
/// batches, adds navigation headers, part footers and a first-chunk preview
/// when enabled.
///
/// # Errors
///
/// Returns [`ChunkingError::TooManyChunks`] if the batch is larger than
/// [`MAX_PARTS`].
pub fn annotate(chunks: &mut [Chunk], original: &str, options: &ChunkOptions) -> Result<()> {
    let total = chunks.len();
    if total > MAX_PARTS {
        return Err(ChunkingError::TooManyChunks {
            count: total,
            max: MAX_PARTS,
        }
        .into());
    }

    let original_length = char_len(original);
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.index = i64::try_from(i).unwrap_or(i64::MAX);
        chunk.metadata.total = total;
        chunk.metadata.original_length = original_length;

        let navigate = options.add_navigation && total > 1;
        chunk.metadata.navigation = navigate.then(|| navigation_header(i + 1, total));
        chunk.metadata.footer = navigate.then(|| {
            navigation_footer(
                i + 1,
                total,
                chunk.metadata.chunk_length,
                chunk.metadata.content_type,
            )
        });
        chunk.metadata.continuation = (i + 1 < total).then(|| CONTINUATION_MARKER.to_string());
        chunk.metadata.preview = (i == 0 && options.add_previews && total > 1)
            .then(|| format!("Preview: {}...", preview(original, FIRST_CHUNK_PREVIEW_CHARS)));
    }
    Ok(())
}

/// Builds the summary chunk for an annotated batch.
///
/// The rendered summary never exceeds `max_chunk_size`. When it would, the
/// per-part breakdown is shortened first, then the preview is dropped, and
/// as a last resort the body is truncated.
#[must_use]
pub fn summary_chunk(chunks: &[Chunk], original: &str, max_chunk_size: usize) -> Chunk {
    let content_type = chunks
        .first()
        .map_or(ChunkType::Text, |c| c.metadata.content_type);
    let budget = max_chunk_size
        .saturating_sub(char_len(SUMMARY_HEADER) + char_len(DECORATION_SEPARATOR));

    let stats = format!(
        "📋 **Content Summary**\n\n📊 **Statistics:**\n• Total length: {} characters\n• Number of parts: {}\n• Content type: {}\n",
        group_thousands(char_len(original)),
        chunks.len(),
        content_type,
    );
    let preview_text = preview(original, SUMMARY_PREVIEW_CHARS).replace("```", "'''");
    let preview_section = (!preview_text.is_empty())
        .then(|| format!("\n🔍 **Preview:**\n```\n{preview_text}\n```\n"));
    let part_lines: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "• Part {}: {} chars ({})",
                i + 1,
                group_thousands(c.metadata.chunk_length),
                c.metadata.content_type
            )
        })
        .collect();

    let body = compose_summary(&stats, preview_section.as_deref(), &part_lines, budget)
        .or_else(|| compose_summary(&stats, None, &part_lines, budget))
        .unwrap_or_else(|| truncate_chars(&format!("{stats}{SUMMARY_FOOTER}"), budget).to_string());

    let chunk_length = char_len(&body);
    Chunk {
        content: body,
        byte_range: 0..0,
        index: SUMMARY_INDEX,
        metadata: ChunkMetadata {
            total: chunks.len() + 1,
            content_type: ChunkType::Mixed,
            strategy: None,
            original_length: char_len(original),
            chunk_length,
            has_code: false,
            has_markdown: true,
            continuation: None,
            navigation: Some(SUMMARY_HEADER.to_string()),
            footer: None,
            preview: None,
            fence_language: None,
        },
    }
}

const SUMMARY_FOOTER: &str = "\n💡 Use the numbered parts below to read the complete content.";

/// Lays out a summary body within `budget`, keeping as many breakdown lines
/// as fit. Returns `None` if even the fixed sections do not fit.
fn compose_summary(
    stats: &str,
    preview_section: Option<&str>,
    part_lines: &[String],
    budget: usize,
) -> Option<String> {
    let head = format!("{stats}{}\n📄 **Parts:**\n", preview_section.unwrap_or_default());
    let fixed = char_len(&head) + char_len(SUMMARY_FOOTER);
    let room = budget.checked_sub(fixed)?;

    let all: usize = part_lines.iter().map(|l| char_len(l) + 1).sum();
    let mut body = head;
    if all <= room {
        for line in part_lines {
            body.push_str(line);
            body.push('\n');
        }
        body.push_str(SUMMARY_FOOTER);
        return Some(body);
    }

    let more_line = |k: usize| format!("• … and {k} more parts\n");
    let room = room.checked_sub(char_len(&more_line(part_lines.len())))?;
    let mut used = 0;
    let mut kept = 0;
    for line in part_lines {
        let len = char_len(line) + 1;
        if used + len > room {
            break;
        }
        body.push_str(line);
        body.push('\n');
        used += len;
        kept += 1;
    }
    body.push_str(&more_line(part_lines.len() - kept));
    body.push_str(SUMMARY_FOOTER);
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_batch(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| {
                let mut chunk = Chunk::new(format!("part {i}"), i * 6..i * 6 + 6);
                chunk.metadata.content_type = ChunkType::Text;
                chunk
            })
            .collect()
    }

    #[test]
    fn test_annotate_multi_chunk() {
        let mut chunks = raw_batch(3);
        annotate(&mut chunks, &"x".repeat(18), &ChunkOptions::new()).unwrap();

        let indices: Vec<i64> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.metadata.total == 3));
        assert!(chunks.iter().all(|c| c.metadata.original_length == 18));
        assert_eq!(
            chunks[1].metadata.navigation.as_deref(),
            Some("📄 **Part 2 of 3**")
        );
        assert_eq!(
            chunks[2].metadata.footer.as_deref(),
            Some("📄 Part 3/3 (6 chars, text)")
        );
        assert!(chunks[2].render().ends_with("📄 Part 3/3 (6 chars, text)"));
        assert!(chunks[0].has_continuation());
        assert!(chunks[1].has_continuation());
        assert!(!chunks[2].has_continuation());
        assert!(
            chunks[0]
                .metadata
                .preview
                .as_deref()
                .is_some_and(|p| p.starts_with("Preview: "))
        );
        assert!(chunks[1].metadata.preview.is_none());
    }

    #[test]
    fn test_annotate_single_chunk_undecorated() {
        let mut chunks = raw_batch(1);
        annotate(&mut chunks, "part 0", &ChunkOptions::new()).unwrap();
        assert!(chunks[0].metadata.navigation.is_none());
        assert!(chunks[0].metadata.footer.is_none());
        assert!(chunks[0].metadata.continuation.is_none());
        assert!(chunks[0].metadata.preview.is_none());
    }

    #[test]
    fn test_annotate_without_navigation_keeps_continuation() {
        let mut chunks = raw_batch(2);
        let options = ChunkOptions::new().add_navigation(false).add_previews(false);
        annotate(&mut chunks, "x", &options).unwrap();
        assert!(chunks.iter().all(|c| c.metadata.navigation.is_none()));
        assert!(chunks.iter().all(|c| c.metadata.footer.is_none()));
        assert!(chunks[0].has_continuation());
        assert!(chunks[0].metadata.preview.is_none());
    }

    #[test]
    fn test_summary_chunk_contents() {
        let original = "word ".repeat(2_400);
        let mut chunks = raw_batch(4);
        annotate(&mut chunks, &original, &ChunkOptions::new()).unwrap();
        let summary = summary_chunk(&chunks, &original, 3800);

        assert!(summary.is_summary());
        assert_eq!(summary.metadata.total, 5);
        assert_eq!(summary.metadata.content_type, ChunkType::Mixed);
        assert!(summary.metadata.strategy.is_none());
        assert!(summary.content.contains("Total length: 12,000 characters"));
        assert!(summary.content.contains("Number of parts: 4"));
        assert!(summary.content.contains("• Part 4:"));
        assert!(summary.render().starts_with(SUMMARY_HEADER));
        assert!(summary.rendered_len() <= 3800);
    }

    #[test]
    fn test_summary_neutralises_fences_in_preview() {
        let original = "```rust\nfn main() {}\n```";
        let summary = summary_chunk(&raw_batch(4), original, 3800);
        assert_eq!(summary.content.matches("```").count(), 2);
    }

    #[test]
    fn test_summary_shrinks_breakdown() {
        let chunks = raw_batch(500);
        let summary = summary_chunk(&chunks, "text", 1000);
        assert!(summary.rendered_len() <= 1000);
        assert!(summary.content.contains("more parts"));
        assert!(summary.content.contains("• Part 1:"));
    }

    #[test]
    fn test_summary_truncates_when_tiny() {
        let summary = summary_chunk(&raw_batch(10), &"long ".repeat(100), 120);
        assert!(summary.rendered_len() <= 120);
        assert!(!summary.content.contains("Preview"));
    }
}
