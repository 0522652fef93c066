//! Unicode utilities for text measurement and slicing.
//!
//! Chunk budgets are expressed in chars (Unicode scalar values), while
//! chunk positions are byte ranges into the source. These helpers convert
//! between the two and keep every cut on a valid boundary.

use unicode_segmentation::UnicodeSegmentation;

/// Returns the length of a string in chars.
///
/// # Examples
///
/// ```
/// use chunk_relay::io::char_len;
///
/// assert_eq!(char_len("Hello"), 5);
/// assert_eq!(char_len("世界"), 2);
/// ```
#[must_use]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Returns the byte offset just past the first `n` chars of `s`.
///
/// Returns `s.len()` when `s` has `n` chars or fewer.
#[must_use]
pub fn byte_offset_after_chars(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(offset, _)| offset)
}

/// Truncates a string to at most `max_chars` chars.
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    &s[..byte_offset_after_chars(s, max_chars)]
}

/// Splits `s` into consecutive windows of at most `window` chars.
///
/// Windows end on grapheme cluster boundaries so combined characters
/// (emoji sequences, accents) stay together. A single cluster longer
/// than `window` is cut on char boundaries instead. Offsets in the
/// returned ranges are relative to `s`.
///
/// # Examples
///
/// ```
/// use chunk_relay::io::unicode::grapheme_windows;
///
/// let windows = grapheme_windows("abcdefg", 3);
/// assert_eq!(windows, vec![0..3, 3..6, 6..7]);
/// ```
#[must_use]
pub fn grapheme_windows(s: &str, window: usize) -> Vec<std::ops::Range<usize>> {
    let window = window.max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    let mut end = 0;
    let mut len = 0;

    for (offset, grapheme) in s.grapheme_indices(true) {
        let g_len = char_len(grapheme);

        if len + g_len <= window {
            end = offset + grapheme.len();
            len += g_len;
            continue;
        }

        if end > start {
            windows.push(start..end);
        }

        if g_len <= window {
            start = offset;
            end = offset + grapheme.len();
            len = g_len;
            continue;
        }

        // Oversized cluster: fall back to raw char windows.
        let mut cursor = offset;
        let cluster_end = offset + grapheme.len();
        while cursor < cluster_end {
            let step = byte_offset_after_chars(&s[cursor..cluster_end], window);
            windows.push(cursor..cursor + step);
            cursor += step;
        }
        start = cluster_end;
        end = cluster_end;
        len = 0;
    }

    if end > start {
        windows.push(start..end);
    }

    windows
}

/// Collapses every whitespace run to a single space and trims the ends.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds a one-line preview of `s` of at most `max_chars` chars.
///
/// Whitespace is collapsed first. Previews that had to be cut end with `...`.
#[must_use]
pub fn preview(s: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(s);
    if char_len(&collapsed) <= max_chars {
        return collapsed;
    }
    let kept = truncate_chars(&collapsed, max_chars.saturating_sub(3));
    format!("{kept}...")
}

/// Formats an integer with `,` thousands separators.
///
/// # Examples
///
/// ```
/// use chunk_relay::io::unicode::group_thousands;
///
/// assert_eq!(group_thousands(10_000), "10,000");
/// assert_eq!(group_thousands(999), "999");
/// ```
#[must_use]
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_len() {
        assert_eq!(char_len(""), 0);
        assert_eq!(char_len("Hello 世界!"), 9);
        assert_eq!(char_len("⬇️"), 2);
    }

    #[test]
    fn test_byte_offset_after_chars() {
        let s = "Hello 世界";
        assert_eq!(byte_offset_after_chars(s, 0), 0);
        assert_eq!(byte_offset_after_chars(s, 6), 6);
        assert_eq!(byte_offset_after_chars(s, 7), 9); // After '世'
        assert_eq!(byte_offset_after_chars(s, 100), s.len());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("Hello", 3), "Hel");
        assert_eq!(truncate_chars("世界!", 2), "世界");
        assert_eq!(truncate_chars("Hello", 10), "Hello");
    }

    #[test]
    fn test_grapheme_windows_cover_input() {
        let s = "Hello 世界! Some more text here.";
        let windows = grapheme_windows(s, 4);
        let rebuilt: String = windows.iter().map(|r| &s[r.clone()]).collect();
        assert_eq!(rebuilt, s);
        for w in &windows {
            assert!(char_len(&s[w.clone()]) <= 4);
        }
    }

    #[test]
    fn test_grapheme_windows_keep_clusters_together() {
        // "e" + combining acute accent is one grapheme of two chars
        let s = "abe\u{301}cd";
        let windows = grapheme_windows(s, 3);
        assert_eq!(&s[windows[0].clone()], "ab");
        assert_eq!(&s[windows[1].clone()], "e\u{301}c");
    }

    #[test]
    fn test_grapheme_windows_oversized_cluster() {
        // Family emoji: several chars joined by ZWJ, one grapheme
        let s = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}";
        let windows = grapheme_windows(s, 2);
        let rebuilt: String = windows.iter().map(|r| &s[r.clone()]).collect();
        assert_eq!(rebuilt, s);
        for w in &windows {
            assert!(char_len(&s[w.clone()]) <= 2);
        }
    }

    #[test]
    fn test_grapheme_windows_empty() {
        assert!(grapheme_windows("", 10).is_empty());
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\tc  "), "a b c");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short  text", 100), "short text");
        let long = "word ".repeat(50);
        let p = preview(&long, 20);
        assert_eq!(char_len(&p), 20);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
