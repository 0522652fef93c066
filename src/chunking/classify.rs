//! Content classification.
//!
//! Assigns a [`ChunkType`] to raw text and picks the splitting strategy
//! for it. Everything here is a pure function of the input.

use crate::core::{ChunkStrategy, ChunkType};
use regex::Regex;
use std::sync::OnceLock;

/// Compiles a pattern once and caches it in a function-local static.
macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {{
        static $name: OnceLock<Regex> = OnceLock::new();
        #[allow(clippy::expect_used)]
        let re = $name.get_or_init(|| Regex::new($pattern).expect("valid regex"));
        re
    }};
}

pub(crate) use static_regex;

/// Matches a complete fenced code block, fences included.
pub(crate) fn fence_regex() -> &'static Regex {
    static_regex!(FENCE, r"(?s)```.*?```")
}

fn inline_code_regex() -> &'static Regex {
    static_regex!(INLINE_CODE, r"`[^`\n]+`")
}

fn markdown_regexes() -> [&'static Regex; 5] {
    [
        static_regex!(BOLD, r"\*\*[^*\n]+\*\*"),
        static_regex!(ITALIC, r"\*[^*\n]+\*"),
        static_regex!(UNDERLINE, r"__[^_\n]+__"),
        static_regex!(STRIKE, r"~~[^~\n]+~~"),
        static_regex!(LINK, r"\[[^\]\n]+\]\([^)\n]+\)"),
    ]
}

fn list_item_regex() -> &'static Regex {
    static_regex!(LIST_ITEM, r"^\s*[-*•]\s+")
}

/// Detects the content type of `content`.
///
/// Rules are checked in order: fenced code, whole-text JSON, bullet list
/// (more than half of non-empty lines), table (more than 30% of lines
/// contain `|`), otherwise text.
///
/// # Examples
///
/// ```
/// use chunk_relay::chunking::classify;
/// use chunk_relay::core::ChunkType;
///
/// assert_eq!(classify("```rust\nfn main() {}\n```"), ChunkType::Code);
/// assert_eq!(classify(r#"{"a": 1}"#), ChunkType::Json);
/// assert_eq!(classify("- one\n- two"), ChunkType::List);
/// assert_eq!(classify("Just words."), ChunkType::Text);
/// ```
#[must_use]
pub fn classify(content: &str) -> ChunkType {
    if fence_regex().is_match(content) {
        return ChunkType::Code;
    }

    if is_json(content) {
        return ChunkType::Json;
    }

    let non_empty: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let list_lines = non_empty
        .iter()
        .filter(|l| list_item_regex().is_match(l))
        .count();
    if !non_empty.is_empty() && list_lines * 2 > non_empty.len() {
        return ChunkType::List;
    }

    let line_count = content.split('\n').count();
    let table_lines = content.split('\n').filter(|l| l.contains('|')).count();
    if table_lines * 10 > line_count * 3 {
        return ChunkType::Table;
    }

    ChunkType::Text
}

fn is_json(content: &str) -> bool {
    let trimmed = content.trim();
    let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    bracketed && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

/// Checks for fenced or inline code.
#[must_use]
pub fn has_code(content: &str) -> bool {
    fence_regex().is_match(content) || inline_code_regex().is_match(content)
}

/// Checks for markdown emphasis, strikethrough or links.
#[must_use]
pub fn has_markdown(content: &str) -> bool {
    markdown_regexes().iter().any(|re| re.is_match(content))
}

/// Chooses the initial splitting strategy for a content type.
///
/// # Examples
///
/// ```
/// use chunk_relay::chunking::strategy_for;
/// use chunk_relay::core::{ChunkStrategy, ChunkType};
///
/// assert_eq!(strategy_for("a\n\nb", ChunkType::Text, true), ChunkStrategy::Paragraph);
/// assert_eq!(strategy_for("x", ChunkType::Code, false), ChunkStrategy::Line);
/// ```
#[must_use]
pub fn strategy_for(content: &str, content_type: ChunkType, preserve_code: bool) -> ChunkStrategy {
    match content_type {
        ChunkType::Code if preserve_code => ChunkStrategy::CodeBlock,
        ChunkType::Code | ChunkType::Json | ChunkType::List | ChunkType::Table => {
            ChunkStrategy::Line
        }
        ChunkType::Text | ChunkType::Mixed => {
            if content.contains("\n\n") {
                ChunkStrategy::Paragraph
            } else {
                ChunkStrategy::Sentence
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Here:\n```python\nprint(1)\n```\ndone", ChunkType::Code; "fenced code")]
    #[test_case("  {\"key\": [1, 2, 3]}  ", ChunkType::Json; "json object")]
    #[test_case("[1, 2, 3]", ChunkType::Json; "json array")]
    #[test_case("{not json}", ChunkType::Text; "braces but invalid json")]
    #[test_case("- a\n- b\n* c\nintro", ChunkType::List; "mostly bullets")]
    #[test_case("• one\n\n• two\n\n• three", ChunkType::List; "blank lines ignored")]
    #[test_case("- a\nb\nc\nd", ChunkType::Text; "few bullets")]
    #[test_case("| a | b |\n|---|---|\n| 1 | 2 |\nnote", ChunkType::Table; "table rows")]
    #[test_case("Plain prose. Nothing else!", ChunkType::Text; "prose")]
    #[test_case("", ChunkType::Text; "empty")]
    fn test_classify(content: &str, expected: ChunkType) {
        assert_eq!(classify(content), expected);
    }

    #[test]
    fn test_code_wins_over_json() {
        assert_eq!(classify("[\"```a```\"]"), ChunkType::Code);
    }

    #[test_case("text `code` here", true)]
    #[test_case("```\nblock\n```", true)]
    #[test_case("no code at all", false)]
    fn test_has_code(content: &str, expected: bool) {
        assert_eq!(has_code(content), expected);
    }

    #[test_case("**bold**", true)]
    #[test_case("*italic*", true)]
    #[test_case("__under__", true)]
    #[test_case("~~gone~~", true)]
    #[test_case("[link](https://example.com)", true)]
    #[test_case("plain", false)]
    fn test_has_markdown(content: &str, expected: bool) {
        assert_eq!(has_markdown(content), expected);
    }

    #[test_case("x", ChunkType::Code, true, ChunkStrategy::CodeBlock)]
    #[test_case("x", ChunkType::Code, false, ChunkStrategy::Line)]
    #[test_case("x", ChunkType::Json, true, ChunkStrategy::Line)]
    #[test_case("x", ChunkType::List, true, ChunkStrategy::Line)]
    #[test_case("x", ChunkType::Table, true, ChunkStrategy::Line)]
    #[test_case("a\n\nb", ChunkType::Text, true, ChunkStrategy::Paragraph)]
    #[test_case("a. b.", ChunkType::Text, true, ChunkStrategy::Sentence)]
    #[test_case("a\n\nb", ChunkType::Mixed, true, ChunkStrategy::Paragraph)]
    fn test_strategy_for(
        content: &str,
        content_type: ChunkType,
        preserve_code: bool,
        expected: ChunkStrategy,
    ) {
        assert_eq!(strategy_for(content, content_type, preserve_code), expected);
    }
}
