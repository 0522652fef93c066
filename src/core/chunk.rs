//! Chunk representation for chunk-relay.
//!
//! A chunk is one transport-sized piece of a larger logical message. Each
//! chunk keeps its byte range in the original text so the message can be
//! reassembled, and carries metadata describing how it was produced and
//! how it is decorated on the wire.

use crate::io::char_len;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Index reserved for the synthesized summary chunk.
pub const SUMMARY_INDEX: i64 = -1;

/// Separator placed between the decorations and the body when a chunk is
/// rendered.
pub const DECORATION_SEPARATOR: &str = "\n\n";

/// Detected content type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Contains at least one fenced code block.
    Code,
    /// Parses wholesale as a JSON object or array.
    Json,
    /// Mostly bullet-list lines.
    List,
    /// Mostly `|`-separated table rows.
    Table,
    /// Plain prose.
    Text,
    /// Mixed content (used for synthesized summaries).
    Mixed,
}

impl ChunkType {
    /// Returns the lowercase name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Json => "json",
            Self::List => "list",
            Self::Table => "table",
            Self::Text => "text",
            Self::Mixed => "mixed",
        }
    }

    /// Lists every content type name.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::Code,
            Self::Json,
            Self::List,
            Self::Table,
            Self::Text,
            Self::Mixed,
        ]
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown content type: {s}"))
    }
}

/// Splitting granularity, ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Alternating prose and fenced code blocks.
    CodeBlock,
    /// Blank-line separated paragraphs.
    Paragraph,
    /// Sentences ending in `.`, `!` or `?`.
    Sentence,
    /// Newline-terminated lines.
    Line,
    /// Whitespace-separated words.
    Word,
    /// Fixed windows of grapheme clusters. Always succeeds.
    Character,
}

impl ChunkStrategy {
    /// Returns the next finer strategy used when a single unit overflows.
    ///
    /// Returns `None` for [`ChunkStrategy::Character`], the base case.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunk_relay::core::ChunkStrategy;
    ///
    /// assert_eq!(ChunkStrategy::Paragraph.fallback(), Some(ChunkStrategy::Sentence));
    /// assert_eq!(ChunkStrategy::Character.fallback(), None);
    /// ```
    #[must_use]
    pub const fn fallback(self) -> Option<Self> {
        match self {
            Self::CodeBlock => Some(Self::Paragraph),
            Self::Paragraph => Some(Self::Sentence),
            Self::Sentence | Self::Line => Some(Self::Word),
            Self::Word => Some(Self::Character),
            Self::Character => None,
        }
    }

    /// Returns the snake-case name of the strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CodeBlock => "code_block",
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
            Self::Line => "line",
            Self::Word => "word",
            Self::Character => "character",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents one chunk of a logical message.
///
/// # Examples
///
/// ```
/// use chunk_relay::core::Chunk;
///
/// let chunk = Chunk::new("Hello, world!".to_string(), 0..13);
/// assert_eq!(chunk.len(), 13);
/// assert_eq!(chunk.render(), "Hello, world!");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sendable body, without navigation or continuation decoration.
    pub content: String,

    /// Byte range in the original message. Empty for a summary chunk.
    pub byte_range: Range<usize>,

    /// Position in the batch (0-based), or [`SUMMARY_INDEX`].
    pub index: i64,

    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Metadata associated with a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Number of chunks in the batch, summary included.
    pub total: usize,

    /// Detected type of the whole message.
    pub content_type: ChunkType,

    /// Strategy that produced this chunk (`None` for single or summary chunks).
    pub strategy: Option<ChunkStrategy>,

    /// Length of the whole original message in chars.
    pub original_length: usize,

    /// Length of this chunk's body in chars.
    pub chunk_length: usize,

    /// Whether the body contains fenced or inline code.
    pub has_code: bool,

    /// Whether the body contains markdown emphasis or links.
    pub has_markdown: bool,

    /// Continuation marker appended on the wire.
    pub continuation: Option<String>,

    /// Navigation header prepended on the wire.
    pub navigation: Option<String>,

    /// Part footer appended on the wire, after the continuation marker.
    #[serde(default)]
    pub footer: Option<String>,

    /// Short preview of the whole message (first chunk only).
    pub preview: Option<String>,

    /// Language tag of re-emitted fences, when the body was re-fenced.
    pub fence_language: Option<String>,
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            total: 1,
            content_type: ChunkType::Text,
            strategy: None,
            original_length: 0,
            chunk_length: 0,
            has_code: false,
            has_markdown: false,
            continuation: None,
            navigation: None,
            footer: None,
            preview: None,
            fence_language: None,
        }
    }
}

impl Chunk {
    /// Creates a new undecorated chunk at index 0.
    ///
    /// # Arguments
    ///
    /// * `content` - Chunk body.
    /// * `byte_range` - Byte range in the original message.
    #[must_use]
    pub fn new(content: String, byte_range: Range<usize>) -> Self {
        let chunk_length = char_len(&content);
        Self {
            content,
            byte_range,
            index: 0,
            metadata: ChunkMetadata {
                chunk_length,
                ..ChunkMetadata::default()
            },
        }
    }

    /// Creates a chunk tagged with the strategy that produced it.
    #[must_use]
    pub fn with_strategy(content: String, byte_range: Range<usize>, strategy: ChunkStrategy) -> Self {
        let mut chunk = Self::new(content, byte_range);
        chunk.metadata.strategy = Some(strategy);
        chunk
    }

    /// Returns the body length in chars.
    #[must_use]
    pub fn len(&self) -> usize {
        char_len(&self.content)
    }

    /// Checks if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns `true` for the synthesized summary chunk.
    #[must_use]
    pub const fn is_summary(&self) -> bool {
        self.index == SUMMARY_INDEX
    }

    /// Returns `true` if a continuation marker follows this chunk.
    #[must_use]
    pub const fn has_continuation(&self) -> bool {
        self.metadata.continuation.is_some()
    }

    /// Returns the slice of `original` this chunk was cut from.
    ///
    /// Returns `None` for the summary chunk or a range outside `original`.
    #[must_use]
    pub fn source_slice<'a>(&self, original: &'a str) -> Option<&'a str> {
        if self.is_summary() {
            return None;
        }
        original.get(self.byte_range.clone())
    }

    /// Renders the wire text: navigation header, body, continuation marker,
    /// part footer.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunk_relay::core::Chunk;
    ///
    /// let mut chunk = Chunk::new("body".to_string(), 0..4);
    /// chunk.metadata.navigation = Some("Part 1 of 2".to_string());
    /// chunk.metadata.continuation = Some("more...".to_string());
    /// assert_eq!(chunk.render(), "Part 1 of 2\n\nbody\n\nmore...");
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.content.len() + 96);
        if let Some(nav) = &self.metadata.navigation {
            out.push_str(nav);
            out.push_str(DECORATION_SEPARATOR);
        }
        out.push_str(&self.content);
        if let Some(cont) = &self.metadata.continuation {
            out.push_str(DECORATION_SEPARATOR);
            out.push_str(cont);
        }
        if let Some(footer) = &self.metadata.footer {
            out.push_str(DECORATION_SEPARATOR);
            out.push_str(footer);
        }
        out
    }

    /// Returns the rendered wire length in chars.
    #[must_use]
    pub fn rendered_len(&self) -> usize {
        char_len(&self.render())
    }
}

/// Concatenates the source slices of all non-summary chunks in index order.
///
/// For any batch produced by the chunker this returns `original` exactly.
#[must_use]
pub fn reassemble(original: &str, chunks: &[Chunk]) -> String {
    let mut parts: Vec<&Chunk> = chunks.iter().filter(|c| !c.is_summary()).collect();
    parts.sort_by_key(|c| c.index);
    parts
        .into_iter()
        .filter_map(|c| c.source_slice(original))
        .collect()
}
