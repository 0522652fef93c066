//! Formatting-aware message chunking.
//!
//! [`MessageChunker`] turns a logical message into transport-sized chunks:
//!
//! - **Classify**: detect code, JSON, list, table or text content
//! - **Split**: greedy packing along the boundary ladder (code block,
//!   paragraph, sentence, line, word, character), escalating oversized units
//! - **Annotate**: indices, navigation headers, continuation markers, previews
//! - **Summarize**: an optional leading summary chunk for long batches
//!
//! Concatenating the source slices of all non-summary chunks reproduces the
//! input exactly, and every rendered chunk fits `max_chunk_size`.

pub mod annotate;
pub mod boundary;
pub mod classify;
pub mod options;
pub mod splitter;

pub use annotate::{
    CONTINUATION_MARKER, SUMMARY_HEADER, annotate, navigation_footer, navigation_header,
    summary_chunk,
};
pub use classify::{classify, has_code, has_markdown, strategy_for};
pub use options::{ChunkOptions, DEFAULT_MAX_CHUNK_SIZE, MAX_PARTS, MIN_BODY_BUDGET};
pub use splitter::{Piece, Splitter};

use crate::core::{Chunk, ChunkStrategy, ChunkType};
use crate::error::Result;
use crate::io::char_len;
use tracing::debug;

/// Splits and decorates messages according to [`ChunkOptions`].
///
/// # Examples
///
/// ```
/// use chunk_relay::chunking::{ChunkOptions, MessageChunker};
///
/// let chunker = MessageChunker::new(ChunkOptions::new().max_chunk_size(200)).unwrap();
/// let text = "A sentence that repeats. ".repeat(40);
/// let chunks = chunker.chunk_message(&text).unwrap();
///
/// assert!(chunks.len() > 1);
/// assert!(chunks.iter().all(|c| c.rendered_len() <= 200));
/// let rebuilt: String = chunks.iter().map(|c| &text[c.byte_range.clone()]).collect();
/// assert_eq!(rebuilt, text);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageChunker {
    options: ChunkOptions,
}

impl MessageChunker {
    /// Creates a chunker after validating `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_chunk_size` cannot hold decoration plus a
    /// minimal body.
    pub fn new(options: ChunkOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Returns the options in use.
    #[must_use]
    pub const fn options(&self) -> &ChunkOptions {
        &self.options
    }

    /// Chunks a message, detecting its content type.
    ///
    /// Returns an empty list for empty input, and a single undecorated chunk
    /// when the message already fits `max_chunk_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch would exceed [`MAX_PARTS`] chunks.
    pub fn chunk_message(&self, content: &str) -> Result<Vec<Chunk>> {
        self.chunk_with_type(content, None)
    }

    /// Chunks a message, using `content_type` instead of detection when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch would exceed [`MAX_PARTS`] chunks.
    pub fn chunk_with_type(
        &self,
        content: &str,
        content_type: Option<ChunkType>,
    ) -> Result<Vec<Chunk>> {
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let content_type = content_type.unwrap_or_else(|| classify(content));
        let length = char_len(content);

        if length <= self.options.max_chunk_size {
            let whole = Chunk::new(content.to_string(), 0..content.len());
            let mut chunk = build_chunk(whole, content_type);
            chunk.metadata.original_length = length;
            return Ok(vec![chunk]);
        }

        let strategy = self.initial_strategy(content, content_type);
        let pieces = Splitter::new(
            content,
            self.options.body_budget(),
            self.options.preserve_code_blocks,
            self.options.preserve_markdown,
        )
        .split(strategy);

        let mut chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|piece| {
                let body = piece.body(content).to_string();
                let mut chunk =
                    build_chunk(Chunk::with_strategy(body, piece.range, piece.strategy), content_type);
                chunk.metadata.fence_language = piece.fence_language;
                chunk
            })
            .collect();

        annotate(&mut chunks, content, &self.options)?;

        debug!(
            length,
            %content_type,
            %strategy,
            chunks = chunks.len(),
            "chunked message"
        );
        Ok(chunks)
    }

    /// Chunks a message under a bold title line.
    ///
    /// Byte ranges refer to the text produced by [`compose_titled`].
    ///
    /// # Errors
    ///
    /// Returns an error if the batch would exceed [`MAX_PARTS`] chunks.
    pub fn chunk_titled(&self, content: &str, title: &str) -> Result<Vec<Chunk>> {
        self.chunk_message(&compose_titled(title, content))
    }

    /// Chunks code output, fencing it with `language` unless already fenced.
    ///
    /// Byte ranges refer to the text produced by [`compose_code`].
    ///
    /// # Errors
    ///
    /// Returns an error if the batch would exceed [`MAX_PARTS`] chunks.
    pub fn chunk_code(&self, code: &str, language: &str, title: Option<&str>) -> Result<Vec<Chunk>> {
        self.chunk_with_type(&compose_code(code, language, title), Some(ChunkType::Code))
    }

    /// Chunks structured data as pretty-printed JSON in a `json` fence.
    ///
    /// Byte ranges refer to the text produced by [`compose_json`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the batch would exceed
    /// [`MAX_PARTS`] chunks.
    pub fn chunk_json(&self, value: &serde_json::Value, title: Option<&str>) -> Result<Vec<Chunk>> {
        let text = compose_json(value, title)?;
        self.chunk_with_type(&text, Some(ChunkType::Json))
    }

    /// Chunks a structured tool response.
    ///
    /// The body comes from `content`, `message` or `result`, the title from
    /// `title`, `name`, `tool` or `command`, and the content type from the
    /// response's keys. With `include_metadata`, the remaining fields are
    /// listed under a metadata section. Byte ranges refer to the text
    /// produced by [`compose_response`] under that title.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the batch would exceed
    /// [`MAX_PARTS`] chunks.
    pub fn chunk_response(
        &self,
        response: &serde_json::Value,
        include_metadata: bool,
    ) -> Result<Vec<Chunk>> {
        let body = compose_response(response, include_metadata)?;
        let text = match response_title(response) {
            Some(title) => compose_titled(&title, &body),
            None => body,
        };
        self.chunk_with_type(&text, Some(response_type(response)))
    }

    /// Builds the summary chunk for an annotated batch of `original`.
    #[must_use]
    pub fn summary_chunk(&self, chunks: &[Chunk], original: &str) -> Chunk {
        summary_chunk(chunks, original, self.options.max_chunk_size)
    }

    /// Prepends a summary chunk when the batch has more than `threshold` chunks.
    #[must_use]
    pub fn with_summary(&self, chunks: Vec<Chunk>, original: &str, threshold: usize) -> Vec<Chunk> {
        if chunks.len() <= threshold {
            return chunks;
        }
        let mut out = Vec::with_capacity(chunks.len() + 1);
        out.push(self.summary_chunk(&chunks, original));
        out.extend(chunks);
        out
    }

    /// Fenced content keeps its fences intact even under a hinted type that
    /// would otherwise split by line.
    fn initial_strategy(&self, content: &str, content_type: ChunkType) -> ChunkStrategy {
        if self.options.preserve_code_blocks && classify::fence_regex().is_match(content) {
            return ChunkStrategy::CodeBlock;
        }
        strategy_for(content, content_type, self.options.preserve_code_blocks)
    }
}

fn build_chunk(mut chunk: Chunk, content_type: ChunkType) -> Chunk {
    chunk.metadata.content_type = content_type;
    chunk.metadata.has_code = has_code(&chunk.content);
    chunk.metadata.has_markdown = has_markdown(&chunk.content);
    chunk
}

/// Prefixes `content` with a bold title line.
#[must_use]
pub fn compose_titled(title: &str, content: &str) -> String {
    format!("**{title}**\n\n{content}")
}

/// Wraps unfenced `code` in a fence tagged with `language`, under an
/// optional title.
#[must_use]
pub fn compose_code(code: &str, language: &str, title: Option<&str>) -> String {
    let body = if code.contains("```") {
        code.to_string()
    } else {
        format!("```{language}\n{}\n```", code.trim_end_matches('\n'))
    };
    match title {
        Some(title) => compose_titled(title, &body),
        None => body,
    }
}

/// Pretty-prints `value` into a `json` fence under an optional title.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn compose_json(value: &serde_json::Value, title: Option<&str>) -> Result<String> {
    let pretty = serde_json::to_string_pretty(value)?;
    Ok(compose_code(&pretty, "json", title))
}

const RESPONSE_BODY_KEYS: [&str; 3] = ["content", "message", "result"];

/// Lays out a structured response: the body, then optionally a metadata
/// section with every other field.
///
/// Non-object responses are rendered whole.
///
/// # Errors
///
/// Returns an error if a value cannot be serialized.
pub fn compose_response(response: &serde_json::Value, include_metadata: bool) -> Result<String> {
    let Some(fields) = response.as_object() else {
        return display_value(response, true);
    };

    let mut lines = Vec::new();
    if let Some(body) = RESPONSE_BODY_KEYS.iter().find_map(|k| fields.get(*k)) {
        lines.push(display_value(body, true)?);
    }

    if include_metadata {
        let mut items = Vec::new();
        for (key, value) in fields {
            if !RESPONSE_BODY_KEYS.contains(&key.as_str()) {
                items.push(format!("**{key}:** {}", display_value(value, false)?));
            }
        }
        if !items.is_empty() {
            lines.extend([String::new(), "---".to_string(), "**Metadata:**".to_string()]);
            lines.extend(items);
        }
    }
    Ok(lines.join("\n"))
}

/// Strings are shown bare, containers as JSON.
fn display_value(value: &serde_json::Value, pretty: bool) -> Result<String> {
    Ok(match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) if pretty => {
            serde_json::to_string_pretty(value)?
        }
        other => serde_json::to_string(other)?,
    })
}

/// Returns the title of a structured response, if it names one.
#[must_use]
pub fn response_title(response: &serde_json::Value) -> Option<String> {
    let fields = response.as_object()?;
    ["title", "name", "tool", "command"]
        .iter()
        .find_map(|k| fields.get(*k))
        .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
}

/// Picks the content type of a structured response from its keys.
///
/// # Examples
///
/// ```
/// use chunk_relay::chunking::response_type;
/// use chunk_relay::core::ChunkType;
/// use serde_json::json;
///
/// assert_eq!(response_type(&json!({"script": "ls"})), ChunkType::Code);
/// assert_eq!(response_type(&json!({"result": {"ok": true}})), ChunkType::Json);
/// assert_eq!(response_type(&json!({"files": ["a", "b"]})), ChunkType::List);
/// assert_eq!(response_type(&json!({"message": "done"})), ChunkType::Mixed);
/// ```
#[must_use]
pub fn response_type(response: &serde_json::Value) -> ChunkType {
    let Some(fields) = response.as_object() else {
        return ChunkType::Mixed;
    };
    let has_any = |keys: &[&str]| keys.iter().any(|k| fields.contains_key(*k));
    if has_any(&["code", "script", "command"]) {
        ChunkType::Code
    } else if has_any(&["data", "result", "response_data"]) {
        ChunkType::Json
    } else if fields.values().any(serde_json::Value::is_array) {
        ChunkType::List
    } else {
        ChunkType::Mixed
    }
}
