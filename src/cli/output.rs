//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::bridge::{BridgeStatus, SentMessage};
use crate::config::BridgeConfig;
use crate::core::{Chunk, ChunkStrategy, ChunkType, InboundReply};
use crate::error::Error;
use crate::io::{char_len, collapse_whitespace, group_thousands, preview};
use serde::Serialize;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Result of classifying a message.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    /// Detected content type.
    pub content_type: ChunkType,
    /// Strategy the chunker would start with.
    pub strategy: ChunkStrategy,
    /// Length in chars.
    pub chars: usize,
    /// Whether the message contains code.
    pub has_code: bool,
    /// Whether the message contains inline markdown.
    pub has_markdown: bool,
}

/// Result of a simulated relay.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Messages the transport received, in send order.
    pub sent: Vec<SentMessage>,
    /// Replies stored on the session, in arrival order.
    pub replies: Vec<InboundReply>,
    /// Bridge status before shutdown.
    pub status: BridgeStatus,
}

/// Formats a chunk listing.
#[must_use]
pub fn format_chunks(chunks: &[Chunk], original: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_chunks_text(chunks, original),
        OutputFormat::Json => format_json(&chunks),
    }
}

fn format_chunks_text(chunks: &[Chunk], original: &str) -> String {
    if chunks.is_empty() {
        return "No chunks (empty input).\n".to_string();
    }

    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} chunk(s) from {} chars ({})",
        chunks.len(),
        group_thousands(char_len(original)),
        format_size(original.len())
    );
    let _ = writeln!(
        output,
        "{:<6} {:<7} {:<11} {:<7} {:<15} Preview",
        "Index", "Type", "Strategy", "Chars", "Bytes"
    );
    output.push_str(&"-".repeat(78));
    output.push('\n');

    for chunk in chunks {
        let strategy = chunk
            .metadata
            .strategy
            .map_or("-", ChunkStrategy::as_str);
        let bytes = if chunk.is_summary() {
            "-".to_string()
        } else {
            format!("{}..{}", chunk.byte_range.start, chunk.byte_range.end)
        };
        let _ = writeln!(
            output,
            "{:<6} {:<7} {:<11} {:<7} {:<15} {}",
            chunk.index,
            chunk.metadata.content_type.as_str(),
            strategy,
            chunk.rendered_len(),
            bytes,
            preview(&collapse_whitespace(&chunk.content), 30)
        );
    }
    output
}

/// Formats chunks as they would be sent.
#[must_use]
pub fn format_rendered(chunks: &[Chunk], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            for chunk in chunks {
                let _ = writeln!(
                    output,
                    "----- chunk {} ({} chars) -----",
                    chunk.index,
                    chunk.rendered_len()
                );
                output.push_str(&chunk.render());
                output.push('\n');
            }
            output
        }
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Rendered {
                index: i64,
                text: String,
            }
            let rendered: Vec<Rendered> = chunks
                .iter()
                .map(|c| Rendered {
                    index: c.index,
                    text: c.render(),
                })
                .collect();
            format_json(&rendered)
        }
    }
}

/// Formats a classification.
#[must_use]
pub fn format_classification(classification: &Classification, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Type:      {}", classification.content_type);
            let _ = writeln!(output, "Strategy:  {}", classification.strategy);
            let _ = writeln!(
                output,
                "Length:    {} chars",
                group_thousands(classification.chars)
            );
            let _ = writeln!(output, "Code:      {}", yes_no(classification.has_code));
            let _ = writeln!(output, "Markdown:  {}", yes_no(classification.has_markdown));
            output
        }
        OutputFormat::Json => format_json(classification),
    }
}

/// Formats the effective configuration.
#[must_use]
pub fn format_config(config: &BridgeConfig, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            output.push_str("chunk-relay configuration\n");
            output.push_str("=========================\n\n");
            let _ = writeln!(output, "  Max chunk size:     {}", config.max_chunk_size);
            let _ = writeln!(output, "  Preserve code:      {}", yes_no(config.preserve_code_blocks));
            let _ = writeln!(output, "  Preserve markdown:  {}", yes_no(config.preserve_markdown));
            let _ = writeln!(output, "  Navigation:         {}", yes_no(config.add_navigation));
            let _ = writeln!(output, "  Previews:           {}", yes_no(config.add_previews));
            let _ = writeln!(
                output,
                "  Session timeout:    {} min",
                config.session_timeout_minutes
            );
            let _ = writeln!(output, "  Max sessions:       {}", config.max_concurrent_sessions);
            let _ = writeln!(
                output,
                "  Rate limit:         {} per {}s",
                config.rate_limit.max_requests, config.rate_limit.window_seconds
            );
            let _ = writeln!(output, "  Inter-chunk delay:  {} ms", config.inter_chunk_delay_ms);
            let _ = writeln!(output, "  Summary threshold:  {}", config.summary_threshold);
            let _ = writeln!(
                output,
                "  Transport limit:    {}",
                config.transport_max_message_length
            );
            output
        }
        OutputFormat::Json => format_json(config),
    }
}

/// Formats a simulation report.
#[must_use]
pub fn format_simulation(report: &SimulationReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let status = &report.status;
            let _ = writeln!(output, "Sent {} message(s)", report.sent.len());
            for message in &report.sent {
                let _ = writeln!(
                    output,
                    "  #{:<5} {} chars",
                    message.message_id,
                    char_len(&message.text)
                );
            }
            let _ = writeln!(output, "Received {} reply(ies)", report.replies.len());
            for reply in &report.replies {
                let target = match (&reply.call_id, reply.chunk_index) {
                    (Some(call), Some(index)) => format!("{call} chunk {index}"),
                    _ => "unthreaded".to_string(),
                };
                let _ = writeln!(output, "  #{:<5} -> {target}: {}", reply.message_id, reply.text);
            }
            let _ = writeln!(output, "Status:");
            let _ = writeln!(output, "  State:          {}", status.state);
            let _ = writeln!(output, "  Sessions:       {}", status.active_sessions);
            let _ = writeln!(output, "  Correlations:   {}", status.correlations);
            let _ = writeln!(output, "  Pending:        {}", status.pending_replies);
            output
        }
        OutputFormat::Json => format_json(report),
    }
}

/// Formats an error for display.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => format_json(&serde_json::json!({ "error": error.to_string() })),
    }
}

/// Formats a value as pretty JSON.
fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    json.push('\n');
    json
}

/// Formats a byte size as human-readable.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkOptions, MessageChunker};

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("unknown"), OutputFormat::Text);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(100), "100 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_format_chunks_text() {
        let text = "Some words in a row. ".repeat(30);
        let chunker = MessageChunker::new(ChunkOptions::new().max_chunk_size(150)).unwrap();
        let chunks = chunker.chunk_message(&text).unwrap();

        let listing = format_chunks(&chunks, &text, OutputFormat::Text);
        assert!(listing.starts_with(&format!("{} chunk(s) from 630 chars", chunks.len())));
        assert!(listing.contains("Index"));
    }

    #[test]
    fn test_format_chunks_empty() {
        assert_eq!(
            format_chunks(&[], "", OutputFormat::Text),
            "No chunks (empty input).\n"
        );
    }

    #[test]
    fn test_format_rendered_json() {
        let chunk = Chunk::new("hello".to_string(), 0..5);
        let json = format_rendered(&[chunk], OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["text"], "hello");
        assert_eq!(value[0]["index"], 0);
    }

    #[test]
    fn test_format_config_json_roundtrips() {
        let config = BridgeConfig::default();
        let json = format_config(&config, OutputFormat::Json);
        assert_eq!(BridgeConfig::from_json_str(&json).unwrap(), config);
        assert!(format_config(&config, OutputFormat::Text).contains("30 per 60s"));
    }

    #[test]
    fn test_format_error_json() {
        let err = Error::config("bad");
        let json = format_error(&err, OutputFormat::Json);
        assert!(json.contains("\"error\": \"configuration error: bad\""));
    }
}
