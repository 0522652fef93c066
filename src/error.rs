//! Error types for chunk-relay operations.
//!
//! This module provides the error hierarchy using `thiserror` for chunking,
//! transport, configuration, I/O, and CLI failures. Expected bridge outcomes
//! (unknown sessions, full session table, rate-limit backpressure) are not
//! errors and are reported through `bool` / `Option` results instead.

use thiserror::Error;

/// Result type alias for chunk-relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking-related errors (text processing).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// Transport errors (send, poll, connection check).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Builds a configuration error from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Chunking-specific errors for text processing.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Chunk budget too small to hold decoration plus content.
    #[error("chunk size {size} is below the minimum {min}")]
    ChunkTooSmall {
        /// Requested chunk size.
        size: usize,
        /// Minimum usable chunk size.
        min: usize,
    },

    /// Splitting produced more parts than navigation headers can number.
    #[error("content splits into {count} parts, more than the maximum {max}")]
    TooManyChunks {
        /// Number of parts produced.
        count: usize,
        /// Maximum number of parts.
        max: usize,
    },
}

/// Errors reported by a [`crate::bridge::Transport`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be reached.
    #[error("transport unreachable: {0}")]
    Unreachable(String),

    /// The remote API rejected the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The message exceeded the transport's length ceiling.
    #[error("message of {len} chars exceeds transport limit {max}")]
    MessageTooLong {
        /// Message length in chars.
        len: usize,
        /// Transport ceiling in chars.
        max: usize,
    },
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),
}

// Implement From traits for standard library and dependency errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
