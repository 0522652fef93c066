//! # chunk-relay
//!
//! Formatting-aware message chunking and a rate-limited chat relay.
//!
//! Long messages are split into transport-sized chunks that keep fenced code
//! and inline markdown intact, then sent through a [`bridge::Transport`]
//! while replies are correlated back to the call and chunk they answer.
//!
//! ## Features
//!
//! - **Chunking**: boundary ladder from code block down to grapheme
//! - **Decoration**: navigation headers, continuation markers, summaries
//! - **Relay**: sliding-window rate limit, session expiry, reply routing
//! - **Unicode Aware**: lengths in chars, splits on grapheme boundaries

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bridge;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod io;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{Chunk, ChunkMetadata, ChunkStrategy, ChunkType, InboundReply, Session};

// Re-export chunking types
pub use chunking::{ChunkOptions, MessageChunker};

// Re-export bridge types
pub use bridge::{
    Bridge, BridgeEvent, BridgeState, BridgeStatus, InboundMessage, MemoryTransport,
    SlidingWindowLimiter, Transport,
};

// Re-export configuration
pub use config::{BridgeConfig, RateLimitConfig};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
