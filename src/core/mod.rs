//! Core domain models for chunk-relay.
//!
//! This module contains the data structures shared by the chunker and the
//! bridge: chunks and relay sessions. These are pure domain models with no
//! I/O dependencies.

pub mod chunk;
pub mod session;

pub use chunk::{
    Chunk, ChunkMetadata, ChunkStrategy, ChunkType, DECORATION_SEPARATOR, SUMMARY_INDEX,
    reassemble,
};
pub use session::{ContextMap, InboundReply, Session, SessionState};
