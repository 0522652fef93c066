//! I/O utilities for chunk-relay.
//!
//! Provides input reading for the CLI along with the Unicode helpers the
//! chunker uses to measure and cut text.

pub mod reader;
pub mod unicode;

pub use reader::{read_file, read_input};
pub use unicode::{
    byte_offset_after_chars, char_len, collapse_whitespace, group_thousands, preview,
    truncate_chars,
};
