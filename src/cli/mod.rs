//! CLI layer for chunk-relay.
//!
//! Provides the command-line interface using clap, with commands for
//! chunking and classifying messages, inspecting the configuration, and
//! simulating a relay over an in-memory transport.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::{execute, load_config};
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
