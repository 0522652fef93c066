//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chunk-relay: formatting-aware chunking and chat relay.
///
/// Splits long messages into transport-sized chunks and simulates the
/// rate-limited relay that sends them.
#[derive(Parser, Debug)]
#[command(name = "chunk-relay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a JSON configuration file.
    ///
    /// Missing fields take their defaults.
    #[arg(short, long, env = "CHUNK_RELAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a message into chunks.
    Chunk {
        /// Input file, or `-` for stdin.
        file: PathBuf,

        /// Maximum decorated chunk size in chars.
        #[arg(short, long)]
        max_size: Option<usize>,

        /// Title prepended to the message.
        #[arg(short, long)]
        title: Option<String>,

        /// Allow fenced code blocks to be split like text.
        #[arg(long)]
        no_preserve_code: bool,

        /// Allow inline markdown spans to be split.
        #[arg(long)]
        no_preserve_markdown: bool,

        /// Omit "Part i of N" headers.
        #[arg(long)]
        no_navigation: bool,

        /// Prepend a summary chunk to long batches.
        #[arg(short, long)]
        summary: bool,

        /// Print the rendered chunks instead of a listing.
        #[arg(short, long)]
        render: bool,
    },

    /// Detect the content type of a message.
    Classify {
        /// Input file, or `-` for stdin.
        file: PathBuf,
    },

    /// Validate and print the effective configuration.
    Config,

    /// Relay a message over an in-memory transport and answer every chunk.
    Simulate {
        /// Input file, or `-` for stdin.
        file: PathBuf,

        /// Session id.
        #[arg(long, default_value = "sim")]
        session: String,

        /// Chat identity the session is bound to.
        #[arg(long, default_value = "1")]
        identity: i64,

        /// Logical call id.
        #[arg(long, default_value = "call-1")]
        call: String,

        /// Text of the simulated replies.
        #[arg(long, default_value = "ack")]
        reply: String,

        /// Skip inter-chunk pacing and poll quickly.
        #[arg(long)]
        fast: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_chunk_flags() {
        let cli = Cli::try_parse_from([
            "chunk-relay",
            "chunk",
            "notes.md",
            "--max-size",
            "500",
            "--no-navigation",
            "--summary",
        ])
        .unwrap();
        match cli.command {
            Commands::Chunk {
                max_size,
                no_navigation,
                summary,
                render,
                ..
            } => {
                assert_eq!(max_size, Some(500));
                assert!(no_navigation);
                assert!(summary);
                assert!(!render);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["chunk-relay", "config", "--format", "json"]).unwrap();
        assert_eq!(cli.format, "json");
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_simulate_defaults() {
        let cli = Cli::try_parse_from(["chunk-relay", "simulate", "-"]).unwrap();
        let Commands::Simulate {
            session,
            identity,
            call,
            fast,
            ..
        } = cli.command
        else {
            unreachable!()
        };
        assert_eq!(session, "sim");
        assert_eq!(identity, 1);
        assert_eq!(call, "call-1");
        assert!(!fast);
    }
}
