//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use crate::bridge::{Bridge, BridgeEvent, MemoryTransport};
use crate::chunking::{MessageChunker, classify, compose_titled, has_code, has_markdown, strategy_for};
use crate::cli::output::{
    Classification, OutputFormat, SimulationReport, format_chunks, format_classification,
    format_config, format_rendered, format_simulation,
};
use crate::cli::parser::{Cli, Commands};
use crate::config::BridgeConfig;
use crate::core::ContextMap;
use crate::error::{CommandError, Result};
use crate::io::{char_len, read_input};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

/// Poll interval used by `simulate --fast`.
const FAST_POLL_INTERVAL_MS: u64 = 10;

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the input cannot be
/// read, or the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Chunk {
            file,
            max_size,
            title,
            no_preserve_code,
            no_preserve_markdown,
            no_navigation,
            summary,
            render,
        } => {
            let mut config = config;
            if let Some(size) = max_size {
                config.max_chunk_size = *size;
            }
            config.preserve_code_blocks &= !no_preserve_code;
            config.preserve_markdown &= !no_preserve_markdown;
            config.add_navigation &= !no_navigation;
            let options = ChunkRun {
                title: title.as_deref(),
                summary: *summary,
                render: *render,
            };
            cmd_chunk(&config, file, &options, format)
        }
        Commands::Classify { file } => cmd_classify(&config, file, format),
        Commands::Config => Ok(format_config(&config, format)),
        Commands::Simulate {
            file,
            session,
            identity,
            call,
            reply,
            fast,
        } => {
            let mut config = config;
            if *fast {
                config.inter_chunk_delay_ms = 0;
                config.poll_interval_ms = FAST_POLL_INTERVAL_MS;
            }
            let run = SimulationRun {
                session,
                identity: *identity,
                call,
                reply,
            };
            cmd_simulate(config, file, &run, format)
        }
    }
}

/// Loads the configuration file, or the defaults when none is given.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            BridgeConfig::from_file(path)?
        }
        None => BridgeConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

struct ChunkRun<'a> {
    title: Option<&'a str>,
    summary: bool,
    render: bool,
}

fn cmd_chunk(
    config: &BridgeConfig,
    file: &Path,
    run: &ChunkRun<'_>,
    format: OutputFormat,
) -> Result<String> {
    let content = read_input(file)?;
    let message = match run.title {
        Some(title) => compose_titled(title, &content),
        None => content,
    };

    let chunker = MessageChunker::new(config.chunk_options())?;
    let mut chunks = chunker.chunk_message(&message)?;
    if run.summary {
        chunks = chunker.with_summary(chunks, &message, config.summary_threshold);
    }
    info!(chars = char_len(&message), chunks = chunks.len(), "message chunked");

    if run.render {
        Ok(format_rendered(&chunks, format))
    } else {
        Ok(format_chunks(&chunks, &message, format))
    }
}

fn cmd_classify(config: &BridgeConfig, file: &Path, format: OutputFormat) -> Result<String> {
    let content = read_input(file)?;
    let content_type = classify(&content);
    let classification = Classification {
        content_type,
        strategy: strategy_for(&content, content_type, config.preserve_code_blocks),
        chars: char_len(&content),
        has_code: has_code(&content),
        has_markdown: has_markdown(&content),
    };
    Ok(format_classification(&classification, format))
}

struct SimulationRun<'a> {
    session: &'a str,
    identity: i64,
    call: &'a str,
    reply: &'a str,
}

fn cmd_simulate(
    config: BridgeConfig,
    file: &Path,
    run: &SimulationRun<'_>,
    format: OutputFormat,
) -> Result<String> {
    let content = read_input(file)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let report = runtime.block_on(simulate(config, &content, run))?;
    Ok(format_simulation(&report, format))
}

async fn simulate(
    config: BridgeConfig,
    content: &str,
    run: &SimulationRun<'_>,
) -> Result<SimulationReport> {
    let deadline = config.poll_timeout() + config.poll_interval() * 2 + Duration::from_secs(1);
    let transport = Arc::new(MemoryTransport::with_max_message_length(
        config.transport_max_message_length,
    ));
    let bridge = Bridge::new(config, transport.clone())?;
    let mut events = bridge.subscribe();

    if !bridge.start().await {
        return Err(CommandError::ExecutionFailed("bridge failed to start".to_string()).into());
    }
    if !bridge.create_session(run.session, run.identity, None, ContextMap::new()).await {
        bridge.stop().await;
        return Err(CommandError::ExecutionFailed(format!(
            "could not create session {}",
            run.session
        ))
        .into());
    }

    let Some(message_ids) = bridge.send_message(run.session, run.call, content, None).await else {
        bridge.stop().await;
        return Err(CommandError::ExecutionFailed("nothing was sent".to_string()).into());
    };
    for (position, id) in message_ids.iter().enumerate() {
        transport.push_reply(run.identity, &format!("{} {position}", run.reply), Some(*id));
    }

    let mut replies = Vec::with_capacity(message_ids.len());
    let collect = async {
        while replies.len() < message_ids.len() {
            match events.recv().await {
                Ok(BridgeEvent::ReplyReceived { reply, .. }) => replies.push(reply),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    };
    if tokio::time::timeout(deadline, collect).await.is_err() {
        debug!(received = replies.len(), expected = message_ids.len(), "reply wait timed out");
    }

    let status = bridge.get_status();
    bridge.stop().await;
    Ok(SimulationReport {
        sent: transport.sent(),
        replies,
        status,
    })
}
