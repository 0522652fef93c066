//! Bridge configuration.
//!
//! [`BridgeConfig`] is a plain `serde` struct. Missing fields take their
//! defaults, so a partial JSON document is a valid configuration.

use crate::chunking::ChunkOptions;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Chars the chunk budget must stay below the transport ceiling.
pub const TRANSPORT_SAFETY_MARGIN: usize = 96;

/// Sliding-window rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sends admitted per window.
    pub max_requests: usize,
    /// Window length in seconds.
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_seconds: 60,
        }
    }
}

impl RateLimitConfig {
    /// Returns the window as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Configuration of the chunker and the bridge.
///
/// # Examples
///
/// ```
/// use chunk_relay::config::BridgeConfig;
///
/// let config = BridgeConfig::from_json_str(r#"{"max_chunk_size": 2000}"#).unwrap();
/// assert_eq!(config.max_chunk_size, 2000);
/// assert_eq!(config.max_concurrent_sessions, 10);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum decorated chunk size in chars.
    pub max_chunk_size: usize,
    /// Keep fenced code blocks intact.
    pub preserve_code_blocks: bool,
    /// Keep inline markdown spans intact.
    pub preserve_markdown: bool,
    /// Add "Part i of N" headers.
    pub add_navigation: bool,
    /// Attach a preview to the first chunk.
    pub add_previews: bool,
    /// Inactivity timeout after which a session is swept.
    pub session_timeout_minutes: u64,
    /// Maximum number of live sessions.
    pub max_concurrent_sessions: usize,
    /// Outbound rate limit.
    pub rate_limit: RateLimitConfig,
    /// Pause between consecutive chunks of one message.
    pub inter_chunk_delay_ms: u64,
    /// Batches with more chunks than this get a summary chunk.
    pub summary_threshold: usize,
    /// Per-poll network timeout.
    pub poll_timeout_secs: u64,
    /// Pause between polls.
    pub poll_interval_ms: u64,
    /// Multiplier applied to the poll interval after a failed poll.
    pub poll_error_backoff_factor: u32,
    /// Interval of the expired-session sweep.
    pub cleanup_interval_secs: u64,
    /// Largest message the transport accepts, in chars.
    pub transport_max_message_length: usize,
    /// Capacity of the correlation map.
    pub max_correlations: usize,
    /// Post a notice to the chat when a session starts or ends while the
    /// bridge is connected.
    pub session_notifications: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 3800,
            preserve_code_blocks: true,
            preserve_markdown: true,
            add_navigation: true,
            add_previews: true,
            session_timeout_minutes: 30,
            max_concurrent_sessions: 10,
            rate_limit: RateLimitConfig::default(),
            inter_chunk_delay_ms: 500,
            summary_threshold: 3,
            poll_timeout_secs: 10,
            poll_interval_ms: 1000,
            poll_error_backoff_factor: 5,
            cleanup_interval_secs: 300,
            transport_max_message_length: 4096,
            max_correlations: 10_000,
            session_notifications: true,
        }
    }
}

impl BridgeConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = crate::io::read_file(path)?;
        Self::from_json_str(&content)
    }

    /// Serializes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the chunker options derived from this configuration.
    #[must_use]
    pub const fn chunk_options(&self) -> ChunkOptions {
        ChunkOptions::new()
            .max_chunk_size(self.max_chunk_size)
            .preserve_code_blocks(self.preserve_code_blocks)
            .preserve_markdown(self.preserve_markdown)
            .add_navigation(self.add_navigation)
            .add_previews(self.add_previews)
    }

    /// Returns the session inactivity timeout.
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes.saturating_mul(60))
    }

    /// Returns the pause between consecutive chunks.
    #[must_use]
    pub const fn inter_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_delay_ms)
    }

    /// Returns the per-poll timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Returns the pause between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the pause after a failed poll. Saturates instead of
    /// overflowing.
    #[must_use]
    pub fn poll_error_backoff(&self) -> Duration {
        self.poll_interval()
            .saturating_mul(self.poll_error_backoff_factor.max(1))
    }

    /// Returns the interval of the expired-session sweep.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk size cannot hold decoration, exceeds the
    /// transport ceiling minus [`TRANSPORT_SAFETY_MARGIN`], if the session
    /// timeout does not fit a [`Duration`] in seconds, or if the rate limit,
    /// session cap, or correlation capacity is zero.
    pub fn validate(&self) -> Result<()> {
        self.chunk_options().validate()?;

        let ceiling = self
            .transport_max_message_length
            .saturating_sub(TRANSPORT_SAFETY_MARGIN);
        if self.max_chunk_size > ceiling {
            return Err(Error::config(format!(
                "max_chunk_size {} exceeds transport limit {} minus safety margin {}",
                self.max_chunk_size, self.transport_max_message_length, TRANSPORT_SAFETY_MARGIN
            )));
        }
        if self.session_timeout_minutes.checked_mul(60).is_none() {
            return Err(Error::config(format!(
                "session_timeout_minutes {} is too large",
                self.session_timeout_minutes
            )));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_seconds == 0 {
            return Err(Error::config("rate limit requests and window must be > 0"));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(Error::config("max_concurrent_sessions must be > 0"));
        }
        if self.max_correlations == 0 {
            return Err(Error::config("max_correlations must be > 0"));
        }
        Ok(())
    }
}
