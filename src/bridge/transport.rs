//! Transport seam.
//!
//! [`Transport`] is the send/poll interface a chat backend implements.
//! [`MemoryTransport`] is an in-process implementation used by tests and
//! the `simulate` command.

use crate::error::TransportError;
use crate::io::char_len;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default transport message ceiling in chars.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4096;

/// A message received by polling the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport id of the message.
    pub message_id: i64,
    /// Sender identity.
    pub sender: i64,
    /// Chat identity.
    pub chat: i64,
    /// Message text.
    pub text: String,
    /// Transport id of the message this one replies to.
    pub reply_to: Option<i64>,
}

/// Outbound send and inbound poll primitives of a chat backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `text` to `chat` and returns the transport message id.
    async fn send(&self, chat: i64, text: &str) -> Result<i64, TransportError>;

    /// Fetches inbound messages, waiting up to `timeout` for new ones.
    async fn poll(&self, timeout: Duration) -> Result<Vec<InboundMessage>, TransportError>;

    /// Verifies reachability and returns a diagnostic message.
    async fn test_connection(&self) -> Result<String, TransportError>;

    /// Returns the largest message the transport accepts, in chars.
    fn max_message_length(&self) -> usize {
        DEFAULT_MAX_MESSAGE_LENGTH
    }
}

/// A message recorded by [`MemoryTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Assigned transport id.
    pub message_id: i64,
    /// Destination chat.
    pub chat: i64,
    /// Message text.
    pub text: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    sent: Vec<SentMessage>,
    inbound: VecDeque<InboundMessage>,
    fail_sends_after: Option<usize>,
    poll_failures: usize,
    reachable: bool,
    polls: usize,
}

/// In-memory transport with sequential ids and failure injection.
///
/// # Examples
///
/// ```
/// use chunk_relay::bridge::{MemoryTransport, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = MemoryTransport::new();
/// let id = transport.send(42, "hello").await.unwrap();
/// assert_eq!(transport.sent()[0].message_id, id);
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    max_message_length: usize,
    idle_poll_delay: Duration,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Creates a reachable transport with the default length ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_message_length(DEFAULT_MAX_MESSAGE_LENGTH)
    }

    /// Creates a reachable transport with a custom length ceiling.
    #[must_use]
    pub fn with_max_message_length(max_message_length: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                reachable: true,
                ..MemoryState::default()
            }),
            max_message_length,
            idle_poll_delay: Duration::from_millis(50),
        }
    }

    /// Queues a message for the next poll.
    pub fn push_inbound(&self, message: InboundMessage) {
        self.state.lock().inbound.push_back(message);
    }

    /// Queues a reply from `chat` to `reply_to`, assigning it a fresh id.
    pub fn push_reply(&self, chat: i64, text: &str, reply_to: Option<i64>) -> i64 {
        let mut state = self.state.lock();
        let message_id = state.next_id;
        state.next_id += 1;
        state.inbound.push_back(InboundMessage {
            message_id,
            sender: chat,
            chat,
            text: text.to_string(),
            reply_to,
        });
        message_id
    }

    /// Returns every message sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// Returns the number of polls served.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.state.lock().polls
    }

    /// Makes every send after the first `count` successful ones fail.
    pub fn fail_sends_after(&self, count: usize) {
        self.state.lock().fail_sends_after = Some(count);
    }

    /// Makes the next `count` polls fail.
    pub fn fail_next_polls(&self, count: usize) {
        self.state.lock().poll_failures = count;
    }

    /// Sets whether the connection check succeeds.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, chat: i64, text: &str) -> Result<i64, TransportError> {
        let len = char_len(text);
        if len > self.max_message_length {
            return Err(TransportError::MessageTooLong {
                len,
                max: self.max_message_length,
            });
        }

        let mut state = self.state.lock();
        if state
            .fail_sends_after
            .is_some_and(|limit| state.sent.len() >= limit)
        {
            return Err(TransportError::Rejected("injected send failure".to_string()));
        }
        let message_id = state.next_id;
        state.next_id += 1;
        state.sent.push(SentMessage {
            message_id,
            chat,
            text: text.to_string(),
        });
        Ok(message_id)
    }

    async fn poll(&self, timeout: Duration) -> Result<Vec<InboundMessage>, TransportError> {
        let batch: Result<Vec<InboundMessage>, TransportError> = {
            let mut state = self.state.lock();
            state.polls += 1;
            if state.poll_failures > 0 {
                state.poll_failures -= 1;
                Err(TransportError::Unreachable("injected poll failure".to_string()))
            } else {
                Ok(state.inbound.drain(..).collect())
            }
        };

        let batch = batch?;
        if batch.is_empty() {
            tokio::time::sleep(self.idle_poll_delay.min(timeout)).await;
        }
        Ok(batch)
    }

    async fn test_connection(&self) -> Result<String, TransportError> {
        if self.state.lock().reachable {
            Ok("memory transport ready".to_string())
        } else {
            Err(TransportError::Unreachable("memory transport offline".to_string()))
        }
    }

    fn max_message_length(&self) -> usize {
        self.max_message_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_assigns_sequential_ids() {
        let transport = MemoryTransport::new();
        let a = transport.send(1, "a").await.unwrap();
        let b = transport.send(1, "b").await.unwrap();
        assert_eq!(b, a + 1);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_send_rejects_overlong() {
        let transport = MemoryTransport::with_max_message_length(5);
        let err = transport.send(1, "too long").await.unwrap_err();
        assert_eq!(err, TransportError::MessageTooLong { len: 8, max: 5 });
    }

    #[tokio::test]
    async fn test_send_failure_injection() {
        let transport = MemoryTransport::new();
        transport.fail_sends_after(1);
        assert!(transport.send(1, "ok").await.is_ok());
        assert!(transport.send(1, "fails").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_drains_queue() {
        let transport = MemoryTransport::new();
        transport.push_reply(42, "hi", Some(3));
        let batch = transport.poll(Duration::from_secs(1)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].reply_to, Some(3));
        assert!(transport.poll(Duration::from_secs(1)).await.unwrap().is_empty());
        assert_eq!(transport.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_poll_failure_injection() {
        let transport = MemoryTransport::new();
        transport.fail_next_polls(1);
        assert!(transport.poll(Duration::ZERO).await.is_err());
        assert!(transport.poll(Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_check() {
        let transport = MemoryTransport::new();
        assert!(transport.test_connection().await.is_ok());
        transport.set_reachable(false);
        assert!(transport.test_connection().await.is_err());
    }
}
