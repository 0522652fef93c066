//! Bridge orchestrator.
//!
//! [`Bridge`] wires the chunker, the rate limiter, the session registry and
//! the correlator to a [`Transport`]. `start` spawns a poll loop and a
//! cleanup loop; both exit when `stop` cancels their token.

use super::correlator::{ChunkRef, MessageCorrelator};
use super::rate_limit::SlidingWindowLimiter;
use super::registry::SessionRegistry;
use super::transport::{InboundMessage, Transport};
use crate::chunking::MessageChunker;
use crate::config::{BridgeConfig, TRANSPORT_SAFETY_MARGIN};
use crate::core::{ContextMap, InboundReply, Session};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the event channel. Slow subscribers lag instead of blocking.
const EVENT_CAPACITY: usize = 256;

/// How long `stop` waits for a background loop to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Connection state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    /// Not started, or stopped.
    Disconnected,
    /// Connection check in progress.
    Connecting,
    /// Background loops running.
    Connected,
    /// Connection check failed. Cleared by the next successful `start`.
    Error,
}

impl BridgeState {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Ended by the caller.
    Ended,
    /// Swept after the inactivity timeout.
    Expired,
    /// Ended by `stop`.
    Stopped,
}

/// Lifecycle notifications published by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Background loops started.
    Started,
    /// Bridge stopped.
    Stopped,
    /// A session was created.
    SessionStarted {
        /// Session id.
        session_id: String,
        /// Transport identity the session is bound to.
        identity: i64,
    },
    /// A session left the registry.
    SessionEnded {
        /// Session id.
        session_id: String,
        /// Why it left.
        reason: EndReason,
    },
    /// Some or all chunks of a logical message were sent.
    MessageSent {
        /// Session id.
        session_id: String,
        /// Logical call id.
        call_id: String,
        /// Transport ids of the sent chunks, in send order.
        message_ids: Vec<i64>,
        /// Whether every chunk was sent.
        complete: bool,
        /// Caller-supplied metadata.
        metadata: Option<serde_json::Value>,
    },
    /// A reply was stored on a session.
    ReplyReceived {
        /// Session id.
        session_id: String,
        /// The stored reply.
        reply: InboundReply,
    },
}

/// Snapshot returned by [`Bridge::get_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Connection state.
    pub state: BridgeState,
    /// Whether the background loops are running.
    pub running: bool,
    /// Live sessions.
    pub active_sessions: usize,
    /// Correlation entries held.
    pub correlations: usize,
    /// Sessions holding an unread reply.
    pub pending_replies: usize,
    /// Inactivity timeout in minutes.
    pub session_timeout_minutes: u64,
    /// Session cap.
    pub max_sessions: usize,
}

#[derive(Debug)]
struct Runtime {
    state: BridgeState,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    config: BridgeConfig,
    chunker: MessageChunker,
    transport: Arc<dyn Transport>,
    registry: SessionRegistry,
    limiter: SlidingWindowLimiter,
    events: broadcast::Sender<BridgeEvent>,
    runtime: Mutex<Runtime>,
}

/// Relay between callers and a chat transport.
///
/// Cloning is cheap; clones share one bridge.
///
/// # Examples
///
/// ```
/// use chunk_relay::bridge::{Bridge, MemoryTransport};
/// use chunk_relay::config::BridgeConfig;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = Arc::new(MemoryTransport::new());
/// let bridge = Bridge::new(BridgeConfig::default(), transport.clone()).unwrap();
///
/// assert!(bridge.create_session("s1", 42, None, Default::default()).await);
/// let ids = bridge.send_message("s1", "call-1", "hello", None).await.unwrap();
/// assert_eq!(ids.len(), 1);
/// assert_eq!(transport.sent()[0].text, "hello");
/// # }
/// ```
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("sessions", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a bridge over `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the chunk size
    /// does not fit the transport's own ceiling minus the safety margin.
    pub fn new(config: BridgeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let ceiling = transport.max_message_length();
        if config.max_chunk_size + TRANSPORT_SAFETY_MARGIN > ceiling {
            return Err(Error::config(format!(
                "max_chunk_size {} does not fit transport ceiling {ceiling}",
                config.max_chunk_size
            )));
        }

        let chunker = MessageChunker::new(config.chunk_options())?;
        let correlator = Arc::new(MessageCorrelator::new(config.max_correlations));
        let registry = SessionRegistry::new(config.max_concurrent_sessions, correlator);
        let limiter =
            SlidingWindowLimiter::new(config.rate_limit.max_requests, config.rate_limit.window());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                chunker,
                transport,
                registry,
                limiter,
                events,
                runtime: Mutex::new(Runtime {
                    state: BridgeState::Disconnected,
                    cancel: None,
                    tasks: Vec::new(),
                }),
            }),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        self.inner.runtime.lock().state
    }

    /// Subscribes to bridge events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    /// Checks the transport and starts the poll and cleanup loops.
    ///
    /// Returns `false` if the bridge is already starting or running, or if
    /// the connection check fails. A failed check leaves the bridge in
    /// [`BridgeState::Error`] with no background tasks.
    pub async fn start(&self) -> bool {
        {
            let mut runtime = self.inner.runtime.lock();
            match runtime.state {
                BridgeState::Disconnected | BridgeState::Error => {
                    runtime.state = BridgeState::Connecting;
                }
                BridgeState::Connecting | BridgeState::Connected => {
                    debug!(state = %runtime.state, "start ignored");
                    return false;
                }
            }
        }

        match self.inner.transport.test_connection().await {
            Ok(diagnostic) => info!(%diagnostic, "transport reachable"),
            Err(e) => {
                error!(error = %e, "transport connection check failed");
                self.inner.runtime.lock().state = BridgeState::Error;
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let poll = tokio::spawn(poll_loop(Arc::clone(&self.inner), cancel.child_token()));
        let cleanup = tokio::spawn(cleanup_loop(Arc::clone(&self.inner), cancel.child_token()));
        {
            let mut runtime = self.inner.runtime.lock();
            runtime.state = BridgeState::Connected;
            runtime.cancel = Some(cancel);
            runtime.tasks = vec![poll, cleanup];
        }
        info!("bridge started");
        self.inner.emit(BridgeEvent::Started);
        true
    }

    /// Stops the background loops, ends every session and clears all
    /// correlation state.
    pub async fn stop(&self) {
        let (cancel, tasks) = {
            let mut runtime = self.inner.runtime.lock();
            (runtime.cancel.take(), std::mem::take(&mut runtime.tasks))
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("background loop did not exit in time");
            }
        }

        for session_id in self.inner.registry.end_all() {
            self.inner.emit(BridgeEvent::SessionEnded {
                session_id,
                reason: EndReason::Stopped,
            });
        }
        self.inner.registry.correlator().clear();
        self.inner.runtime.lock().state = BridgeState::Disconnected;
        info!("bridge stopped");
        self.inner.emit(BridgeEvent::Stopped);
    }

    /// Creates a session bound to transport identity `identity`.
    ///
    /// Returns `false` if the id is taken or the session cap is reached.
    /// While connected, a start notice is posted to the chat.
    pub async fn create_session(
        &self,
        session_id: &str,
        identity: i64,
        project: Option<String>,
        context: ContextMap,
    ) -> bool {
        let notice = started_notice(session_id, project.as_deref());
        let created = self
            .inner
            .registry
            .create(session_id, identity, project, context);
        if created {
            self.inner.emit(BridgeEvent::SessionStarted {
                session_id: session_id.to_string(),
                identity,
            });
            self.inner.notify(identity, &notice).await;
        }
        created
    }

    /// Creates a session under a generated id and returns the id.
    pub async fn create_session_generated(
        &self,
        identity: i64,
        project: Option<String>,
        context: ContextMap,
    ) -> Option<String> {
        let label = project.clone();
        let session_id = self
            .inner
            .registry
            .create_generated(identity, project, context)?;
        self.inner.emit(BridgeEvent::SessionStarted {
            session_id: session_id.clone(),
            identity,
        });
        let notice = started_notice(&session_id, label.as_deref());
        self.inner.notify(identity, &notice).await;
        Some(session_id)
    }

    /// Ends a session. Returns `false` if it does not exist.
    ///
    /// While connected, a completion notice is posted to the chat first.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let Some(session) = self.inner.registry.get(session_id) else {
            debug!(session_id, "end of unknown session");
            return false;
        };
        let notice = ended_notice(&session, EndReason::Ended);
        self.inner.notify(session.identity, &notice).await;

        let ended = self.inner.registry.end(session_id);
        if ended {
            self.inner.emit(BridgeEvent::SessionEnded {
                session_id: session_id.to_string(),
                reason: EndReason::Ended,
            });
        }
        ended
    }

    /// Chunks `content` and sends it to the session's identity.
    ///
    /// Each chunk waits for the rate limiter, is sent, and has its
    /// correlation recorded before the next one goes out. Sending stops at
    /// the first transport failure; chunks already sent stay sent.
    ///
    /// Returns the transport ids of the sent chunks, or `None` if the
    /// session is unknown, the content is empty, or the first send fails.
    pub async fn send_message(
        &self,
        session_id: &str,
        call_id: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Option<Vec<i64>> {
        let inner = &self.inner;
        let Some(chat) = inner.registry.identity_of(session_id) else {
            warn!(session_id, "send to unknown session");
            return None;
        };

        let chunks = match inner.chunker.chunk_message(content) {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(session_id, call_id, error = %e, "chunking failed");
                return None;
            }
        };
        let chunks = inner
            .chunker
            .with_summary(chunks, content, inner.config.summary_threshold);
        let total = chunks.len();
        let delay = inner.config.inter_chunk_delay();

        let mut message_ids = Vec::with_capacity(total);
        for (position, chunk) in chunks.iter().enumerate() {
            inner.limiter.acquire_wait().await;
            let message_id = match inner.transport.send(chat, &chunk.render()).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(session_id, call_id, position, total, error = %e, "send failed");
                    break;
                }
            };
            message_ids.push(message_id);
            if !inner
                .registry
                .record_sent(session_id, message_id, ChunkRef::new(call_id, position))
            {
                warn!(session_id, call_id, "session ended during send");
                break;
            }
            if position + 1 < total && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        if message_ids.is_empty() {
            return None;
        }
        inner.registry.touch(session_id);
        let complete = message_ids.len() == total;
        info!(session_id, call_id, sent = message_ids.len(), total, "message sent");
        inner.emit(BridgeEvent::MessageSent {
            session_id: session_id.to_string(),
            call_id: call_id.to_string(),
            message_ids: message_ids.clone(),
            complete,
            metadata,
        });
        Some(message_ids)
    }

    /// Routes an inbound message to a session and stores it as a reply.
    ///
    /// Returns `false` if no session is bound to the message's chat.
    pub fn handle_inbound_reply(&self, message: &InboundMessage) -> bool {
        self.inner.handle_inbound(message)
    }

    /// Returns the latest unread reply of a session.
    #[must_use]
    pub fn get_pending_reply(&self, session_id: &str) -> Option<InboundReply> {
        self.inner.registry.pending_reply(session_id)
    }

    /// Returns the latest reply threaded to `call_id`.
    #[must_use]
    pub fn reply_for_call(&self, session_id: &str, call_id: &str) -> Option<InboundReply> {
        self.inner.registry.reply_for_call(session_id, call_id)
    }

    /// Clears a session's replies. Returns `false` if it does not exist.
    pub fn clear_pending_reply(&self, session_id: &str) -> bool {
        self.inner.registry.clear_pending_reply(session_id)
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn get_status(&self) -> BridgeStatus {
        let (state, running) = {
            let runtime = self.inner.runtime.lock();
            (runtime.state, runtime.cancel.is_some())
        };
        let registry = &self.inner.registry;
        BridgeStatus {
            state,
            running,
            active_sessions: registry.len(),
            correlations: registry.correlator().len(),
            pending_replies: registry.pending_reply_count(),
            session_timeout_minutes: self.inner.config.session_timeout_minutes,
            max_sessions: registry.max_sessions(),
        }
    }
}

impl Inner {
    fn emit(&self, event: BridgeEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Posts a session notice. Only sent while connected; failures are
    /// logged and otherwise ignored.
    async fn notify(&self, chat: i64, text: &str) {
        let connected = self.runtime.lock().state == BridgeState::Connected;
        if !self.config.session_notifications || !connected {
            return;
        }
        self.limiter.acquire_wait().await;
        if let Err(e) = self.transport.send(chat, text).await {
            warn!(chat, error = %e, "session notice not sent");
        }
    }

    fn handle_inbound(&self, message: &InboundMessage) -> bool {
        let Some(route) = self.registry.route_reply(message.chat, message.reply_to) else {
            debug!(
                chat = message.chat,
                message_id = message.message_id,
                "no session for inbound message, dropped"
            );
            return false;
        };

        let reply = InboundReply {
            text: message.text.clone(),
            message_id: message.message_id,
            sender: message.sender,
            chat: message.chat,
            call_id: route.chunk.as_ref().map(|c| c.call_id.clone()),
            chunk_index: route.chunk.as_ref().map(|c| c.chunk_index),
            received_at: current_timestamp(),
        };
        if !self.registry.store_reply(&route.session_id, reply.clone()) {
            return false;
        }
        debug!(
            session_id = %route.session_id,
            call_id = ?reply.call_id,
            "reply stored"
        );
        self.emit(BridgeEvent::ReplyReceived {
            session_id: route.session_id,
            reply,
        });
        true
    }

    async fn sweep(&self) -> usize {
        let expired = self.registry.sweep_expired(self.config.session_timeout());
        let count = expired.len();
        for session in expired {
            self.notify(session.identity, &ended_notice(&session, EndReason::Expired))
                .await;
            self.emit(BridgeEvent::SessionEnded {
                session_id: session.id,
                reason: EndReason::Expired,
            });
        }
        count
    }
}

async fn poll_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    debug!("poll loop started");
    loop {
        let pause = tokio::select! {
            () = cancel.cancelled() => break,
            batch = inner.transport.poll(inner.config.poll_timeout()) => match batch {
                Ok(messages) => {
                    for message in &messages {
                        inner.handle_inbound(message);
                    }
                    inner.config.poll_interval()
                }
                Err(e) => {
                    warn!(error = %e, "poll failed, backing off");
                    inner.config.poll_error_backoff()
                }
            },
        };
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }
    debug!("poll loop exited");
}

async fn cleanup_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    debug!("cleanup loop started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(inner.config.cleanup_interval()) => {
                inner.sweep().await;
            }
        }
    }
    debug!("cleanup loop exited");
}

fn started_notice(session_id: &str, project: Option<&str>) -> String {
    match project {
        Some(project) => {
            format!("🎯 New session started\nSession: {session_id}\nProject: {project}")
        }
        None => format!("🎯 New session started\nSession: {session_id}"),
    }
}

fn ended_notice(session: &Session, reason: EndReason) -> String {
    let headline = match reason {
        EndReason::Expired => "⌛ Session expired",
        EndReason::Ended | EndReason::Stopped => "🏁 Session completed",
    };
    let minutes = tokio::time::Instant::now()
        .saturating_duration_since(session.created_at())
        .as_secs()
        / 60;
    format!(
        "{headline}\nSession: {}\nDuration: {minutes} min",
        session.id
    )
}

/// Returns the current Unix timestamp in seconds.
#[allow(clippy::cast_possible_wrap)]
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
