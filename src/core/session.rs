//! Relay session state.
//!
//! A session binds a transport identity (a chat) to a logical work
//! context. It tracks the transport message ids of chunks sent on its
//! behalf and the replies received for it.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// Free-form context attached to a session.
pub type ContextMap = HashMap<String, serde_json::Value>;

/// Lifecycle state of a live session.
///
/// Ended and expired sessions are removed from the registry, so only the
/// live states are represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created but not yet used for a send or receive.
    Created,
    /// Touched at least once.
    Active,
}

/// A reply received from the remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReply {
    /// Reply text.
    pub text: String,

    /// Transport id of the reply message itself.
    pub message_id: i64,

    /// Transport identity of the sender.
    pub sender: i64,

    /// Chat the reply arrived in.
    pub chat: i64,

    /// Logical call the reply was threaded to, if it was a threaded reply.
    pub call_id: Option<String>,

    /// Send position of the chunk that was replied to.
    pub chunk_index: Option<usize>,

    /// Unix timestamp (seconds) when the reply was received.
    pub received_at: i64,
}

/// A live relay session.
///
/// # Examples
///
/// ```
/// use chunk_relay::core::{Session, SessionState};
/// use tokio::time::Instant;
///
/// let mut session = Session::new("s1", 42, None, Default::default(), Instant::now());
/// assert_eq!(session.state, SessionState::Created);
/// session.touch(Instant::now());
/// assert_eq!(session.state, SessionState::Active);
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session id.
    pub id: String,

    /// Transport chat identity the session is bound to.
    pub identity: i64,

    /// Project or work context name.
    pub project: Option<String>,

    /// Free-form context map.
    pub context: ContextMap,

    /// Lifecycle state.
    pub state: SessionState,

    created_at: Instant,
    last_activity: Instant,
    in_flight: HashSet<i64>,
    pending_reply: Option<InboundReply>,
    replies: HashMap<String, InboundReply>,
}

impl Session {
    /// Creates a new session with `created_at = last_activity = now`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        identity: i64,
        project: Option<String>,
        context: ContextMap,
        now: Instant,
    ) -> Self {
        Self {
            id: id.into(),
            identity,
            project,
            context,
            state: SessionState::Created,
            created_at: now,
            last_activity: now,
            in_flight: HashSet::new(),
            pending_reply: None,
            replies: HashMap::new(),
        }
    }

    /// Refreshes the last-activity time and marks the session active.
    ///
    /// The last-activity time never moves backwards.
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
        self.state = SessionState::Active;
    }

    /// Returns when the session was created.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns the last-activity time.
    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Returns how long the session has been idle at `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Checks whether the session has been idle for longer than `timeout`.
    #[must_use]
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.idle_for(now) > timeout
    }

    /// Records the transport message id of a chunk sent for this session.
    pub fn record_sent(&mut self, message_id: i64) {
        self.in_flight.insert(message_id);
    }

    /// Drops a message id whose correlation is no longer held.
    pub fn release(&mut self, message_id: i64) -> bool {
        self.in_flight.remove(&message_id)
    }

    /// Returns the transport message ids still in flight.
    #[must_use]
    pub const fn in_flight(&self) -> &HashSet<i64> {
        &self.in_flight
    }

    /// Stores a reply as the latest pending reply, and under its call id
    /// when the reply was threaded.
    pub fn store_reply(&mut self, reply: InboundReply) {
        if let Some(call_id) = &reply.call_id {
            self.replies.insert(call_id.clone(), reply.clone());
        }
        self.pending_reply = Some(reply);
    }

    /// Returns the latest pending reply.
    #[must_use]
    pub const fn pending_reply(&self) -> Option<&InboundReply> {
        self.pending_reply.as_ref()
    }

    /// Returns the latest reply threaded to `call_id`.
    #[must_use]
    pub fn reply_for_call(&self, call_id: &str) -> Option<&InboundReply> {
        self.replies.get(call_id)
    }

    /// Clears the pending reply and all replies keyed by call.
    pub fn clear_replies(&mut self) {
        self.pending_reply = None;
        self.replies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(call_id: Option<&str>, text: &str) -> InboundReply {
        InboundReply {
            text: text.to_string(),
            message_id: 100,
            sender: 7,
            chat: 42,
            call_id: call_id.map(str::to_string),
            chunk_index: call_id.map(|_| 0),
            received_at: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_is_monotonic() {
        let start = Instant::now();
        let mut session = Session::new("s", 42, None, ContextMap::new(), start);
        tokio::time::advance(Duration::from_secs(10)).await;
        session.touch(Instant::now());
        let later = session.last_activity();
        session.touch(start);
        assert_eq!(session.last_activity(), later);
        assert!(session.last_activity() > session.created_at());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let session = Session::new("s", 42, None, ContextMap::new(), Instant::now());
        let timeout = Duration::from_secs(60);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!session.is_expired(Instant::now(), timeout));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(session.is_expired(Instant::now(), timeout));
    }

    #[test]
    fn test_store_threaded_and_plain_replies() {
        let mut session = Session::new(
            "s",
            42,
            Some("proj".to_string()),
            ContextMap::new(),
            Instant::now(),
        );
        session.store_reply(reply(Some("call-1"), "threaded"));
        session.store_reply(reply(None, "plain"));

        assert_eq!(session.pending_reply().map(|r| r.text.as_str()), Some("plain"));
        assert_eq!(
            session.reply_for_call("call-1").map(|r| r.text.as_str()),
            Some("threaded")
        );

        session.clear_replies();
        assert!(session.pending_reply().is_none());
        assert!(session.reply_for_call("call-1").is_none());
    }

    #[test]
    fn test_in_flight_ids() {
        let mut session = Session::new("s", 1, None, ContextMap::new(), Instant::now());
        session.record_sent(10);
        session.record_sent(11);
        assert!(session.release(10));
        assert!(!session.release(10));
        assert!(session.in_flight().contains(&11));
        assert_eq!(session.in_flight().len(), 1);
    }
}
