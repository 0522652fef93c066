//! Session registry.
//!
//! Tracks live sessions, their expiry, and their pending replies. Ending a
//! session also forgets every correlation entry it owns. The session map
//! and the correlator are locked independently and never at the same time.
//!
//! A session's in-flight set only holds ids the correlator still holds:
//! entries evicted by the correlator are released from their owner.

use super::correlator::{ChunkRef, Evicted, MessageCorrelator};
use crate::core::{ContextMap, InboundReply, Session};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Where an inbound reply should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRoute {
    /// Session that receives the reply.
    pub session_id: String,
    /// Chunk the reply was threaded to, if it resolved.
    pub chunk: Option<ChunkRef>,
}

/// Registry of live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
    max_sessions: usize,
    correlator: Arc<MessageCorrelator>,
}

impl SessionRegistry {
    /// Creates a registry allowing at most `max_sessions` live sessions.
    #[must_use]
    pub fn new(max_sessions: usize, correlator: Arc<MessageCorrelator>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            correlator,
        }
    }

    /// Returns the correlator shared with the registry.
    #[must_use]
    pub const fn correlator(&self) -> &Arc<MessageCorrelator> {
        &self.correlator
    }

    /// Returns the session cap.
    #[must_use]
    pub const fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Creates a session.
    ///
    /// Returns `false` without changing anything if the cap is reached or
    /// `session_id` is already live.
    pub fn create(
        &self,
        session_id: &str,
        identity: i64,
        project: Option<String>,
        context: ContextMap,
    ) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(session_id) {
            debug!(session_id, "session already exists");
            return false;
        }
        if sessions.len() >= self.max_sessions {
            debug!(session_id, max = self.max_sessions, "session cap reached");
            return false;
        }
        sessions.insert(
            session_id.to_string(),
            Session::new(session_id, identity, project, context, Instant::now()),
        );
        info!(session_id, identity, "session created");
        true
    }

    /// Creates a session under a generated UUID and returns the id.
    pub fn create_generated(
        &self,
        identity: i64,
        project: Option<String>,
        context: ContextMap,
    ) -> Option<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.create(&session_id, identity, project, context)
            .then_some(session_id)
    }

    /// Ends a session and forgets its correlations.
    ///
    /// Returns `false` if the session does not exist.
    pub fn end(&self, session_id: &str) -> bool {
        self.remove(session_id).is_some()
    }

    /// Removes and returns a session, forgetting its correlations.
    pub fn remove(&self, session_id: &str) -> Option<Session> {
        let session = self.sessions.lock().remove(session_id)?;
        let forgotten = self.correlator.forget(&session.id, session.in_flight());
        info!(session_id, forgotten, "session ended");
        Some(session)
    }

    /// Ends every session and returns their ids.
    pub fn end_all(&self) -> Vec<String> {
        let drained: Vec<Session> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in &drained {
            self.correlator.forget(&session.id, session.in_flight());
        }
        drained.into_iter().map(|s| s.id).collect()
    }

    /// Refreshes a session's last-activity time.
    ///
    /// Returns `false` if the session does not exist.
    pub fn touch(&self, session_id: &str) -> bool {
        self.with_session(session_id, |s| s.touch(Instant::now()))
            .is_some()
    }

    /// Checks whether a session has been idle for longer than `timeout`.
    ///
    /// Unknown sessions are reported as not expired.
    #[must_use]
    pub fn is_expired(&self, session_id: &str, timeout: Duration) -> bool {
        let now = Instant::now();
        self.sessions
            .lock()
            .get(session_id)
            .is_some_and(|s| s.is_expired(now, timeout))
    }

    /// Ends every session idle for longer than `timeout` and returns them.
    pub fn sweep_expired(&self, timeout: Duration) -> Vec<Session> {
        let now = Instant::now();
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.lock();
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.is_expired(now, timeout))
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            self.correlator.forget(&session.id, session.in_flight());
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired sessions swept");
        }
        expired
    }

    /// Records a sent chunk: the correlation first, then the session's
    /// message id.
    ///
    /// Returns `false` if the session no longer exists, in which case the
    /// correlation is dropped again.
    pub fn record_sent(&self, session_id: &str, message_id: i64, chunk: ChunkRef) -> bool {
        debug!(session_id, message_id, key = %chunk.key(), "recording correlation");
        let evicted = self.correlator.record(message_id, session_id, chunk);

        let recorded = {
            let mut sessions = self.sessions.lock();
            release_evicted(&mut sessions, &evicted);
            sessions
                .get_mut(session_id)
                .map(|s| s.record_sent(message_id))
                .is_some()
        };
        if !recorded {
            self.correlator
                .forget(session_id, &HashSet::from([message_id]));
        }
        recorded
    }

    /// Finds the session an inbound reply belongs to.
    ///
    /// A reply threaded to a known chunk goes to the session that sent that
    /// chunk, if it is bound to the same chat. Otherwise the reply goes to
    /// the most recently active session bound to the chat. Replies from a
    /// chat with no session are undeliverable.
    #[must_use]
    pub fn route_reply(&self, chat: i64, reply_to: Option<i64>) -> Option<ReplyRoute> {
        let correlation = reply_to.and_then(|id| self.correlator.resolve(id));
        let sessions = self.sessions.lock();

        if let Some(correlation) = correlation
            && let Some(owner) = sessions
                .get(&correlation.session_id)
                .filter(|s| s.identity == chat)
        {
            return Some(ReplyRoute {
                session_id: owner.id.clone(),
                chunk: Some(correlation.chunk),
            });
        }

        sessions
            .values()
            .filter(|s| s.identity == chat)
            .max_by_key(|s| s.last_activity())
            .map(|s| ReplyRoute {
                session_id: s.id.clone(),
                chunk: None,
            })
    }

    /// Stores a reply on a session and touches it.
    ///
    /// Returns `false` if the session does not exist.
    pub fn store_reply(&self, session_id: &str, reply: InboundReply) -> bool {
        self.with_session(session_id, |s| {
            s.store_reply(reply);
            s.touch(Instant::now());
        })
        .is_some()
    }

    /// Returns the latest pending reply of a session.
    #[must_use]
    pub fn pending_reply(&self, session_id: &str) -> Option<InboundReply> {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|s| s.pending_reply().cloned())
    }

    /// Returns the latest reply threaded to `call_id` in a session.
    #[must_use]
    pub fn reply_for_call(&self, session_id: &str, call_id: &str) -> Option<InboundReply> {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|s| s.reply_for_call(call_id).cloned())
    }

    /// Clears a session's pending replies.
    ///
    /// Returns `false` if the session does not exist.
    pub fn clear_pending_reply(&self, session_id: &str) -> bool {
        self.with_session(session_id, Session::clear_replies)
            .is_some()
    }

    /// Returns a snapshot of a session.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Checks whether a session is live.
    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    /// Returns the chat identity of a session.
    #[must_use]
    pub fn identity_of(&self, session_id: &str) -> Option<i64> {
        self.sessions.lock().get(session_id).map(|s| s.identity)
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Checks whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of sessions holding a pending reply.
    #[must_use]
    pub fn pending_reply_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.pending_reply().is_some())
            .count()
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        self.sessions.lock().get_mut(session_id).map(f)
    }
}

fn release_evicted(sessions: &mut HashMap<String, Session>, evicted: &[Evicted]) {
    for entry in evicted {
        if let Some(owner) = sessions.get_mut(&entry.session_id) {
            owner.release(entry.message_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(max: usize) -> SessionRegistry {
        SessionRegistry::new(max, Arc::new(MessageCorrelator::new(100)))
    }

    fn reply(chat: i64, text: &str, chunk: Option<&ChunkRef>) -> InboundReply {
        InboundReply {
            text: text.to_string(),
            message_id: 500,
            sender: chat,
            chat,
            call_id: chunk.map(|c| c.call_id.clone()),
            chunk_index: chunk.map(|c| c.chunk_index),
            received_at: 0,
        }
    }

    #[test]
    fn test_create_and_duplicate() {
        let reg = registry(5);
        assert!(reg.create("s1", 42, None, ContextMap::new()));
        assert!(!reg.create("s1", 43, None, ContextMap::new()));
        assert_eq!(reg.identity_of("s1"), Some(42));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_cap_fails_without_mutation() {
        let reg = registry(2);
        assert!(reg.create("a", 1, None, ContextMap::new()));
        assert!(reg.create("b", 2, None, ContextMap::new()));
        assert!(!reg.create("c", 3, None, ContextMap::new()));
        assert_eq!(reg.len(), 2);
        assert!(!reg.contains("c"));
        assert!(reg.create_generated(3, None, ContextMap::new()).is_none());
    }

    #[test]
    fn test_create_generated_uuid() {
        let reg = registry(2);
        let id = reg.create_generated(9, Some("proj".to_string()), ContextMap::new()).unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(reg.get(&id).unwrap().project.as_deref(), Some("proj"));
    }

    #[test]
    fn test_end_forgets_correlations() {
        let reg = registry(5);
        reg.create("s1", 42, None, ContextMap::new());
        reg.create("s2", 43, None, ContextMap::new());
        assert!(reg.record_sent("s1", 10, ChunkRef::new("c1", 0)));
        assert!(reg.record_sent("s2", 11, ChunkRef::new("c2", 0)));

        assert!(reg.end("s1"));
        assert!(!reg.end("s1"));
        assert!(reg.correlator().resolve(10).is_none());
        assert!(reg.correlator().resolve(11).is_some());
    }

    #[test]
    fn test_end_keeps_other_sessions_sharing_call_id() {
        let reg = registry(5);
        reg.create("a", 1, None, ContextMap::new());
        reg.create("b", 2, None, ContextMap::new());
        assert!(reg.record_sent("a", 10, ChunkRef::new("call-1", 0)));
        assert!(reg.record_sent("b", 20, ChunkRef::new("call-1", 0)));

        assert!(reg.end("a"));
        let survivor = reg.route_reply(2, Some(20)).unwrap();
        assert_eq!(survivor.session_id, "b");
        assert_eq!(survivor.chunk, Some(ChunkRef::new("call-1", 0)));
        assert!(reg.correlator().resolve(10).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_other_sessions_sharing_call_id() {
        let reg = registry(5);
        reg.create("old", 1, None, ContextMap::new());
        reg.record_sent("old", 10, ChunkRef::new("call-1", 0));
        tokio::time::advance(Duration::from_secs(120)).await;
        reg.create("new", 2, None, ContextMap::new());
        reg.record_sent("new", 20, ChunkRef::new("call-1", 0));

        let swept = reg.sweep_expired(Duration::from_secs(60));
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, "old");
        assert!(reg.correlator().resolve(20).is_some());
        assert!(reg.correlator().resolve(10).is_none());
    }

    #[test]
    fn test_in_flight_bounded_by_correlator() {
        let reg = SessionRegistry::new(5, Arc::new(MessageCorrelator::new(10)));
        reg.create("a", 1, None, ContextMap::new());
        reg.create("b", 2, None, ContextMap::new());
        for id in 0..1000 {
            let owner = if id % 3 == 0 { "a" } else { "b" };
            assert!(reg.record_sent(owner, id, ChunkRef::new("call", 0)));
        }

        let a = reg.get("a").unwrap();
        let b = reg.get("b").unwrap();
        assert_eq!(reg.correlator().len(), 10);
        assert_eq!(a.in_flight().len() + b.in_flight().len(), 10);
        assert!(a.in_flight().contains(&999));
        assert!(b.in_flight().contains(&998));
        assert!(!b.in_flight().contains(&1));
    }

    #[test]
    fn test_record_for_ended_session_is_dropped() {
        let reg = registry(5);
        assert!(!reg.record_sent("ghost", 10, ChunkRef::new("c", 0)));
        assert!(reg.correlator().is_empty());
    }

    #[test]
    fn test_operations_on_unknown_session_fail_cleanly() {
        let reg = registry(5);
        assert!(!reg.touch("ghost"));
        assert!(!reg.is_expired("ghost", Duration::ZERO));
        assert!(!reg.clear_pending_reply("ghost"));
        assert!(!reg.store_reply("ghost", reply(1, "x", None)));
        assert!(reg.pending_reply("ghost").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let reg = registry(5);
        reg.create("old", 1, None, ContextMap::new());
        reg.record_sent("old", 77, ChunkRef::new("c", 0));
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        reg.create("fresh", 2, None, ContextMap::new());
        tokio::time::advance(Duration::from_secs(11 * 60)).await;

        let timeout = Duration::from_secs(30 * 60);
        assert!(reg.is_expired("old", timeout));
        assert!(!reg.is_expired("fresh", timeout));

        let swept: Vec<String> = reg.sweep_expired(timeout).into_iter().map(|s| s.id).collect();
        assert_eq!(swept, vec!["old".to_string()]);
        assert!(!reg.contains("old"));
        assert!(reg.contains("fresh"));
        assert!(reg.correlator().resolve(77).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_defers_expiry() {
        let reg = registry(5);
        reg.create("s", 1, None, ContextMap::new());
        let timeout = Duration::from_secs(60);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(reg.touch("s"));
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(reg.sweep_expired(timeout).is_empty());
    }

    #[test]
    fn test_route_threaded_reply_to_owner() {
        let reg = registry(5);
        reg.create("s1", 42, None, ContextMap::new());
        reg.create("s2", 42, None, ContextMap::new());
        reg.record_sent("s1", 10, ChunkRef::new("call-a", 1));
        reg.touch("s2");

        let route = reg.route_reply(42, Some(10)).unwrap();
        assert_eq!(route.session_id, "s1");
        assert_eq!(route.chunk, Some(ChunkRef::new("call-a", 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_unthreaded_reply_to_most_recent() {
        let reg = registry(5);
        reg.create("s1", 42, None, ContextMap::new());
        reg.create("s2", 42, None, ContextMap::new());
        reg.create("other", 7, None, ContextMap::new());
        tokio::time::advance(Duration::from_secs(1)).await;
        reg.touch("s2");
        tokio::time::advance(Duration::from_secs(1)).await;
        reg.touch("other");

        let route = reg.route_reply(42, None).unwrap();
        assert_eq!(route.session_id, "s2");
        assert!(route.chunk.is_none());
    }

    #[test]
    fn test_route_ignores_owner_in_other_chat() {
        let reg = registry(5);
        reg.create("s1", 42, None, ContextMap::new());
        reg.record_sent("s1", 10, ChunkRef::new("call-a", 0));
        assert!(reg.route_reply(99, Some(10)).is_none());
    }

    #[test]
    fn test_route_unknown_chat_is_undeliverable() {
        let reg = registry(5);
        reg.create("s1", 42, None, ContextMap::new());
        assert!(reg.route_reply(1, None).is_none());
        assert!(reg.route_reply(1, Some(123)).is_none());
    }

    #[test]
    fn test_pending_replies() {
        let reg = registry(5);
        reg.create("s1", 42, None, ContextMap::new());
        let chunk = ChunkRef::new("call-a", 0);
        assert!(reg.store_reply("s1", reply(42, "yes", Some(&chunk))));
        assert_eq!(reg.pending_reply_count(), 1);
        assert_eq!(reg.pending_reply("s1").unwrap().text, "yes");
        assert_eq!(reg.reply_for_call("s1", "call-a").unwrap().chunk_index, Some(0));

        assert!(reg.clear_pending_reply("s1"));
        assert!(reg.pending_reply("s1").is_none());
        assert_eq!(reg.pending_reply_count(), 0);
    }

    #[test]
    fn test_end_all() {
        let reg = registry(5);
        reg.create("a", 1, None, ContextMap::new());
        reg.create("b", 2, None, ContextMap::new());
        reg.record_sent("a", 1, ChunkRef::new("x", 0));
        let mut ended = reg.end_all();
        ended.sort();
        assert_eq!(ended, vec!["a".to_string(), "b".to_string()]);
        assert!(reg.is_empty());
        assert!(reg.correlator().is_empty());
    }
}
