//! Transport message id to logical call correlation.
//!
//! The map is bounded: once `capacity` entries are held, recording a new
//! one evicts the oldest. Every entry remembers the session that sent it,
//! so forgetting is always scoped to one owner.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Identifies one sent chunk of a logical call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Logical call id.
    pub call_id: String,
    /// Send position of the chunk within the call (summary included).
    pub chunk_index: usize,
}

impl ChunkRef {
    /// Creates a chunk reference.
    #[must_use]
    pub fn new(call_id: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            call_id: call_id.into(),
            chunk_index,
        }
    }

    /// Returns the correlation key, `"{call_id}_chunk_{chunk_index}"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunk_relay::bridge::ChunkRef;
    ///
    /// assert_eq!(ChunkRef::new("call-7", 2).key(), "call-7_chunk_2");
    /// ```
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_chunk_{}", self.call_id, self.chunk_index)
    }
}

/// A recorded correlation: the chunk a transport message carried and the
/// session that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    /// Session that sent the chunk.
    pub session_id: String,
    /// The chunk itself.
    pub chunk: ChunkRef,
}

/// An entry dropped to stay within capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    /// Transport message id of the dropped entry.
    pub message_id: i64,
    /// Session that owned it.
    pub session_id: String,
}

#[derive(Debug, Default)]
struct Entries {
    by_message: HashMap<i64, Correlation>,
    order: VecDeque<i64>,
}

/// Maps transport message ids to the chunk that produced them.
#[derive(Debug)]
pub struct MessageCorrelator {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl MessageCorrelator {
    /// Creates a correlator holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Records that transport message `message_id`, sent by `session_id`,
    /// carried `chunk`.
    ///
    /// Returns the entries evicted to make room, oldest first.
    pub fn record(&self, message_id: i64, session_id: &str, chunk: ChunkRef) -> Vec<Evicted> {
        let mut entries = self.entries.lock();
        let correlation = Correlation {
            session_id: session_id.to_string(),
            chunk,
        };
        if entries.by_message.insert(message_id, correlation).is_none() {
            entries.order.push_back(message_id);
        }

        let mut evicted = Vec::new();
        while entries.by_message.len() > self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            if let Some(dropped) = entries.by_message.remove(&oldest) {
                tracing::debug!(
                    message_id = oldest,
                    session_id = %dropped.session_id,
                    "evicted oldest correlation"
                );
                evicted.push(Evicted {
                    message_id: oldest,
                    session_id: dropped.session_id,
                });
            }
        }
        evicted
    }

    /// Resolves a transport message id. Unknown ids yield `None`.
    #[must_use]
    pub fn resolve(&self, message_id: i64) -> Option<Correlation> {
        self.entries.lock().by_message.get(&message_id).cloned()
    }

    /// Forgets the entries for `message_ids` that belong to `session_id`.
    ///
    /// Entries recorded by other sessions are left alone. Returns the
    /// number of entries removed.
    pub fn forget(&self, session_id: &str, message_ids: &HashSet<i64>) -> usize {
        if message_ids.is_empty() {
            return 0;
        }
        let mut entries = self.entries.lock();
        let before = entries.by_message.len();
        entries
            .by_message
            .retain(|id, c| !(message_ids.contains(id) && c.session_id == session_id));
        let Entries { by_message, order } = &mut *entries;
        order.retain(|id| by_message.contains_key(id));
        before - by_message.len()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.by_message.clear();
        entries.order.clear();
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().by_message.len()
    }

    /// Checks whether no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
