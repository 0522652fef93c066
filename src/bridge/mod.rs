//! Bidirectional chat relay.
//!
//! The bridge sends chunked messages to a chat transport and routes replies
//! back to the session that asked:
//!
//! - [`SlidingWindowLimiter`]: outbound admission control
//! - [`MessageCorrelator`]: transport message id to `(session, call, chunk)` map
//! - [`SessionRegistry`]: live sessions, expiry and pending replies
//! - [`Bridge`]: the orchestrator with its poll and cleanup loops
//!
//! [`Transport`] is the seam to a concrete chat backend.

pub mod correlator;
pub mod orchestrator;
pub mod rate_limit;
pub mod registry;
pub mod transport;

pub use correlator::{ChunkRef, Correlation, Evicted, MessageCorrelator};
pub use orchestrator::{Bridge, BridgeEvent, BridgeState, BridgeStatus, EndReason};
pub use rate_limit::SlidingWindowLimiter;
pub use registry::{ReplyRoute, SessionRegistry};
pub use transport::{
    DEFAULT_MAX_MESSAGE_LENGTH, InboundMessage, MemoryTransport, SentMessage, Transport,
};
