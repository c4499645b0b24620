//! Display Bridge Shared Types
//!
//! This crate provides the transport-independent pieces shared between the
//! bridge daemon and the `display-ctl` publisher: payload interpretation,
//! topic filters, and the connection lifecycle state machine.

pub mod payload;
pub mod state_machine;
pub mod topic;

use bytes::Bytes;

pub use payload::LogicalAction;
pub use state_machine::{ConnectionState, ConnectionStateMachine, LifecycleEvent, TransitionResult};
pub use topic::{TopicError, TopicFilter};

/// Protocol defaults for the bridge
pub mod defaults {
    /// Default broker hostname
    pub const BROKER_HOST: &str = "mqtt";

    /// Default broker port (plain TCP)
    pub const BROKER_PORT: u16 = 1883;

    /// MQTT keep-alive interval in seconds
    pub const KEEP_ALIVE_SECS: u64 = 30;

    /// Prefix for every monitor topic
    pub const TOPIC_PREFIX: &str = "home/monitors";

    /// Topic level addressing every monitor at once
    pub const BROADCAST_LEVEL: &str = "all";

    /// Prefix for generated client identities
    pub const CLIENT_ID_PREFIX: &str = "display-bridge";

    /// Initial reconnect delay in milliseconds
    pub const RECONNECT_DELAY_MS: u64 = 1000;

    /// Upper bound for the reconnect delay in milliseconds
    pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

    /// Upper bound for a single display command in milliseconds
    pub const COMMAND_TIMEOUT_MS: u64 = 10_000;

    /// Capacity of the inbound message queue
    pub const INBOUND_QUEUE_CAPACITY: usize = 64;
}

/// A message delivered by the broker on one of the subscribed filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    /// Create a new inbound message
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Decode the payload into a logical action
    pub fn action(&self) -> LogicalAction {
        LogicalAction::interpret(&self.payload)
    }
}
