//! Connection Lifecycle State Machine
//!
//! Defines the valid broker connection states and the events that move the
//! subscription manager between them.

use std::fmt;

/// Broker connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Disconnecting,
    Terminated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Manager started
    Start,
    /// Broker acknowledged the connect handshake
    HandshakeSucceeded,
    /// Broker acknowledged every topic filter
    SubscriptionsRegistered,
    /// A publish arrived on a subscribed filter
    MessageReceived,
    /// Transport error, refused handshake or rejected subscription
    ConnectionLost,
    /// Reconnect budget exhausted
    RetriesExhausted,
    /// Termination signal observed
    ShutdownRequested,
    /// DISCONNECT sent (or the connection is already gone)
    DisconnectIssued,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or self-looped)
    Success(ConnectionState),
    /// Connection dropped, manager should back off and reconnect
    Reconnect { attempt: u32 },
    /// Transition was invalid from current state
    Invalid { from: ConnectionState, event: LifecycleEvent },
}

/// State machine for the broker connection
#[derive(Debug)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
    /// Consecutive failed connection attempts since the last handshake
    reconnect_attempts: u32,
    /// Total successful handshakes
    connections: u64,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            connections: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Check whether the reconnect budget is spent (`max == 0` means unlimited)
    pub fn is_reconnect_exhausted(&self, max_attempts: u32) -> bool {
        max_attempts > 0 && self.reconnect_attempts >= max_attempts
    }

    /// True once a shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self.current_state,
            ConnectionState::Disconnecting | ConnectionState::Terminated
        )
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        use ConnectionState::*;

        if event == LifecycleEvent::ConnectionLost {
            match self.current_state {
                Connecting | Connected | Subscribed => {
                    self.current_state = Connecting;
                    self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
                    return TransitionResult::Reconnect {
                        attempt: self.reconnect_attempts,
                    };
                }
                // Losing the link while disconnecting completes the shutdown
                Disconnecting => {
                    self.current_state = Terminated;
                    return TransitionResult::Success(Terminated);
                }
                _ => {}
            }
        }

        match self.get_next_state(&event) {
            Some(state) => {
                if event == LifecycleEvent::HandshakeSucceeded {
                    self.reconnect_attempts = 0;
                    self.connections += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &LifecycleEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LifecycleEvent::*;

        match (self.current_state, event) {
            (Disconnected, Start) => Some(Connecting),

            (Connecting, HandshakeSucceeded) => Some(Connected),
            (Connecting, RetriesExhausted) => Some(Terminated),

            (Connected, SubscriptionsRegistered) => Some(Subscribed),

            // Each message is a self-loop
            (Subscribed, MessageReceived) => Some(Subscribed),

            (Disconnected | Connecting | Connected | Subscribed, ShutdownRequested) => {
                Some(Disconnecting)
            }

            // Messages may still be in flight while the disconnect drains
            (Disconnecting, MessageReceived) => Some(Disconnecting),
            (Disconnecting, DisconnectIssued) => Some(Terminated),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;

    match (from, to) {
        (Subscribed, Subscribed) | (Disconnecting, Disconnecting) => true,

        (Disconnected, Connecting) => true,
        (Connecting, Connected) => true,
        (Connected, Subscribed) => true,

        // Reconnect after a lost connection
        (Connecting | Connected | Subscribed, Connecting) => true,

        (Disconnected | Connecting | Connected | Subscribed, Disconnecting) => true,
        (Connecting | Disconnecting, Terminated) => true,

        _ => false,
    }
}
