//! Payload interpretation
//!
//! Inbound payloads are opaque bytes. Only the exact tokens `on` and `off`
//! carry meaning:
//! ```text
//! b"on"   -> TurnOn
//! b"off"  -> TurnOff
//! other   -> Unknown(payload)
//! ```
//! No trimming or case folding is applied.

use bytes::Bytes;
use std::fmt;

/// Wire token for switching the display on
pub const ON_TOKEN: &[u8] = b"on";

/// Wire token for switching the display off
pub const OFF_TOKEN: &[u8] = b"off";

/// The transport-independent intent carried by a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalAction {
    TurnOn,
    TurnOff,
    /// Anything that is not an exact `on` / `off` token
    Unknown(Bytes),
}

impl LogicalAction {
    /// Decode a payload. Total: unrecognized input maps to `Unknown`.
    pub fn interpret(payload: &[u8]) -> Self {
        match payload {
            ON_TOKEN => LogicalAction::TurnOn,
            OFF_TOKEN => LogicalAction::TurnOff,
            other => LogicalAction::Unknown(Bytes::copy_from_slice(other)),
        }
    }

    /// Canonical wire token, `None` for unknown payloads
    pub fn as_payload(&self) -> Option<&'static [u8]> {
        match self {
            LogicalAction::TurnOn => Some(ON_TOKEN),
            LogicalAction::TurnOff => Some(OFF_TOKEN),
            LogicalAction::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, LogicalAction::Unknown(_))
    }
}

impl fmt::Display for LogicalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalAction::TurnOn => write!(f, "on"),
            LogicalAction::TurnOff => write!(f, "off"),
            LogicalAction::Unknown(raw) => write!(f, "unknown({:?})", String::from_utf8_lossy(raw)),
        }
    }
}
