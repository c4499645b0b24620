//! Bridge error taxonomy and exit codes

use crate::action::ActionError;
use display_bridge_shared::TopicError;
use std::io;
use thiserror::Error;

/// Category of a fatal condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised before any network activity
    Startup,
    /// Broker connection could not be kept
    Connection,
    /// A display command failed under the exit-on-failure policy
    Command,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Startup => 2,
            ErrorKind::Connection => 3,
            ErrorKind::Command => 4,
        }
    }
}

/// Errors that end the bridge process
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Unsupported OS {0} - exiting")]
    UnsupportedPlatform(String),

    #[error("Invalid action table: {0}")]
    ActionTable(ActionError),

    #[error("Couldn't determine my hostname: {0}")]
    Hostname(#[source] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Error running {action} command: {error}\n{output}")]
    Command {
        action: String,
        error: String,
        output: String,
    },
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::UnsupportedPlatform(_)
            | BridgeError::ActionTable(_)
            | BridgeError::Hostname(_)
            | BridgeError::Config(_) => ErrorKind::Startup,
            BridgeError::Connection(_) => ErrorKind::Connection,
            BridgeError::Command { .. } => ErrorKind::Command,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

impl From<ActionError> for BridgeError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::NotSupported(platform) => BridgeError::UnsupportedPlatform(platform),
            other => BridgeError::ActionTable(other),
        }
    }
}

impl From<TopicError> for BridgeError {
    fn from(err: TopicError) -> Self {
        BridgeError::Config(err.to_string())
    }
}
