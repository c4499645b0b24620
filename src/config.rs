//! Command line and environment configuration

use crate::command::ExecutorConfig;
use crate::connection::{ClientIdentity, ConnectionConfig};
use crate::error::BridgeError;
use clap::Parser;
use display_bridge_shared::{defaults, TopicFilter};
use std::time::Duration;

/// rumqttc refuses shorter keep-alive intervals
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Keep-alive goes on the wire as a 16-bit count of seconds
const MAX_KEEP_ALIVE_SECS: u64 = u16::MAX as u64;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Switch the local display on and off from MQTT messages"
)]
pub struct Args {
    /// MQTT broker hostname.
    #[arg(long, env = "DISPLAY_BRIDGE_HOST", default_value = defaults::BROKER_HOST)]
    pub host: String,

    /// MQTT broker port.
    #[arg(long, env = "DISPLAY_BRIDGE_PORT", default_value_t = defaults::BROKER_PORT)]
    pub port: u16,

    /// Keep-alive interval in seconds.
    #[arg(long, env = "DISPLAY_BRIDGE_KEEP_ALIVE", default_value_t = defaults::KEEP_ALIVE_SECS)]
    pub keep_alive: u64,

    /// Client id override (default: display-bridge-<hostname>-<pid>).
    #[arg(long, env = "DISPLAY_BRIDGE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Topic filter to subscribe; repeat or comma-separate for several.
    /// Defaults to home/monitors/all and home/monitors/<hostname>.
    #[arg(long = "topic", env = "DISPLAY_BRIDGE_TOPICS", value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Upper bound for a single display command, in milliseconds.
    #[arg(long, env = "DISPLAY_BRIDGE_COMMAND_TIMEOUT_MS", default_value_t = defaults::COMMAND_TIMEOUT_MS)]
    pub command_timeout_ms: u64,

    /// Initial reconnect delay in milliseconds.
    #[arg(long, default_value_t = defaults::RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    #[arg(long, default_value_t = defaults::MAX_RECONNECT_DELAY_MS)]
    pub max_reconnect_delay_ms: u64,

    /// Consecutive failed connection attempts before exiting (0 = retry forever).
    #[arg(long, env = "DISPLAY_BRIDGE_MAX_RECONNECT_ATTEMPTS", default_value_t = 0)]
    pub max_reconnect_attempts: u32,

    /// Capacity of the inbound message queue.
    #[arg(long, default_value_t = defaults::INBOUND_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Exit when a display command fails instead of logging and continuing.
    #[arg(long, env = "DISPLAY_BRIDGE_EXIT_ON_COMMAND_FAILURE")]
    pub exit_on_command_failure: bool,
}

/// What to do when a display command fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and keep processing messages
    Continue,
    /// Treat the failure as fatal
    Exit,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub connection: ConnectionConfig,
    pub executor: ExecutorConfig,
    pub command_failure: FailurePolicy,
}

impl Args {
    /// Validate the arguments and build the runtime configuration
    pub fn into_config(self, identity: &ClientIdentity) -> Result<BridgeConfig, BridgeError> {
        let client_id = self
            .client_id
            .unwrap_or_else(|| identity.as_str().to_string());
        if client_id.is_empty() || client_id.starts_with(' ') {
            return Err(BridgeError::Config(format!("invalid client id {:?}", client_id)));
        }

        let mut topics: Vec<TopicFilter> = Vec::new();
        if self.topics.is_empty() {
            topics.push(TopicFilter::broadcast());
            topics.push(TopicFilter::for_host(identity.hostname())?);
        } else {
            for raw in self.topics {
                let topic = TopicFilter::new(raw)?;
                if !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
        }

        if self.keep_alive < MIN_KEEP_ALIVE_SECS || self.keep_alive > MAX_KEEP_ALIVE_SECS {
            return Err(BridgeError::Config(format!(
                "keep-alive must be between {}s and {}s, got {}s",
                MIN_KEEP_ALIVE_SECS, MAX_KEEP_ALIVE_SECS, self.keep_alive
            )));
        }
        if self.queue_capacity == 0 {
            return Err(BridgeError::Config("queue capacity must be positive".into()));
        }
        if self.command_timeout_ms == 0 {
            return Err(BridgeError::Config("command timeout must be positive".into()));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(BridgeError::Config("reconnect delay must be positive".into()));
        }
        if self.reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(BridgeError::Config(format!(
                "reconnect delay {}ms exceeds maximum {}ms",
                self.reconnect_delay_ms, self.max_reconnect_delay_ms
            )));
        }

        let command_failure = if self.exit_on_command_failure {
            FailurePolicy::Exit
        } else {
            FailurePolicy::Continue
        };

        Ok(BridgeConfig {
            connection: ConnectionConfig {
                client_id,
                broker_host: self.host,
                broker_port: self.port,
                keep_alive: Duration::from_secs(self.keep_alive),
                topics,
                reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
                max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms),
                max_reconnect_attempts: self.max_reconnect_attempts,
                queue_capacity: self.queue_capacity,
                ..Default::default()
            },
            executor: ExecutorConfig {
                timeout: Duration::from_millis(self.command_timeout_ms),
                ..Default::default()
            },
            command_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ClientIdentity {
        ClientIdentity::new("desk-01", 99)
    }

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["display-bridge"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config(&identity()).unwrap();

        assert_eq!(config.connection.client_id, "display-bridge-desk-01-99");
        assert_eq!(config.connection.broker_host, "mqtt");
        assert_eq!(config.connection.broker_port, 1883);
        assert_eq!(config.connection.keep_alive, Duration::from_secs(30));
        assert_eq!(
            config.connection.topics,
            vec![
                TopicFilter::broadcast(),
                TopicFilter::new("home/monitors/desk-01").unwrap()
            ]
        );
        assert_eq!(config.executor.timeout, Duration::from_secs(10));
        assert_eq!(config.command_failure, FailurePolicy::Continue);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--host",
            "broker.lan",
            "--port",
            "8883",
            "--client-id",
            "office-screen",
            "--topic",
            "office/screens/all",
            "--topic",
            "office/screens/left,office/screens/all",
            "--exit-on-command-failure",
        ])
        .into_config(&identity())
        .unwrap();

        assert_eq!(config.connection.broker_host, "broker.lan");
        assert_eq!(config.connection.broker_port, 8883);
        assert_eq!(config.connection.client_id, "office-screen");
        let topics: Vec<&str> = config.connection.topics.iter().map(|t| t.as_str()).collect();
        assert_eq!(topics, vec!["office/screens/all", "office/screens/left"]);
        assert_eq!(config.command_failure, FailurePolicy::Exit);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases: [&[&str]; 8] = [
            &["--topic", "home/#/all"],
            &["--keep-alive", "1"],
            &["--keep-alive", "70000"],
            &["--reconnect-delay-ms", "0"],
            &["--reconnect-delay-ms", "0", "--max-reconnect-delay-ms", "0"],
            &["--queue-capacity", "0"],
            &["--command-timeout-ms", "0"],
            &["--reconnect-delay-ms", "5000", "--max-reconnect-delay-ms", "100"],
        ];

        for extra in cases {
            let result = parse(extra).into_config(&identity());
            assert!(
                matches!(result, Err(BridgeError::Config(_))),
                "{:?} should be rejected",
                extra
            );
        }
    }

    #[test]
    fn test_keep_alive_bounds_are_inclusive() {
        for secs in ["5", "65535"] {
            let config = parse(&["--keep-alive", secs]).into_config(&identity()).unwrap();
            assert_eq!(config.connection.keep_alive.as_secs().to_string(), secs);
        }
    }

    #[test]
    fn test_blank_client_id_rejected() {
        let result = parse(&["--client-id", " padded"]).into_config(&identity());
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
