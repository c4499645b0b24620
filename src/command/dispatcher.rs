//! Dispatcher - routes inbound messages to display commands

use super::executor::{CommandRunner, ExecOutcome};
use crate::action::ActionSpec;
use bytes::Bytes;
use display_bridge_shared::{InboundMessage, LogicalAction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Result of dispatching one message
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The command ran and exited successfully
    Executed { action: LogicalAction, elapsed: Duration },
    /// Payload was not recognized, nothing was spawned
    Ignored { payload: Bytes },
    /// The command failed to start, exited non-zero or timed out
    Failed {
        action: LogicalAction,
        error: String,
        combined_output: String,
    },
}

/// Counters for dispatched messages
#[derive(Debug, Default)]
pub struct DispatchStats {
    executed: AtomicU64,
    ignored: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Turns inbound messages into command executions
///
/// Holds no memory of earlier payloads: the same `on` delivered twice runs
/// the on-command twice.
pub struct Dispatcher {
    spec: ActionSpec,
    runner: Arc<dyn CommandRunner>,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Create a dispatcher for the resolved platform spec
    pub fn new(spec: ActionSpec, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            spec,
            runner,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Interpret, resolve and execute a single message
    pub async fn dispatch(&self, message: &InboundMessage) -> DispatchOutcome {
        info!(
            topic = %message.topic,
            payload = %String::from_utf8_lossy(&message.payload),
            "Received message"
        );

        let action = message.action();
        let command_line = match self.spec.command_for(&action) {
            Some(command_line) => command_line,
            None => {
                info!(
                    payload = %String::from_utf8_lossy(&message.payload),
                    "Unknown payload, ignoring"
                );
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                return DispatchOutcome::Ignored {
                    payload: message.payload.clone(),
                };
            }
        };

        info!(%action, command = ?command_line, "Executing display command");

        match self.runner.run(command_line).await {
            ExecOutcome::Success { elapsed } => {
                info!(%action, elapsed_ms = elapsed.as_millis() as u64, "Command completed");
                self.stats.executed.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Executed { action, elapsed }
            }
            ExecOutcome::Failure {
                error,
                combined_output,
                exit_code,
                timed_out,
            } => {
                error!(
                    %action,
                    ?exit_code,
                    timed_out,
                    output = %combined_output,
                    "Error running command: {}",
                    error
                );
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Failed {
                    action,
                    error,
                    combined_output,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionTable, PlatformKey};
    use crate::command::CommandExecutor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every command line and replies with a fixed outcome
    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
        outcome: ExecOutcome,
    }

    impl RecordingRunner {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                outcome: ExecOutcome::Success {
                    elapsed: Duration::from_millis(1),
                },
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                outcome: ExecOutcome::Failure {
                    error: "xset exited with exit status: 1".into(),
                    combined_output: "unable to open display".into(),
                    exit_code: Some(1),
                    timed_out: false,
                },
            })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command_line: &[String]) -> ExecOutcome {
            self.calls.lock().unwrap().push(command_line.to_vec());
            self.outcome.clone()
        }
    }

    fn dispatcher_for(platform: PlatformKey, runner: Arc<RecordingRunner>) -> Dispatcher {
        let spec = ActionTable::builtin().unwrap().resolve(&platform).unwrap();
        Dispatcher::new(spec, runner)
    }

    #[tokio::test]
    async fn test_linux_on_from_either_filter() {
        let runner = RecordingRunner::succeeding();
        let dispatcher = dispatcher_for(PlatformKey::Linux, runner.clone());

        for topic in ["home/monitors/all", "home/monitors/desk-01"] {
            let outcome = dispatcher.dispatch(&InboundMessage::new(topic, &b"on"[..])).await;
            assert!(matches!(
                outcome,
                DispatchOutcome::Executed { action: LogicalAction::TurnOn, .. }
            ));
        }

        let expected: Vec<String> = ["xset", "dpms", "force", "on"].iter().map(|s| s.to_string()).collect();
        assert_eq!(runner.calls(), vec![expected.clone(), expected]);
        assert_eq!(dispatcher.stats().executed(), 2);
    }

    #[tokio::test]
    async fn test_darwin_off() {
        let runner = RecordingRunner::succeeding();
        let dispatcher = dispatcher_for(PlatformKey::Darwin, runner.clone());

        let outcome = dispatcher
            .dispatch(&InboundMessage::new("home/monitors/all", &b"off"[..]))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Executed { action: LogicalAction::TurnOff, .. }
        ));
        assert_eq!(
            runner.calls(),
            vec![vec!["pmset".to_string(), "displaysleepnow".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_unknown_payload_spawns_nothing() {
        let runner = RecordingRunner::succeeding();
        let dispatcher = dispatcher_for(PlatformKey::Linux, runner.clone());

        let outcome = dispatcher
            .dispatch(&InboundMessage::new("home/monitors/all", &b"toggle"[..]))
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::Ignored {
                payload: Bytes::from_static(b"toggle")
            }
        );
        assert!(runner.calls().is_empty());
        assert_eq!(dispatcher.stats().ignored(), 1);
        assert_eq!(dispatcher.stats().executed(), 0);
    }

    #[tokio::test]
    async fn test_repeated_payload_is_not_deduplicated() {
        let runner = RecordingRunner::succeeding();
        let dispatcher = dispatcher_for(PlatformKey::Linux, runner.clone());
        let message = InboundMessage::new("home/monitors/all", &b"on"[..]);

        for _ in 0..3 {
            dispatcher.dispatch(&message).await;
        }

        assert_eq!(runner.calls().len(), 3);
        assert_eq!(dispatcher.stats().executed(), 3);
    }

    #[tokio::test]
    async fn test_failure_carries_diagnostics() {
        let runner = RecordingRunner::failing();
        let dispatcher = dispatcher_for(PlatformKey::Linux, runner.clone());

        let outcome = dispatcher
            .dispatch(&InboundMessage::new("home/monitors/all", &b"off"[..]))
            .await;

        match outcome {
            DispatchOutcome::Failed {
                action,
                error,
                combined_output,
            } => {
                assert_eq!(action, LogicalAction::TurnOff);
                assert!(error.contains("exit status"));
                assert_eq!(combined_output, "unable to open display");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(dispatcher.stats().failed(), 1);
    }

    #[tokio::test]
    async fn test_real_executor_with_alternate_table() {
        let table = ActionTable::from_entries([(
            PlatformKey::Linux,
            crate::action::ActionSpec::new(["true"], ["false"]),
        )])
        .unwrap();
        let spec = table.resolve(&PlatformKey::Linux).unwrap();
        let dispatcher = Dispatcher::new(spec, Arc::new(CommandExecutor::default()));

        let on = dispatcher
            .dispatch(&InboundMessage::new("home/monitors/all", &b"on"[..]))
            .await;
        assert!(matches!(on, DispatchOutcome::Executed { .. }));

        let off = dispatcher
            .dispatch(&InboundMessage::new("home/monitors/all", &b"off"[..]))
            .await;
        assert!(matches!(off, DispatchOutcome::Failed { .. }));
    }
}
