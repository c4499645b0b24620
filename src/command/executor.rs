//! Command executor - spawns a display command and classifies the outcome

use async_trait::async_trait;
use display_bridge_shared::defaults;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Longest combined output kept for diagnostics
const MAX_OUTPUT_CHARS: usize = 4096;

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound for a single command, the child is killed after this
    pub timeout: Duration,
    /// Combined output beyond this many characters is truncated
    pub max_output_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(defaults::COMMAND_TIMEOUT_MS),
            max_output_chars: MAX_OUTPUT_CHARS,
        }
    }
}

/// Result of running one command line
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    /// Process exited with status 0
    Success { elapsed: Duration },
    /// Process exited non-zero, failed to start, or timed out
    Failure {
        error: String,
        /// stdout followed by stderr, only gathered on failure
        combined_output: String,
        exit_code: Option<i32>,
        timed_out: bool,
    },
}

impl ExecOutcome {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecOutcome::Success { .. })
    }

    fn failure(error: impl Into<String>) -> Self {
        ExecOutcome::Failure {
            error: error.into(),
            combined_output: String::new(),
            exit_code: None,
            timed_out: false,
        }
    }
}

/// Anything that can run a resolved command line
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command line to completion. Never panics on bad input.
    async fn run(&self, command_line: &[String]) -> ExecOutcome;
}

/// Runs commands as child processes, one process per call, no retry
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    /// Create a new command executor
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Spawn the command line and wait for it to exit
    pub async fn execute(&self, command_line: &[String]) -> ExecOutcome {
        let (program, args) = match command_line.split_first() {
            Some(parts) => parts,
            None => return ExecOutcome::failure("Empty command line"),
        };

        let start = Instant::now();
        debug!(program = %program, ?args, "Spawning command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => return ExecOutcome::failure(format!("Failed to start {}: {}", program, e)),
        };

        // Dropping the wait future on timeout kills the child
        match timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => ExecOutcome::Success {
                elapsed: start.elapsed(),
            },
            Ok(Ok(output)) => ExecOutcome::Failure {
                error: format!("{} exited with {}", program, output.status),
                combined_output: combine_output(
                    &output.stdout,
                    &output.stderr,
                    self.config.max_output_chars,
                ),
                exit_code: output.status.code(),
                timed_out: false,
            },
            Ok(Err(e)) => ExecOutcome::failure(format!("Failed waiting for {}: {}", program, e)),
            Err(_) => ExecOutcome::Failure {
                error: format!(
                    "{} timed out after {}ms",
                    program,
                    self.config.timeout.as_millis()
                ),
                combined_output: String::new(),
                exit_code: None,
                timed_out: true,
            },
        }
    }
}

#[async_trait]
impl CommandRunner for CommandExecutor {
    async fn run(&self, command_line: &[String]) -> ExecOutcome {
        self.execute(command_line).await
    }
}

/// Join stdout and stderr into one diagnostic string
fn combine_output(stdout: &[u8], stderr: &[u8], max_chars: usize) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(stderr));
    truncate_output(combined.trim(), max_chars)
}

fn truncate_output(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... [truncated]", &s[..idx]),
        None => s.to_string(),
    }
}
