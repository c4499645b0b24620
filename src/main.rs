mod action;
mod command;
mod config;
mod connection;
mod error;

use action::{ActionSpec, ActionTable, PlatformKey};
use clap::Parser;
use command::{CommandExecutor, DispatchOutcome, Dispatcher};
use config::{Args, FailurePolicy};
use connection::{ClientIdentity, ConnectionEvent, SubscriptionManager};
use error::BridgeError;
use std::future::Future;
use std::sync::Arc;
use tokio::signal;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let code = match run(args).await {
        Ok(()) => 0,
        Err(e) => {
            error!(kind = ?e.kind(), "{}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

/// Start the bridge and run until a termination signal or a fatal error
async fn run(args: Args) -> Result<(), BridgeError> {
    // Everything that can fail without touching the network comes first
    let platform = PlatformKey::current();
    let table = ActionTable::builtin()?;
    let spec = resolve_actions(&table, &platform)?;

    let identity = ClientIdentity::detect().map_err(BridgeError::Hostname)?;
    let config = args.into_config(&identity)?;

    let executor = Arc::new(CommandExecutor::new(config.executor.clone()));
    let dispatcher = Dispatcher::new(spec, executor);
    let manager = SubscriptionManager::new(config.connection.clone());

    info!("Starting up mqtt listener with client id [{}]", manager.client_id());
    info!(
        "  Broker: {}:{}",
        config.connection.broker_host, config.connection.broker_port
    );
    for topic in manager.topics() {
        info!("  Topic: {}", topic);
    }

    supervise(manager, &dispatcher, config.command_failure, shutdown_signal()).await
}

/// Resolve the host's action spec once, before any connection is attempted
fn resolve_actions(table: &ActionTable, platform: &PlatformKey) -> Result<ActionSpec, BridgeError> {
    let spec = table.resolve(platform)?;
    info!(
        "Using commands for {}: on={:?} off={:?}",
        platform, spec.on_command, spec.off_command
    );
    Ok(spec)
}

/// Main event loop: dispatch messages until shutdown, then disconnect
async fn supervise(
    mut manager: SubscriptionManager,
    dispatcher: &Dispatcher,
    policy: FailurePolicy,
    shutdown: impl Future<Output = ()>,
) -> Result<(), BridgeError> {
    tokio::pin!(shutdown);

    let outcome = loop {
        // The signal is only observed between messages, so a running
        // command always finishes before the disconnect starts.
        let event = tokio::select! {
            _ = &mut shutdown => break Ok(()),
            event = manager.recv() => event,
        };

        match event {
            Some(ConnectionEvent::Connected) => {
                debug!("Broker handshake complete");
            }
            Some(ConnectionEvent::Subscribed { filters }) => {
                info!("Listening on {} topic filter(s)", filters.len());
            }
            Some(ConnectionEvent::Disconnected { reason, attempt }) => {
                warn!("Disconnected (attempt {}): {}, reconnecting", attempt, reason);
            }
            Some(ConnectionEvent::Received(message)) => {
                let outcome = dispatcher.dispatch(&message).await;
                if let Err(e) = apply_policy(outcome, policy) {
                    break Err(e);
                }
            }
            Some(ConnectionEvent::ConnectionFailed { reason }) => {
                break Err(BridgeError::Connection(reason));
            }
            None => {
                break Err(BridgeError::Connection("Subscription manager closed".into()));
            }
        }
    };

    let stats = dispatcher.stats();
    info!(
        executed = stats.executed(),
        ignored = stats.ignored(),
        failed = stats.failed(),
        "Shutting down"
    );

    if let Err(e) = manager.shutdown().await {
        error!("Error while disconnecting: {:#}", e);
    }

    outcome
}

/// Decide whether a dispatch outcome ends the process
fn apply_policy(outcome: DispatchOutcome, policy: FailurePolicy) -> Result<(), BridgeError> {
    match (outcome, policy) {
        (
            DispatchOutcome::Failed {
                action,
                error,
                combined_output,
            },
            FailurePolicy::Exit,
        ) => Err(BridgeError::Command {
            action: action.to_string(),
            error,
            output: combined_output,
        }),
        (DispatchOutcome::Failed { .. }, FailurePolicy::Continue) => {
            warn!("Continuing after failed display command");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
