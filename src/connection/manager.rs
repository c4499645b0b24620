//! Subscription manager with a persistent broker connection and automatic reconnection

use anyhow::{anyhow, Result};
use display_bridge_shared::{
    defaults,
    state_machine::{self, ConnectionState, ConnectionStateMachine, LifecycleEvent, TransitionResult},
    InboundMessage, TopicFilter,
};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeFilter, SubscribeReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Capacity of the request channel between client handle and event loop
const CLIENT_REQUEST_CAPACITY: usize = 10;

/// Events emitted by the subscription manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Broker accepted the connect handshake
    Connected,
    /// Broker acknowledged every topic filter
    Subscribed { filters: Vec<TopicFilter> },
    /// Connection dropped, a reconnect is scheduled
    Disconnected { reason: String, attempt: u32 },
    /// A message arrived on a subscribed filter
    Received(InboundMessage),
    /// Connection can not be (re)established; no further events follow
    ConnectionFailed { reason: String },
}

/// Configuration for the subscription manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// MQTT client identifier
    pub client_id: String,
    /// Broker hostname
    pub broker_host: String,
    /// Broker port
    pub broker_port: u16,
    /// Keep-alive interval; the client itself determines liveness
    pub keep_alive: Duration,
    /// Topic filters, all bound to the same handler
    pub topics: Vec<TopicFilter>,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Consecutive failed attempts before giving up (0 = never give up)
    pub max_reconnect_attempts: u32,
    /// Inbound queue capacity
    pub queue_capacity: usize,
    /// How long a clean disconnect may take before the task is aborted
    pub shutdown_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_id: defaults::CLIENT_ID_PREFIX.into(),
            broker_host: defaults::BROKER_HOST.into(),
            broker_port: defaults::BROKER_PORT,
            keep_alive: Duration::from_secs(defaults::KEEP_ALIVE_SECS),
            topics: vec![TopicFilter::broadcast()],
            reconnect_delay: Duration::from_millis(defaults::RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(defaults::MAX_RECONNECT_DELAY_MS),
            max_reconnect_attempts: 0,
            queue_capacity: defaults::INBOUND_QUEUE_CAPACITY,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// How the connection task should wind down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownSignal {
    Running,
    /// A DISCONNECT was queued, poll until it is written
    DrainDisconnect,
    /// Not connected, stop right away
    Immediate,
}

/// Owns the broker connection lifecycle
pub struct SubscriptionManager {
    config: ConnectionConfig,
    client: AsyncClient,
    state: Arc<RwLock<ConnectionStateMachine>>,
    /// Channel to receive connection events
    event_rx: mpsc::Receiver<ConnectionEvent>,
    shutdown_tx: watch::Sender<ShutdownSignal>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionManager {
    /// Create a new subscription manager and start the connection loop
    pub fn new(config: ConnectionConfig) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(&config), CLIENT_REQUEST_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::Running);
        let state = Arc::new(RwLock::new(ConnectionStateMachine::new()));

        // Spawn the connection loop
        let task = tokio::spawn(connection_loop(
            config.clone(),
            client.clone(),
            eventloop,
            state.clone(),
            event_tx,
            shutdown_rx,
        ));

        Self {
            config,
            client,
            state,
            event_rx,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.state()
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn topics(&self) -> &[TopicFilter] {
        &self.config.topics
    }

    /// Disconnect from the broker and wait for the connection task to finish
    ///
    /// Messages still queued are dropped. Disconnect errors are logged and
    /// returned but never leave the task running.
    pub async fn shutdown(mut self) -> Result<()> {
        // Unblock a connection task waiting on queue capacity
        self.event_rx.close();

        let previous = {
            let mut fsm = self.state.write().await;
            let previous = fsm.state();
            fsm.process_event(LifecycleEvent::ShutdownRequested);
            previous
        };
        info!(state = %previous, "Disconnecting from broker");

        let mut result = Ok(());
        let signal = match previous {
            ConnectionState::Connected | ConnectionState::Subscribed => {
                match self.client.try_disconnect() {
                    Ok(()) => ShutdownSignal::DrainDisconnect,
                    Err(e) => {
                        result = Err(anyhow!("Failed to request disconnect: {}", e));
                        ShutdownSignal::Immediate
                    }
                }
            }
            _ => ShutdownSignal::Immediate,
        };
        let _ = self.shutdown_tx.send(signal);

        if let Some(mut task) = self.task.take() {
            match timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    result = Err(anyhow!("Connection task failed: {}", e));
                }
                Err(_) => {
                    task.abort();
                    result = Err(anyhow!(
                        "Disconnect did not complete within {}ms",
                        self.config.shutdown_timeout.as_millis()
                    ));
                }
            }
        }

        info!(state = %self.state().await, "Broker connection closed");
        result
    }
}

/// Build client options from the connection config
pub fn mqtt_options(config: &ConnectionConfig) -> MqttOptions {
    let mut options = MqttOptions::new(
        config.client_id.clone(),
        config.broker_host.clone(),
        config.broker_port,
    );
    options.set_keep_alive(config.keep_alive);
    // Subscriptions are re-issued after every reconnect
    options.set_clean_session(true);
    options
}

/// One subscribe request covering every filter, at most once delivery
pub fn subscribe_filters(topics: &[TopicFilter]) -> Vec<SubscribeFilter> {
    topics
        .iter()
        .map(|topic| SubscribeFilter::new(topic.as_str().to_string(), QoS::AtMostOnce))
        .collect()
}

/// Filters the broker refused in a SUBACK
pub fn rejected_filters(topics: &[TopicFilter], codes: &[SubscribeReasonCode]) -> Vec<TopicFilter> {
    let mut rejected: Vec<TopicFilter> = topics
        .iter()
        .zip(codes)
        .filter(|(_, code)| matches!(code, SubscribeReasonCode::Failure))
        .map(|(topic, _)| topic.clone())
        .collect();

    // A short SUBACK leaves the remaining filters unacknowledged
    rejected.extend(topics.iter().skip(codes.len()).cloned());
    rejected
}

/// Exponential backoff capped at `max`
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    std::cmp::min(current.saturating_mul(2), max)
}

/// Apply an event to the shared state machine
async fn transition(
    state: &RwLock<ConnectionStateMachine>,
    event: LifecycleEvent,
) -> TransitionResult {
    let mut fsm = state.write().await;
    let from = fsm.state();
    let result = fsm.process_event(event);
    match &result {
        TransitionResult::Success(to) if *to != from => {
            debug_assert!(state_machine::is_valid_transition(from, *to));
            debug!("Connection state: {} -> {}", from, to);
        }
        TransitionResult::Invalid { from, event } => {
            debug!("Ignoring {:?} in state {}", event, from);
        }
        _ => {}
    }
    result
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: ConnectionConfig,
    client: AsyncClient,
    mut eventloop: EventLoop,
    state: Arc<RwLock<ConnectionStateMachine>>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut shutdown_rx: watch::Receiver<ShutdownSignal>,
) {
    transition(&state, LifecycleEvent::Start).await;
    info!(
        broker = %format!("{}:{}", config.broker_host, config.broker_port),
        client_id = %config.client_id,
        "Connecting to broker"
    );

    let mut reconnect_delay = config.reconnect_delay;
    // Set once ConnectionFailed is sent; the loop then only waits for shutdown
    let mut failed = false;

    loop {
        let polled = tokio::select! {
            polled = eventloop.poll() => polled,
            changed = shutdown_rx.changed() => {
                let signal = match changed {
                    Ok(()) => *shutdown_rx.borrow(),
                    // Manager dropped without a shutdown
                    Err(_) => ShutdownSignal::Immediate,
                };
                if signal == ShutdownSignal::Running {
                    continue;
                }
                if signal == ShutdownSignal::DrainDisconnect {
                    drain_disconnect(&mut eventloop, drain_limit(config.shutdown_timeout)).await;
                }
                transition(&state, LifecycleEvent::DisconnectIssued).await;
                return;
            }
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    warn!("Broker refused connection: {:?}", ack.code);
                    continue;
                }
                if failed || state.read().await.is_shutting_down() {
                    continue;
                }

                reconnect_delay = config.reconnect_delay; // Reset delay
                transition(&state, LifecycleEvent::HandshakeSucceeded).await;
                info!(session_present = ack.session_present, "Connected to broker");
                if event_tx.send(ConnectionEvent::Connected).await.is_err() {
                    // Queue closed by shutdown, let the watch arm drain the DISCONNECT
                    continue;
                }

                if let Err(e) = client.subscribe_many(subscribe_filters(&config.topics)).await {
                    error!("Failed to request subscriptions: {}", e);
                    let _ = event_tx
                        .send(ConnectionEvent::ConnectionFailed {
                            reason: format!("Subscribe request failed: {}", e),
                        })
                        .await;
                    return;
                }
            }

            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if failed {
                    continue;
                }
                let rejected = rejected_filters(&config.topics, &ack.return_codes);
                if !rejected.is_empty() {
                    let names: Vec<&str> = rejected.iter().map(TopicFilter::as_str).collect();
                    error!(filters = ?names, "Broker rejected subscription");
                    let _ = event_tx
                        .send(ConnectionEvent::ConnectionFailed {
                            reason: format!("Subscription rejected for {}", names.join(", ")),
                        })
                        .await;
                    failed = true;
                    continue;
                }

                if let TransitionResult::Success(ConnectionState::Subscribed) =
                    transition(&state, LifecycleEvent::SubscriptionsRegistered).await
                {
                    for topic in &config.topics {
                        info!(filter = %topic, "Subscribed");
                    }
                    let event = ConnectionEvent::Subscribed {
                        filters: config.topics.clone(),
                    };
                    if event_tx.send(event).await.is_err() {
                        continue;
                    }
                }
            }

            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if failed {
                    debug!(topic = %publish.topic, "Dropping message after connection failure");
                    continue;
                }
                let filter = config.topics.iter().find(|f| f.matches(&publish.topic));
                match filter {
                    Some(filter) => debug!(filter = %filter, topic = %publish.topic, "Routing message"),
                    None => {
                        debug!(topic = %publish.topic, "Dropping message outside subscribed filters");
                        continue;
                    }
                }

                transition(&state, LifecycleEvent::MessageReceived).await;
                let message = InboundMessage::new(publish.topic, publish.payload);
                if event_tx.send(ConnectionEvent::Received(message)).await.is_err() {
                    // Receiver closed: the manager is shutting down
                    debug!("Inbound queue closed, dropping message");
                }
            }

            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                transition(&state, LifecycleEvent::DisconnectIssued).await;
                return;
            }

            Ok(_) => {}

            Err(e) => {
                if state.read().await.is_shutting_down() {
                    transition(&state, LifecycleEvent::ConnectionLost).await;
                    return;
                }
                if failed {
                    // Already reported as fatal, nothing to reconnect for
                    debug!("Connection closed after failure: {}", e);
                    transition(&state, LifecycleEvent::ConnectionLost).await;
                    transition(&state, LifecycleEvent::RetriesExhausted).await;
                    return;
                }

                let attempt = match transition(&state, LifecycleEvent::ConnectionLost).await {
                    TransitionResult::Reconnect { attempt } => attempt,
                    _ => return,
                };
                warn!(attempt, "Broker connection error: {}", e);

                if state.read().await.is_reconnect_exhausted(config.max_reconnect_attempts) {
                    transition(&state, LifecycleEvent::RetriesExhausted).await;
                    let _ = event_tx
                        .send(ConnectionEvent::ConnectionFailed {
                            reason: format!(
                                "Giving up after {} attempts: {}",
                                attempt, e
                            ),
                        })
                        .await;
                    return;
                }

                let _ = event_tx
                    .send(ConnectionEvent::Disconnected {
                        reason: e.to_string(),
                        attempt,
                    })
                    .await;

                // Wait before reconnecting, unless a shutdown arrives first
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown_rx.changed() => {
                        transition(&state, LifecycleEvent::DisconnectIssued).await;
                        return;
                    }
                }

                // Exponential backoff
                reconnect_delay = next_backoff(reconnect_delay, config.max_reconnect_delay);
            }
        }
    }
}

/// Time the connection task may spend writing DISCONNECT, kept inside the
/// wait in `SubscriptionManager::shutdown` so the drain reports its own outcome
fn drain_limit(shutdown_timeout: Duration) -> Duration {
    shutdown_timeout / 2
}

/// Poll until the queued DISCONNECT is written or the link drops
async fn drain_disconnect(eventloop: &mut EventLoop, limit: Duration) {
    let drained = timeout(limit, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    })
    .await;

    match drained {
        Ok(Ok(())) => debug!("DISCONNECT written"),
        Ok(Err(e)) => debug!("Connection closed while disconnecting: {}", e),
        Err(_) => warn!("Timed out waiting for DISCONNECT to be written"),
    }
}
