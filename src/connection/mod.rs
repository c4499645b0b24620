//! Broker connection management
//!
//! This module handles:
//! - The persistent MQTT connection with automatic reconnection and backoff
//! - Subscribing every topic filter after each (re)connect
//! - Pushing inbound messages into a bounded queue
//! - Client identity generation

mod identity;
mod manager;

pub use identity::ClientIdentity;
pub use manager::{ConnectionConfig, ConnectionEvent, SubscriptionManager};
