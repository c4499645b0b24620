//! Command execution for the bridge
//!
//! This module handles:
//! - Spawning display commands and classifying their outcome
//! - Dispatching inbound messages through payload interpretation,
//!   action lookup and execution

mod dispatcher;
mod executor;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use executor::{CommandExecutor, ExecutorConfig};
