//! Host display actions
//!
//! This module handles:
//! - Detecting the host platform once at startup
//! - The static table of per-platform on/off command lines
//! - Resolving a logical action to a concrete command line

mod platform;
mod table;

pub use platform::PlatformKey;
pub use table::{ActionError, ActionSpec, ActionTable};
