//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Static configuration consumed at engine construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The broadcast channel every connected client subscribes to; state
    /// updates and per-user channel names are scoped under it.
    pub global_channel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_channel: "global".to_string(),
        }
    }
}

impl Config {
    pub fn new(global_channel: impl Into<String>) -> Self {
        Self {
            global_channel: global_channel.into(),
        }
    }
}
