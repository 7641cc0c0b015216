//! Relay configuration

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default listen address (loopback only)
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1";
/// Default listen port
pub const DEFAULT_LISTEN_PORT: u16 = 2096;
/// Default heartbeat period in milliseconds
pub const DEFAULT_HEARTBEAT_PERIOD_MS: u64 = 500;
/// Positional audio tag appended to chat by the host
pub const DEFAULT_AUDIO_TAG_MARKER: &str = "~w";

/// Configuration for the relay bridge
///
/// Every field has a default, so a partial JSON file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    /// Address the listener binds to (default: 127.0.0.1)
    pub listen_address: String,
    /// Port the listener binds to (default: 2096)
    pub listen_port: u16,
    /// Heartbeat period in milliseconds (default: 500)
    pub heartbeat_period_ms: u64,
    /// Marker that starts a positional audio suffix in chat text (default: "~w")
    pub audio_tag_marker: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.into(),
            listen_port: DEFAULT_LISTEN_PORT,
            heartbeat_period_ms: DEFAULT_HEARTBEAT_PERIOD_MS,
            audio_tag_marker: DEFAULT_AUDIO_TAG_MARKER.into(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        Self::from_json(&text)
    }

    /// Parse configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let config: RelayConfig = serde_json::from_str(text)?;
        if config.heartbeat_period_ms == 0 {
            return Err(RelayError::Config(
                "heartbeatPeriodMs must be greater than zero".into(),
            ));
        }
        Ok(config)
    }

    /// Create config listening on a custom address
    pub fn with_listen(address: impl Into<String>, port: u16) -> Self {
        Self {
            listen_address: address.into(),
            listen_port: port,
            ..Default::default()
        }
    }

    /// `address:port` string for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }

    /// Heartbeat period as a duration
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }
}
