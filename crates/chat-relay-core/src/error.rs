//! Error types for the chat relay

use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, Error)]
pub enum RelayError {
    /// Listener could not be started
    #[error("Bind error: {0}")]
    Bind(String),

    /// Read or write failure on the active connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// Bridge missing or stopped when probed
    #[error("Liveness failure: {0}")]
    Liveness(String),

    /// Configuration missing or invalid
    #[error("Config error: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether this error should evict the active connection
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Transport(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}
