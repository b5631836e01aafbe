//! Relay error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// The connection behind a handle is gone
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transport read/write failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Durable store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Core error
    #[error(transparent)]
    Core(#[from] parley_core::Error),
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => RelayError::ConnectionClosed,
            other => RelayError::Transport(other.to_string()),
        }
    }
}

impl From<sled::Error> for RelayError {
    fn from(err: sled::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}
