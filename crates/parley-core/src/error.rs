//! Error types for Parley core

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Durable store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Identity token is not usable
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Could not allocate a fresh identity
    #[error("Identity space exhausted after {attempts} attempts")]
    IdentityExhausted { attempts: u32 },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
