//! Identity type

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Opaque identity token issued by the identity store.
///
/// The relay never interprets the token; it is only compared, hashed and
/// used as a routing key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an existing token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Parse a token received from a client, rejecting empty or
    /// path-like values
    pub fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::InvalidIdentity("empty identity".to_string()));
        }
        if token.contains('/') || token.chars().any(char::is_whitespace) {
            return Err(Error::InvalidIdentity(token.to_string()));
        }
        Ok(Self(token.to_string()))
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get as bytes (store key)
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
