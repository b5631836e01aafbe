//! Relay configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{RelayError, Result};

/// Default HTTP listen address
pub const DEFAULT_HTTP_ADDRESS: &str = "0.0.0.0:5000";

/// Default WebSocket listen address
pub const DEFAULT_WS_ADDRESS: &str = "0.0.0.0:5001";

/// Default storage path
pub const DEFAULT_STORAGE_PATH: &str = "./relay-data";

/// Server configuration for running a relay node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayServerConfig {
    /// HTTP API listen address (registration and lookup)
    pub http_address: String,
    /// WebSocket relay listen address
    pub ws_address: String,
    /// sled database directory
    pub storage_path: String,
    /// CORS origins for the HTTP API; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            http_address: DEFAULT_HTTP_ADDRESS.to_string(),
            ws_address: DEFAULT_WS_ADDRESS.to_string(),
            storage_path: DEFAULT_STORAGE_PATH.to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

impl RelayServerConfig {
    /// Parse a comma separated origin list, dropping blanks
    pub fn parse_origins(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// HTTP listen address
    pub fn http_socket_addr(&self) -> Result<SocketAddr> {
        parse_addr("http_address", &self.http_address)
    }

    /// WebSocket listen address
    pub fn ws_socket_addr(&self) -> Result<SocketAddr> {
        parse_addr("ws_address", &self.ws_address)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let http = self.http_socket_addr()?;
        let ws = self.ws_socket_addr()?;
        if http.port() != 0 && http == ws {
            return Err(RelayError::Config(
                "http_address and ws_address must differ".to_string(),
            ));
        }
        if self.storage_path.trim().is_empty() {
            return Err(RelayError::Config("storage_path must be set".to_string()));
        }
        Ok(())
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| RelayError::Config(format!("{}: invalid address {:?}: {}", field, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_socket_addr().unwrap().port(), 5000);
        assert_eq!(config.ws_socket_addr().unwrap().port(), 5001);
    }

    #[test]
    fn test_rejects_shared_listener() {
        let config = RelayServerConfig {
            ws_address: DEFAULT_HTTP_ADDRESS.to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_address() {
        let config = RelayServerConfig {
            http_address: "localhost".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert!(RelayServerConfig::parse_origins("").is_empty());
        assert_eq!(
            RelayServerConfig::parse_origins("https://a.example, ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
