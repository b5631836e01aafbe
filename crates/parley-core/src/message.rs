//! Wire envelopes exchanged over a relay connection
//!
//! Every frame on the wire is a JSON object. Clients send [`Envelope`]s;
//! the relay forwards envelopes unchanged and reports problems with
//! [`ErrorEnvelope`]s.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Identity;

/// Unknown identity on connect or unknown recipient on send
pub const USER_NOT_FOUND: &str = "User not found";

/// The identity already has a live session
pub const USER_ALREADY_CONNECTED: &str = "User connected from another location";

/// Inbound frame is not an envelope
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";

/// Unknown route or resource
pub const NOT_FOUND: &str = "Not Found";

/// Store or other internal failure
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// The recipient is offline and the durable queue rejected the message
pub const MESSAGE_NOT_QUEUED: &str = "Message could not be queued";

/// Addressed message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender identity
    pub from: Identity,
    /// Recipient identity
    pub to: Identity,
    /// Opaque payload, never inspected by the relay
    pub payload: String,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(from: impl Into<Identity>, to: impl Into<Identity>, payload: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            payload: payload.into(),
        }
    }

    /// Decode one inbound frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(frame)?)
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error report sent to a connected client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Short, stable error string
    pub error: String,
    /// Optional human readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorEnvelope {
    /// Create an error envelope without detail
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: None,
        }
    }

    /// Attach detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// `User not found`
    pub fn user_not_found() -> Self {
        Self::new(USER_NOT_FOUND)
    }

    /// `User connected from another location`
    pub fn already_connected() -> Self {
        Self::new(USER_ALREADY_CONNECTED)
    }

    /// `Invalid message format`
    pub fn invalid_format() -> Self {
        Self::new(INVALID_MESSAGE_FORMAT)
    }

    /// `Not Found`
    pub fn not_found() -> Self {
        Self::new(NOT_FOUND)
    }

    /// `Internal Server Error` with detail
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_SERVER_ERROR).with_detail(detail)
    }

    /// `Message could not be queued` with detail
    pub fn not_queued(detail: impl Into<String>) -> Self {
        Self::new(MESSAGE_NOT_QUEUED).with_detail(detail)
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
