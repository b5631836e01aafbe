//! Store contracts consumed by the relay
//!
//! Both stores are durable collaborators of the relay engine. Calls are
//! synchronous; implementations are responsible for their own consistency
//! under concurrent readers and writers on the same key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Envelope;
use crate::types::Identity;

/// Registered identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Public key uploaded at registration
    pub public_key: String,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Create a record registered now
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            created_at: Utc::now(),
        }
    }
}

/// Durable identity -> public key mapping
pub trait IdentityStore: Send + Sync {
    /// Check whether an identity is registered
    fn exists(&self, identity: &Identity) -> Result<bool>;

    /// Public key for an identity, `None` if unknown
    fn get_public_key(&self, identity: &Identity) -> Result<Option<String>>;

    /// Register a public key under a freshly generated identity
    fn create(&self, public_key: &str) -> Result<Identity>;
}

/// One undelivered message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Store-assigned sequence number, increasing in insertion order
    pub seq: u64,
    /// Sender identity
    pub from: Identity,
    /// Recipient identity
    pub to: Identity,
    /// Opaque payload
    pub payload: String,
}

impl QueuedMessage {
    /// The envelope as originally sent
    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            from: self.from.clone(),
            to: self.to.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// Durable per-recipient FIFO of undelivered messages
pub trait PendingQueue: Send + Sync {
    /// Append a message for `recipient`, returning its sequence number
    fn enqueue(&self, recipient: &Identity, sender: &Identity, payload: &str) -> Result<u64>;

    /// All queued messages for `recipient` in insertion order.
    /// Does not remove anything.
    fn drain(&self, recipient: &Identity) -> Result<Vec<QueuedMessage>>;

    /// Remove every queued message for `recipient`
    fn delete_all(&self, recipient: &Identity) -> Result<usize>;

    /// Remove queued messages for `recipient` with `seq <= through`
    fn delete_through(&self, recipient: &Identity, through: u64) -> Result<usize>;

    /// Number of queued messages for `recipient`
    fn len(&self, recipient: &Identity) -> Result<usize>;

    /// Whether nothing is queued for `recipient`
    fn is_empty(&self, recipient: &Identity) -> Result<bool> {
        Ok(self.len(recipient)? == 0)
    }
}
