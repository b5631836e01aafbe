//! Routing decision for one inbound envelope: deliver now or enqueue

use std::sync::Arc;

use parley_core::{Envelope, IdentityStore, PendingQueue};
use tracing::{debug, warn};

use crate::error::Result;
use crate::presence::{Lookup, PresenceTable};

/// What happened to a routed envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Written onto the recipient's live connection
    Delivered,
    /// Appended to the recipient's pending queue
    Queued {
        /// The recipient was live but the write failed
        after_failed_delivery: bool,
        /// Sequence number assigned by the queue
        seq: u64,
    },
    /// The recipient identity does not exist
    UnknownRecipient,
}

/// Relay router
#[derive(Clone)]
pub struct Router {
    presence: Arc<PresenceTable>,
    identities: Arc<dyn IdentityStore>,
    pending: Arc<dyn PendingQueue>,
}

impl Router {
    /// Create a router over the shared presence table and stores
    pub fn new(
        presence: Arc<PresenceTable>,
        identities: Arc<dyn IdentityStore>,
        pending: Arc<dyn PendingQueue>,
    ) -> Self {
        Self {
            presence,
            identities,
            pending,
        }
    }

    /// Route one envelope.
    ///
    /// Store failures are returned as errors; the caller decides what the
    /// sender is told.
    pub async fn route(&self, envelope: &Envelope) -> Result<RouteOutcome> {
        // An offline recipient's enqueue finishes before it can register,
        // so its drain always sees the message.
        let handle = match self
            .presence
            .lookup_or_else(&envelope.to, || self.store(envelope, false))
        {
            Lookup::Online(handle) => handle,
            Lookup::Offline(outcome) => return outcome,
        };

        match handle.send_envelope(envelope).await {
            Ok(()) => {
                debug!("Delivered {} -> {} directly", envelope.from, envelope.to);
                Ok(RouteOutcome::Delivered)
            }
            Err(e) => {
                warn!(
                    "Direct delivery {} -> {} failed, queueing instead: {}",
                    envelope.from, envelope.to, e
                );
                self.store(envelope, true)
            }
        }
    }

    fn store(&self, envelope: &Envelope, after_failed_delivery: bool) -> Result<RouteOutcome> {
        if !self.identities.exists(&envelope.to)? {
            debug!("Dropping message for unknown recipient {}", envelope.to);
            return Ok(RouteOutcome::UnknownRecipient);
        }

        let seq = self
            .pending
            .enqueue(&envelope.to, &envelope.from, &envelope.payload)?;
        debug!("Queued {} -> {} as {}", envelope.from, envelope.to, seq);

        Ok(RouteOutcome::Queued {
            after_failed_delivery,
            seq,
        })
    }
}
