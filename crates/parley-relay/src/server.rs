//! Relay facade tying presence, stores and sessions together

use std::sync::Arc;

use parley_core::{Identity, IdentityStore, PendingQueue};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::connection::ConnectionId;
use crate::error::Result;
use crate::presence::PresenceTable;
use crate::router::Router;
use crate::session::{CloseReason, Session, SessionSummary};
use crate::storage::{MemoryIdentityStore, MemoryPendingQueue, SledIdentityStore, SledPendingQueue};
use crate::transport::{FrameSink, FrameStream};

/// Relay events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// An identity came online
    SessionOpened {
        /// Identity
        identity: Identity,
        /// Connection id
        connection_id: ConnectionId,
    },
    /// A connection was refused before registration
    SessionRejected {
        /// Claimed identity
        identity: Identity,
        /// Why
        reason: CloseReason,
    },
    /// Queued messages were delivered on connect
    Drained {
        /// Recipient
        identity: Identity,
        /// Number of messages delivered
        count: usize,
    },
    /// A message was written onto a live connection
    Delivered {
        /// Sender as supplied by the client
        from: Identity,
        /// Recipient
        to: Identity,
    },
    /// A message was stored for later delivery
    Queued {
        /// Sender as supplied by the client
        from: Identity,
        /// Recipient
        to: Identity,
        /// Queue sequence number
        seq: u64,
    },
    /// A session finished
    SessionClosed {
        /// Identity
        identity: Identity,
        /// Connection id
        connection_id: ConnectionId,
        /// Why
        reason: CloseReason,
    },
}

/// Relay
pub struct Relay {
    presence: Arc<PresenceTable>,
    identities: Arc<dyn IdentityStore>,
    pending: Arc<dyn PendingQueue>,
    router: Router,
    event_tx: Option<mpsc::UnboundedSender<RelayEvent>>,
}

impl Relay {
    /// Create a relay over the given stores
    pub fn new(identities: Arc<dyn IdentityStore>, pending: Arc<dyn PendingQueue>) -> Self {
        let presence = Arc::new(PresenceTable::new());
        let router = Router::new(presence.clone(), identities.clone(), pending.clone());
        Self {
            presence,
            identities,
            pending,
            router,
            event_tx: None,
        }
    }

    /// Create a relay with in-memory stores
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(MemoryPendingQueue::new()),
        )
    }

    /// Create a relay backed by an open sled database
    pub fn open(db: &sled::Db) -> Result<Self> {
        let identities = SledIdentityStore::new(db)?;
        let pending = SledPendingQueue::new(db)?;
        Ok(Self::new(Arc::new(identities), Arc::new(pending)))
    }

    /// Set event channel
    pub fn set_event_channel(&mut self, tx: mpsc::UnboundedSender<RelayEvent>) {
        self.event_tx = Some(tx);
    }

    /// Install a fresh event channel and return its receiving end
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RelayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.set_event_channel(tx);
        rx
    }

    /// Presence table
    pub fn presence(&self) -> &Arc<PresenceTable> {
        &self.presence
    }

    /// Identity store
    pub fn identities(&self) -> &Arc<dyn IdentityStore> {
        &self.identities
    }

    /// Pending message queue
    pub fn pending(&self) -> &Arc<dyn PendingQueue> {
        &self.pending
    }

    /// Router
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Number of identities with a live session
    pub fn online_count(&self) -> usize {
        self.presence.len()
    }

    /// Whether `identity` has a live session
    pub fn is_online(&self, identity: &Identity) -> bool {
        self.presence.lookup(identity).is_some()
    }

    pub(crate) fn emit(&self, event: RelayEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run a session for an accepted connection claiming `identity`.
    ///
    /// Returns once the connection is closed.
    #[instrument(skip(self, sink, stream), fields(identity = %identity))]
    pub async fn accept<W, R>(&self, identity: Identity, sink: W, stream: R) -> SessionSummary
    where
        W: FrameSink + 'static,
        R: FrameStream,
    {
        Session::new(self, identity, sink, stream).run().await
    }
}
