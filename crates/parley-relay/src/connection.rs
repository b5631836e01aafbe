//! Live connection handles
//!
//! A [`ConnectionHandle`] is the writable end of one client connection. It
//! is shared between the owning session and every router that looks the
//! identity up in the presence table, so all writes go through a single
//! async mutex: at most one frame is in flight per connection.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parley_core::{Envelope, ErrorEnvelope, Identity};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::transport::FrameSink;

/// Unique id of one accepted connection
pub type ConnectionId = Uuid;

struct HandleInner {
    id: ConnectionId,
    identity: Identity,
    writer: Mutex<Box<dyn FrameSink>>,
    closed: AtomicBool,
}

/// Shared, cloneable handle to a live connection
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Wrap the writable half of a connection owned by `identity`
    pub fn new(identity: Identity, sink: impl FrameSink + 'static) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                identity,
                writer: Mutex::new(Box::new(sink)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Owning identity
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Whether the connection is known to be gone
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Mark the connection as gone; later writes fail fast
    pub fn mark_closed(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    /// Whether two handles refer to the same connection
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Take the exclusive writer, waiting for any write in progress
    pub async fn writer(&self) -> ExclusiveWriter<'_> {
        ExclusiveWriter {
            inner: &self.inner,
            sink: self.inner.writer.lock().await,
        }
    }

    /// Write an envelope
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.writer().await.send_envelope(envelope).await
    }

    /// Write an error envelope
    pub async fn send_error(&self, error: &ErrorEnvelope) -> Result<()> {
        self.writer().await.send_error(error).await
    }

    /// Mark closed and close the underlying transport
    pub async fn close(&self) {
        self.mark_closed();
        let mut sink = self.inner.writer.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Closing connection {} failed: {}", self.inner.id, e);
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("identity", &self.inner.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Exclusive write access to one connection.
///
/// Other writers wait until this guard is dropped.
pub struct ExclusiveWriter<'a> {
    inner: &'a HandleInner,
    sink: MutexGuard<'a, Box<dyn FrameSink>>,
}

impl ExclusiveWriter<'_> {
    /// Write an envelope
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let text = envelope.encode()?;
        self.send_text(text).await
    }

    /// Write an error envelope
    pub async fn send_error(&mut self, error: &ErrorEnvelope) -> Result<()> {
        let text = error.encode()?;
        self.send_text(text).await
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RelayError::ConnectionClosed);
        }
        match self.sink.send_text(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // A failed write leaves the transport in an unknown state
                self.inner.closed.store(true, Ordering::Release);
                Err(e)
            }
        }
    }
}
