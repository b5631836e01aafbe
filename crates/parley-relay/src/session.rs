//! Per-connection session state machine
//!
//! ```text
//! Connecting -> Authenticating -> Registering -> Draining -> Relaying -> Closing -> Closed
//!                     |                |             |
//!                     +----------------+-------------+---------------------> Closing
//! ```
//!
//! A session owns one connection from the moment the transport handshake
//! is done until the connection is closed. Once registered in the presence
//! table it holds a [`PresenceGuard`], so the identity is deregistered on
//! every exit path.

use std::sync::Arc;

use parley_core::{Envelope, ErrorEnvelope, Identity};
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionHandle, ConnectionId, ExclusiveWriter};
use crate::presence::{PresenceTable, Registration};
use crate::router::RouteOutcome;
use crate::server::{Relay, RelayEvent};
use crate::transport::{FrameSink, FrameStream};

/// Session lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport handshake in progress
    Connecting,
    /// Checking the claimed identity
    Authenticating,
    /// Claiming the identity in the presence table
    Registering,
    /// Delivering queued messages
    Draining,
    /// Reading and routing inbound frames
    Relaying,
    /// Tearing down
    Closing,
    /// Done
    Closed,
}

/// Why a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The claimed identity is not registered
    UnknownIdentity,
    /// The identity already had a live session
    DuplicateSession,
    /// Queued messages could not be fetched
    DrainFailed,
    /// The identity store failed during authentication
    StoreError,
    /// The client closed the connection
    PeerClosed,
    /// A read or write on the connection failed
    TransportError,
}

/// Outcome of a finished session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    /// Identity the connection claimed
    pub identity: Identity,
    /// Connection id
    pub connection_id: ConnectionId,
    /// Why the session ended
    pub close_reason: CloseReason,
    /// Queued messages delivered on connect
    pub drained: usize,
    /// Inbound envelopes delivered or queued
    pub relayed: usize,
}

/// Holds an identity's presence entry; dropping it takes the identity
/// offline
struct PresenceGuard {
    presence: Arc<PresenceTable>,
    handle: ConnectionHandle,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.handle.mark_closed();
        self.presence.deregister(self.handle.identity());
    }
}

pub(crate) struct Session<'r, R> {
    relay: &'r Relay,
    identity: Identity,
    handle: ConnectionHandle,
    stream: R,
    state: SessionState,
    registration: Option<PresenceGuard>,
    drained: usize,
    relayed: usize,
}

impl<'r, R: FrameStream> Session<'r, R> {
    pub(crate) fn new(
        relay: &'r Relay,
        identity: Identity,
        sink: impl FrameSink + 'static,
        stream: R,
    ) -> Self {
        let handle = ConnectionHandle::new(identity.clone(), sink);
        Self {
            relay,
            identity,
            handle,
            stream,
            state: SessionState::Connecting,
            registration: None,
            drained: 0,
            relayed: 0,
        }
    }

    /// Drive the session until the connection is closed
    pub(crate) async fn run(mut self) -> SessionSummary {
        let close_reason = self.serve().await;

        self.transition(SessionState::Closing);
        self.registration.take();
        self.handle.close().await;
        self.transition(SessionState::Closed);

        info!(
            "Session {} for {} closed: {:?} (drained {}, relayed {})",
            self.handle.id(),
            self.identity,
            close_reason,
            self.drained,
            self.relayed
        );
        self.relay.emit(RelayEvent::SessionClosed {
            identity: self.identity.clone(),
            connection_id: self.handle.id(),
            reason: close_reason,
        });

        SessionSummary {
            identity: self.identity,
            connection_id: self.handle.id(),
            close_reason,
            drained: self.drained,
            relayed: self.relayed,
        }
    }

    async fn serve(&mut self) -> CloseReason {
        self.transition(SessionState::Authenticating);
        match self.relay.identities().exists(&self.identity) {
            Ok(true) => {}
            Ok(false) => {
                warn!("Rejecting connection for unknown identity {}", self.identity);
                let _ = self.handle.send_error(&ErrorEnvelope::user_not_found()).await;
                return self.reject(CloseReason::UnknownIdentity);
            }
            Err(e) => {
                error!("Identity lookup for {} failed: {}", self.identity, e);
                let _ = self
                    .handle
                    .send_error(&ErrorEnvelope::internal(e.to_string()))
                    .await;
                return self.reject(CloseReason::StoreError);
            }
        }

        // Hold the writer from registration until the drain is done, so
        // live senders queue up behind the stored messages.
        self.transition(SessionState::Registering);
        let handle = self.handle.clone();
        let mut writer = handle.writer().await;

        match self.relay.presence().register(handle.clone()) {
            Registration::Registered => {
                self.registration = Some(PresenceGuard {
                    presence: Arc::clone(self.relay.presence()),
                    handle: handle.clone(),
                });
                info!("Session {} opened for {}", handle.id(), self.identity);
                self.relay.emit(RelayEvent::SessionOpened {
                    identity: self.identity.clone(),
                    connection_id: handle.id(),
                });
            }
            Registration::AlreadyPresent => {
                warn!("{} is already connected, rejecting {}", self.identity, handle.id());
                let _ = writer.send_error(&ErrorEnvelope::already_connected()).await;
                return self.reject(CloseReason::DuplicateSession);
            }
        }

        self.transition(SessionState::Draining);
        if let Err(reason) = self.drain(&mut writer).await {
            // Senders waiting on the writer must find the handle closed
            // and fall back to the queue.
            self.registration.take();
            return reason;
        }
        drop(writer);

        self.transition(SessionState::Relaying);
        self.relay_loop().await
    }

    /// Deliver every queued message, then delete what was delivered
    async fn drain(&mut self, writer: &mut ExclusiveWriter<'_>) -> Result<(), CloseReason> {
        let batch = match self.relay.pending().drain(&self.identity) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Fetching queued messages for {} failed: {}", self.identity, e);
                let _ = writer.send_error(&ErrorEnvelope::internal(e.to_string())).await;
                return Err(CloseReason::DrainFailed);
            }
        };

        let Some(last_seq) = batch.last().map(|m| m.seq) else {
            return Ok(());
        };

        for (sent, message) in batch.iter().enumerate() {
            if let Err(e) = writer.send_envelope(&message.to_envelope()).await {
                warn!(
                    "Drain for {} interrupted after {} of {} messages, keeping them queued: {}",
                    self.identity,
                    sent,
                    batch.len(),
                    e
                );
                return Err(CloseReason::TransportError);
            }
        }

        self.drained = batch.len();
        match self.relay.pending().delete_through(&self.identity, last_seq) {
            Ok(removed) => debug!("Drained {} messages for {}", removed, self.identity),
            Err(e) => error!(
                "Delivered {} queued messages to {} but could not delete them: {}",
                batch.len(),
                self.identity,
                e
            ),
        }
        self.relay.emit(RelayEvent::Drained {
            identity: self.identity.clone(),
            count: batch.len(),
        });
        Ok(())
    }

    async fn relay_loop(&mut self) -> CloseReason {
        loop {
            let frame = match self.stream.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return CloseReason::PeerClosed,
                Err(e) => {
                    debug!("Read from {} failed: {}", self.identity, e);
                    return CloseReason::TransportError;
                }
            };

            let envelope = match Envelope::decode(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!("Malformed frame from {}: {}", self.identity, e);
                    if self.reply(ErrorEnvelope::invalid_format()).await.is_err() {
                        return CloseReason::TransportError;
                    }
                    continue;
                }
            };

            let reply = match self.relay.router().route(&envelope).await {
                Ok(RouteOutcome::Delivered) => {
                    self.relayed += 1;
                    self.relay.emit(RelayEvent::Delivered {
                        from: envelope.from,
                        to: envelope.to,
                    });
                    None
                }
                Ok(RouteOutcome::Queued { seq, .. }) => {
                    self.relayed += 1;
                    self.relay.emit(RelayEvent::Queued {
                        from: envelope.from,
                        to: envelope.to,
                        seq,
                    });
                    None
                }
                Ok(RouteOutcome::UnknownRecipient) => Some(ErrorEnvelope::user_not_found()),
                Err(e) => {
                    error!(
                        "Could not relay message {} -> {}: {}",
                        envelope.from, envelope.to, e
                    );
                    Some(ErrorEnvelope::not_queued(e.to_string()))
                }
            };

            if let Some(reply) = reply {
                if self.reply(reply).await.is_err() {
                    return CloseReason::TransportError;
                }
            }
        }
    }

    async fn reply(&self, error: ErrorEnvelope) -> crate::Result<()> {
        self.handle.send_error(&error).await
    }

    fn reject(&self, reason: CloseReason) -> CloseReason {
        self.relay.emit(RelayEvent::SessionRejected {
            identity: self.identity.clone(),
            reason,
        });
        reason
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            "Session {} ({}): {:?} -> {:?}",
            self.handle.id(),
            self.identity,
            self.state,
            next
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parley_core::{IdentityStore, PendingQueue, QueuedMessage};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::storage::{MemoryIdentityStore, MemoryPendingQueue};
    use crate::transport::mock::{self, Peer};

    struct Harness {
        relay: Arc<Relay>,
        events: mpsc::UnboundedReceiver<RelayEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let identities = MemoryIdentityStore::new();
            for name in ["alice", "bob", "carol"] {
                identities.insert(Identity::new(name), &format!("key-{}", name));
            }
            Self::with_stores(Arc::new(identities), Arc::new(MemoryPendingQueue::new()))
        }

        fn with_stores(
            identities: Arc<dyn IdentityStore>,
            pending: Arc<dyn PendingQueue>,
        ) -> Self {
            let mut relay = Relay::new(identities, pending);
            let events = relay.subscribe();
            Self {
                relay: Arc::new(relay),
                events,
            }
        }

        fn connect(&self, identity: &str) -> (JoinHandle<SessionSummary>, Peer) {
            let (sink, stream, peer) = mock::pair();
            (self.spawn(identity, sink, stream), peer)
        }

        fn spawn(
            &self,
            identity: &str,
            sink: mock::ChannelSink,
            stream: mock::ChannelStream,
        ) -> JoinHandle<SessionSummary> {
            let relay = Arc::clone(&self.relay);
            let identity = Identity::new(identity);
            tokio::spawn(async move { relay.accept(identity, sink, stream).await })
        }

        async fn wait_for(&mut self, matches: impl Fn(&RelayEvent) -> bool) -> RelayEvent {
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                    .await
                    .expect("timed out waiting for relay event")
                    .expect("event channel closed");
                if matches(&event) {
                    return event;
                }
            }
        }

        async fn opened(&mut self, identity: &str) {
            let identity = Identity::new(identity);
            self.wait_for(|e| matches!(e, RelayEvent::SessionOpened { identity: i, .. } if *i == identity))
                .await;
        }

        async fn queued(&mut self) {
            self.wait_for(|e| matches!(e, RelayEvent::Queued { .. })).await;
        }
    }

    async fn finish(task: JoinHandle<SessionSummary>) -> SessionSummary {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("session did not finish")
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_identity_is_rejected() {
        let h = Harness::new();
        let (task, mut peer) = h.connect("random-user");

        assert_eq!(peer.next_json().await["error"], "User not found");
        assert!(peer.closed().await);

        let summary = finish(task).await;
        assert_eq!(summary.close_reason, CloseReason::UnknownIdentity);
        assert_eq!(h.relay.online_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_session_is_rejected() {
        let mut h = Harness::new();
        let (_first, mut first_peer) = h.connect("alice");
        h.opened("alice").await;

        let (second, mut second_peer) = h.connect("alice");
        assert_eq!(
            second_peer.next_json().await["error"],
            "User connected from another location"
        );
        assert!(second_peer.closed().await);
        assert_eq!(finish(second).await.close_reason, CloseReason::DuplicateSession);

        // The first session is still registered and reachable
        assert!(h.relay.is_online(&Identity::new("alice")));
        let (_bob, bob_peer) = h.connect("bob");
        h.opened("bob").await;
        bob_peer.send_envelope(&Envelope::new("bob", "alice", "still here"));
        assert_eq!(first_peer.next_json().await["payload"], "still here");
    }

    #[tokio::test]
    async fn test_concurrent_connects_single_winner() {
        let mut h = Harness::new();
        let (a, mut peer_a) = h.connect("carol");
        let (b, mut peer_b) = h.connect("carol");

        h.wait_for(|e| matches!(e, RelayEvent::SessionRejected { .. }))
            .await;
        peer_a.hang_up();
        peer_b.hang_up();

        let reasons = [finish(a).await.close_reason, finish(b).await.close_reason];
        assert_eq!(
            reasons
                .iter()
                .filter(|r| **r == CloseReason::DuplicateSession)
                .count(),
            1
        );
        assert!(reasons.contains(&CloseReason::PeerClosed));

        let rejected = match (peer_a.try_next(), peer_b.try_next()) {
            (Some(frame), None) | (None, Some(frame)) => frame,
            other => panic!("expected exactly one error frame, got {:?}", other),
        };
        assert!(rejected.contains("User connected from another location"));
        assert_eq!(h.relay.online_count(), 0);
    }

    #[tokio::test]
    async fn test_store_and_forward_round_trip() {
        let mut h = Harness::new();
        let (_alice, alice) = h.connect("alice");
        h.opened("alice").await;

        alice.send_envelope(&Envelope::new("alice", "bob", "m1"));
        h.queued().await;
        alice.send_envelope(&Envelope::new("alice", "bob", "m2"));
        h.queued().await;

        let (bob_task, mut bob) = h.connect("bob");
        assert_eq!(bob.next_json().await["payload"], "m1");
        assert_eq!(bob.next_json().await["payload"], "m2");
        h.wait_for(|e| matches!(e, RelayEvent::Drained { count: 2, .. })).await;
        assert!(h.relay.pending().is_empty(&Identity::new("bob")).unwrap());

        bob.hang_up();
        let summary = finish(bob_task).await;
        assert_eq!(summary.drained, 2);
        assert_eq!(summary.close_reason, CloseReason::PeerClosed);

        // Reconnecting without new sends delivers nothing old
        let (_bob_again, mut bob) = h.connect("bob");
        h.opened("bob").await;
        alice.send_envelope(&Envelope::new("alice", "bob", "live"));
        assert_eq!(bob.next_json().await["payload"], "live");
    }

    #[tokio::test]
    async fn test_direct_delivery_leaves_queue_empty() {
        let mut h = Harness::new();
        let (_bob, mut bob) = h.connect("bob");
        h.opened("bob").await;
        let (_alice, alice) = h.connect("alice");
        h.opened("alice").await;

        let envelope = Envelope::new("alice", "bob", "hello");
        alice.send_envelope(&envelope);

        assert_eq!(bob.next_json().await, serde_json::to_value(&envelope).unwrap());
        h.wait_for(|e| matches!(e, RelayEvent::Delivered { .. })).await;
        assert!(h.relay.pending().is_empty(&Identity::new("bob")).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_recipient_gets_error() {
        let mut h = Harness::new();
        let (_alice, mut alice) = h.connect("alice");
        h.opened("alice").await;

        alice.send_envelope(&Envelope::new("alice", "random-user-new", "hello"));

        assert_eq!(alice.next_json().await, serde_json::json!({"error": "User not found"}));
        assert!(h
            .relay
            .pending()
            .is_empty(&Identity::new("random-user-new"))
            .unwrap());
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_session_open() {
        let mut h = Harness::new();
        let (_bob, mut bob) = h.connect("bob");
        h.opened("bob").await;
        let (_alice, mut alice) = h.connect("alice");
        h.opened("alice").await;

        alice.send("invalid");
        assert_eq!(
            alice.next_json().await,
            serde_json::json!({"error": "Invalid message format"})
        );

        alice.send_envelope(&Envelope::new("alice", "bob", "after error"));
        assert_eq!(bob.next_json().await["payload"], "after error");
    }

    #[tokio::test]
    async fn test_teardown_deregisters() {
        let mut h = Harness::new();
        let (task, mut alice) = h.connect("alice");
        h.opened("alice").await;
        assert!(h.relay.is_online(&Identity::new("alice")));

        alice.hang_up();
        assert_eq!(finish(task).await.close_reason, CloseReason::PeerClosed);
        assert!(!h.relay.is_online(&Identity::new("alice")));

        let (_again, _alice) = h.connect("alice");
        h.opened("alice").await;
        assert_eq!(h.relay.online_count(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_drain_keeps_messages() {
        let mut h = Harness::new();
        let bob = Identity::new("bob");
        let alice = Identity::new("alice");
        h.relay.pending().enqueue(&bob, &alice, "m1").unwrap();
        h.relay.pending().enqueue(&bob, &alice, "m2").unwrap();

        let (sink, stream, mut peer) = mock::failing_pair(1);
        let task = h.spawn("bob", sink, stream);

        assert_eq!(peer.next_json().await["payload"], "m1");
        let summary = finish(task).await;
        assert_eq!(summary.close_reason, CloseReason::TransportError);
        assert_eq!(h.relay.pending().len(&bob).unwrap(), 2);
        assert!(!h.relay.is_online(&bob));

        // The next successful connection gets everything again
        let (_task, mut peer) = h.connect("bob");
        assert_eq!(peer.next_json().await["payload"], "m1");
        assert_eq!(peer.next_json().await["payload"], "m2");
        h.wait_for(|e| matches!(e, RelayEvent::Drained { .. })).await;
        assert!(h.relay.pending().is_empty(&bob).unwrap());
    }

    struct BrokenQueue;

    impl PendingQueue for BrokenQueue {
        fn enqueue(&self, _: &Identity, _: &Identity, _: &str) -> parley_core::Result<u64> {
            Err(parley_core::Error::Storage("disk full".to_string()))
        }

        fn drain(&self, recipient: &Identity) -> parley_core::Result<Vec<QueuedMessage>> {
            if recipient.as_str() == "carol" {
                return Err(parley_core::Error::Storage("corrupt".to_string()));
            }
            Ok(Vec::new())
        }

        fn delete_all(&self, _: &Identity) -> parley_core::Result<usize> {
            Ok(0)
        }

        fn delete_through(&self, _: &Identity, _: u64) -> parley_core::Result<usize> {
            Ok(0)
        }

        fn len(&self, _: &Identity) -> parley_core::Result<usize> {
            Ok(0)
        }
    }

    fn broken_queue_harness() -> Harness {
        let identities = MemoryIdentityStore::new();
        for name in ["alice", "bob", "carol"] {
            identities.insert(Identity::new(name), "key");
        }
        Harness::with_stores(Arc::new(identities), Arc::new(BrokenQueue))
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_reported_to_sender() {
        let mut h = broken_queue_harness();
        let (task, mut alice) = h.connect("alice");
        h.opened("alice").await;

        alice.send_envelope(&Envelope::new("alice", "bob", "lost?"));
        let frame = alice.next_json().await;
        assert_eq!(frame["error"], "Message could not be queued");
        assert!(frame["detail"].as_str().unwrap().contains("disk full"));

        // Still open
        alice.send("invalid");
        assert_eq!(alice.next_json().await["error"], "Invalid message format");
        alice.hang_up();
        assert_eq!(finish(task).await.relayed, 0);
    }

    #[tokio::test]
    async fn test_drain_failure_closes_session() {
        let h = broken_queue_harness();
        let (task, mut carol) = h.connect("carol");

        let frame = carol.next_json().await;
        assert_eq!(frame["error"], "Internal Server Error");
        assert!(carol.closed().await);
        assert_eq!(finish(task).await.close_reason, CloseReason::DrainFailed);
        assert!(!h.relay.is_online(&Identity::new("carol")));
    }

    /// Memory queue with scripted delays and failures
    #[derive(Default)]
    struct ScriptedQueue {
        inner: MemoryPendingQueue,
        enqueue_delay: Option<Duration>,
        drain_failure_delay: Option<Duration>,
        enqueue_started: AtomicBool,
        drain_started: AtomicBool,
    }

    impl PendingQueue for ScriptedQueue {
        fn enqueue(&self, recipient: &Identity, sender: &Identity, payload: &str) -> parley_core::Result<u64> {
            self.enqueue_started.store(true, Ordering::Release);
            if let Some(delay) = self.enqueue_delay {
                std::thread::sleep(delay);
            }
            self.inner.enqueue(recipient, sender, payload)
        }

        fn drain(&self, recipient: &Identity) -> parley_core::Result<Vec<QueuedMessage>> {
            self.drain_started.store(true, Ordering::Release);
            if let Some(delay) = self.drain_failure_delay {
                std::thread::sleep(delay);
                return Err(parley_core::Error::Storage("corrupt".to_string()));
            }
            self.inner.drain(recipient)
        }

        fn delete_all(&self, recipient: &Identity) -> parley_core::Result<usize> {
            self.inner.delete_all(recipient)
        }

        fn delete_through(&self, recipient: &Identity, through: u64) -> parley_core::Result<usize> {
            self.inner.delete_through(recipient, through)
        }

        fn len(&self, recipient: &Identity) -> parley_core::Result<usize> {
            self.inner.len(recipient)
        }
    }

    fn scripted_harness(queue: Arc<ScriptedQueue>) -> Harness {
        let identities = MemoryIdentityStore::new();
        for name in ["alice", "bob", "carol"] {
            identities.insert(Identity::new(name), "key");
        }
        Harness::with_stores(Arc::new(identities), queue)
    }

    async fn wait_flag(flag: &AtomicBool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !flag.load(Ordering::Acquire) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("flag not set in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_enqueue_racing_connect_is_drained() {
        let queue = Arc::new(ScriptedQueue {
            enqueue_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let mut h = scripted_harness(queue.clone());
        let (_alice, alice) = h.connect("alice");
        h.opened("alice").await;

        // bob is offline when the message is routed and connects while
        // the enqueue is still running
        alice.send_envelope(&Envelope::new("alice", "bob", "in flight"));
        wait_flag(&queue.enqueue_started).await;
        let (_bob, mut bob) = h.connect("bob");

        assert_eq!(bob.next_json().await["payload"], "in flight");
        h.wait_for(|e| matches!(e, RelayEvent::Drained { count: 1, .. })).await;
        assert!(queue.is_empty(&Identity::new("bob")).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sender_waiting_on_failed_drain_is_queued() {
        let queue = Arc::new(ScriptedQueue {
            drain_failure_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let h = scripted_harness(queue.clone());
        let carol = Identity::new("carol");
        let (task, mut carol_peer) = h.connect("carol");

        // carol is registered and holds her writer while the fetch runs
        wait_flag(&queue.drain_started).await;
        let router = h.relay.router().clone();
        let route = tokio::spawn(async move {
            router.route(&Envelope::new("alice", "carol", "live")).await
        });

        assert_eq!(carol_peer.next_json().await["error"], "Internal Server Error");
        assert!(carol_peer.closed().await);
        assert_eq!(finish(task).await.close_reason, CloseReason::DrainFailed);

        let outcome = route.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            RouteOutcome::Queued {
                after_failed_delivery: true,
                ..
            }
        ));
        assert_eq!(queue.len(&carol).unwrap(), 1);
    }
}
