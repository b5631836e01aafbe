//! In-memory presence table
//!
//! Maps each identity to its one live [`ConnectionHandle`]. All operations
//! take the same lock, so check-then-insert, lookup and delete are atomic
//! with respect to each other. The lock is never held across an `.await`.
//!
//! [`PresenceTable::lookup_or_else`] runs the offline branch of a lookup
//! under the lock, so a registration either happens before the lookup or
//! after that branch has finished.

use std::collections::HashMap;

use parking_lot::Mutex;
use parley_core::Identity;
use tracing::debug;

use crate::connection::ConnectionHandle;

/// Result of a registration attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The handle is now the live entry for its identity
    Registered,
    /// Another connection already holds the identity; nothing was changed
    AlreadyPresent,
}

/// Outcome of [`PresenceTable::lookup_or_else`]
#[derive(Debug)]
pub enum Lookup<T> {
    /// The identity is live
    Online(ConnectionHandle),
    /// The identity was offline; carries the result of the offline branch
    Offline(T),
}

/// Who is reachable directly right now
#[derive(Default)]
pub struct PresenceTable {
    entries: Mutex<HashMap<Identity, ConnectionHandle>>,
}

impl PresenceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handle` under its identity unless the identity is live
    pub fn register(&self, handle: ConnectionHandle) -> Registration {
        let mut entries = self.entries.lock();
        if entries.contains_key(handle.identity()) {
            return Registration::AlreadyPresent;
        }
        debug!("Presence: {} online via {}", handle.identity(), handle.id());
        entries.insert(handle.identity().clone(), handle);
        Registration::Registered
    }

    /// Live handle for `identity`
    pub fn lookup(&self, identity: &Identity) -> Option<ConnectionHandle> {
        self.entries.lock().get(identity).cloned()
    }

    /// Live handle for `identity`, or run `offline` while registrations
    /// for any identity are held off.
    ///
    /// `offline` must not block for long; it is meant for a single store
    /// write.
    pub fn lookup_or_else<T>(&self, identity: &Identity, offline: impl FnOnce() -> T) -> Lookup<T> {
        let entries = self.entries.lock();
        match entries.get(identity) {
            Some(handle) => Lookup::Online(handle.clone()),
            None => Lookup::Offline(offline()),
        }
    }

    /// Remove `identity`. Returns whether an entry was removed; removing
    /// an absent identity is a no-op.
    pub fn deregister(&self, identity: &Identity) -> bool {
        let removed = self.entries.lock().remove(identity).is_some();
        if removed {
            debug!("Presence: {} offline", identity);
        }
        removed
    }

    /// Number of live identities
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nobody is online
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
