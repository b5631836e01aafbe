//! Durable stores backing the relay
//!
//! Implements the [`IdentityStore`] and [`PendingQueue`] contracts twice:
//! in memory (tests, ephemeral relays) and on sled (production).

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use parley_core::{Error, Identity, IdentityRecord, IdentityStore, PendingQueue, QueuedMessage};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result as RelayResult;

type Result<T> = parley_core::Result<T>;

/// Attempts at finding an unused identity before giving up
const MAX_CREATE_ATTEMPTS: u32 = 16;

/// sled tree holding identity records
const IDENTITY_TREE: &str = "identities";

/// sled tree holding queued messages
const PENDING_TREE: &str = "pending";

/// Generate a random identity token
pub fn generate_identity() -> Identity {
    let mut bytes = [0u8; parley_core::IDENTITY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    Identity::new(hex::encode(bytes))
}

/// Open (or create) the relay database at `path`
pub fn open_database(path: impl AsRef<Path>) -> RelayResult<sled::Db> {
    let db = sled::open(path.as_ref())?;
    info!("Opened relay database at {}", path.as_ref().display());
    Ok(db)
}

fn storage_err(err: impl std::fmt::Display) -> Error {
    Error::Storage(err.to_string())
}

/// In-memory identity store (for testing)
#[derive(Default)]
pub struct MemoryIdentityStore {
    records: RwLock<HashMap<Identity, IdentityRecord>>,
}

impl MemoryIdentityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public key under a caller-chosen identity
    pub fn insert(&self, identity: Identity, public_key: &str) {
        self.records
            .write()
            .insert(identity, IdentityRecord::new(public_key));
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn exists(&self, identity: &Identity) -> Result<bool> {
        Ok(self.records.read().contains_key(identity))
    }

    fn get_public_key(&self, identity: &Identity) -> Result<Option<String>> {
        Ok(self
            .records
            .read()
            .get(identity)
            .map(|r| r.public_key.clone()))
    }

    fn create(&self, public_key: &str) -> Result<Identity> {
        let mut records = self.records.write();
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let identity = generate_identity();
            if !records.contains_key(&identity) {
                records.insert(identity.clone(), IdentityRecord::new(public_key));
                debug!("Created identity {}", identity);
                return Ok(identity);
            }
        }
        Err(Error::IdentityExhausted {
            attempts: MAX_CREATE_ATTEMPTS,
        })
    }
}

/// In-memory pending queue (for testing)
#[derive(Default)]
pub struct MemoryPendingQueue {
    inner: Mutex<MemoryQueueInner>,
}

#[derive(Default)]
struct MemoryQueueInner {
    next_seq: u64,
    queues: HashMap<Identity, VecDeque<QueuedMessage>>,
}

impl MemoryPendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingQueue for MemoryPendingQueue {
    fn enqueue(&self, recipient: &Identity, sender: &Identity, payload: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner
            .queues
            .entry(recipient.clone())
            .or_default()
            .push_back(QueuedMessage {
                seq,
                from: sender.clone(),
                to: recipient.clone(),
                payload: payload.to_string(),
            });
        Ok(seq)
    }

    fn drain(&self, recipient: &Identity) -> Result<Vec<QueuedMessage>> {
        Ok(self
            .inner
            .lock()
            .queues
            .get(recipient)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_all(&self, recipient: &Identity) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .queues
            .remove(recipient)
            .map(|q| q.len())
            .unwrap_or(0))
    }

    fn delete_through(&self, recipient: &Identity, through: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        let Some(queue) = inner.queues.get_mut(recipient) else {
            return Ok(0);
        };
        let before = queue.len();
        queue.retain(|m| m.seq > through);
        let removed = before - queue.len();
        if queue.is_empty() {
            inner.queues.remove(recipient);
        }
        Ok(removed)
    }

    fn len(&self, recipient: &Identity) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .queues
            .get(recipient)
            .map(|q| q.len())
            .unwrap_or(0))
    }
}

/// sled-backed identity store
pub struct SledIdentityStore {
    tree: sled::Tree,
}

impl SledIdentityStore {
    /// Open the identity tree of `db`
    pub fn new(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(IDENTITY_TREE).map_err(storage_err)?;
        Ok(Self { tree })
    }

    fn get_record(&self, identity: &Identity) -> Result<Option<IdentityRecord>> {
        match self.tree.get(identity.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let record: IdentityRecord = bincode::deserialize(&bytes).map_err(storage_err)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

impl IdentityStore for SledIdentityStore {
    fn exists(&self, identity: &Identity) -> Result<bool> {
        self.tree
            .contains_key(identity.as_bytes())
            .map_err(storage_err)
    }

    fn get_public_key(&self, identity: &Identity) -> Result<Option<String>> {
        Ok(self.get_record(identity)?.map(|r| r.public_key))
    }

    fn create(&self, public_key: &str) -> Result<Identity> {
        let value = bincode::serialize(&IdentityRecord::new(public_key)).map_err(storage_err)?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let identity = generate_identity();
            let swapped = self
                .tree
                .compare_and_swap(identity.as_bytes(), None as Option<&[u8]>, Some(value.as_slice()))
                .map_err(storage_err)?;
            if swapped.is_ok() {
                self.tree.flush().map_err(storage_err)?;
                debug!("Created identity {}", identity);
                return Ok(identity);
            }
        }

        Err(Error::IdentityExhausted {
            attempts: MAX_CREATE_ATTEMPTS,
        })
    }
}

/// Value stored per queued message; the recipient and sequence number
/// live in the key
#[derive(Serialize, Deserialize)]
struct StoredMessage {
    from: Identity,
    payload: String,
}

/// sled-backed pending queue.
///
/// Keys are `recipient 0x00 seq_be`, so a prefix scan yields one
/// recipient's messages in insertion order.
pub struct SledPendingQueue {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledPendingQueue {
    /// Open the pending tree of `db`
    pub fn new(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(PENDING_TREE).map_err(storage_err)?;
        Ok(Self {
            db: db.clone(),
            tree,
        })
    }

    fn prefix(recipient: &Identity) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(recipient.as_bytes().len() + 1);
        prefix.extend_from_slice(recipient.as_bytes());
        prefix.push(0);
        prefix
    }

    fn key(recipient: &Identity, seq: u64) -> Vec<u8> {
        let mut key = Self::prefix(recipient);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn seq_from_key(key: &[u8]) -> Result<u64> {
        let tail = key
            .len()
            .checked_sub(8)
            .map(|start| &key[start..])
            .ok_or_else(|| Error::Storage("truncated pending key".to_string()))?;
        let mut seq = [0u8; 8];
        seq.copy_from_slice(tail);
        Ok(u64::from_be_bytes(seq))
    }

    fn remove_matching(&self, recipient: &Identity, keep: impl Fn(u64) -> bool) -> Result<usize> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;

        for item in self.tree.scan_prefix(Self::prefix(recipient)) {
            let (key, _) = item.map_err(storage_err)?;
            if !keep(Self::seq_from_key(&key)?) {
                batch.remove(key);
                removed += 1;
            }
        }

        if removed > 0 {
            self.tree.apply_batch(batch).map_err(storage_err)?;
            self.tree.flush().map_err(storage_err)?;
            debug!("Deleted {} pending messages for {}", removed, recipient);
        }
        Ok(removed)
    }
}

impl PendingQueue for SledPendingQueue {
    fn enqueue(&self, recipient: &Identity, sender: &Identity, payload: &str) -> Result<u64> {
        let seq = self.db.generate_id().map_err(storage_err)?;
        let value = bincode::serialize(&StoredMessage {
            from: sender.clone(),
            payload: payload.to_string(),
        })
        .map_err(storage_err)?;

        self.tree
            .insert(Self::key(recipient, seq), value)
            .map_err(storage_err)?;
        self.tree.flush().map_err(storage_err)?;

        debug!("Queued message {} for {}", seq, recipient);
        Ok(seq)
    }

    fn drain(&self, recipient: &Identity) -> Result<Vec<QueuedMessage>> {
        let mut messages = Vec::new();

        for item in self.tree.scan_prefix(Self::prefix(recipient)) {
            let (key, value) = item.map_err(storage_err)?;
            let stored: StoredMessage = bincode::deserialize(&value).map_err(storage_err)?;
            messages.push(QueuedMessage {
                seq: Self::seq_from_key(&key)?,
                from: stored.from,
                to: recipient.clone(),
                payload: stored.payload,
            });
        }

        Ok(messages)
    }

    fn delete_all(&self, recipient: &Identity) -> Result<usize> {
        self.remove_matching(recipient, |_| false)
    }

    fn delete_through(&self, recipient: &Identity, through: u64) -> Result<usize> {
        self.remove_matching(recipient, |seq| seq > through)
    }

    fn len(&self, recipient: &Identity) -> Result<usize> {
        let mut count = 0;
        for item in self.tree.scan_prefix(Self::prefix(recipient)) {
            item.map_err(storage_err)?;
            count += 1;
        }
        Ok(count)
    }
}
