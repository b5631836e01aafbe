//! # Parley Core
//!
//! Core types and contracts shared by the Parley relay and its services.
//!
//! This crate provides:
//! - The [`Identity`] token clients connect under
//! - Wire envelopes exchanged over a relay connection
//! - Contracts for the identity store and the pending message queue
//! - Common error types

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod message;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use message::{Envelope, ErrorEnvelope};
pub use storage::{IdentityRecord, IdentityStore, PendingQueue, QueuedMessage};
pub use types::Identity;

/// Number of random bytes in a generated identity (hex encoded on the wire)
pub const IDENTITY_BYTES: usize = 5;
