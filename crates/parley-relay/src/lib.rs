//! # Parley Relay
//!
//! Presence-aware message relay. Clients hold one live connection per
//! identity; messages to a live recipient are written straight onto its
//! connection, messages to an offline recipient are queued durably and
//! drained on its next connection.
//!
//! ## Components
//!
//! - **Presence table**: who is reachable right now, one entry per identity
//! - **Session**: per-connection state machine (authenticate, register,
//!   drain, relay, tear down)
//! - **Router**: deliver now or enqueue
//! - **Stores**: sled-backed identity store and pending queue
//! - **WebSocket adapter**: `/ws/{identity}` listener

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod connection;
pub mod error;
pub mod presence;
pub mod router;
pub mod server;
pub mod session;
pub mod storage;
pub mod transport;
pub mod websocket;

pub use config::RelayServerConfig;
pub use connection::{ConnectionHandle, ConnectionId};
pub use error::{RelayError, Result};
pub use presence::{Lookup, PresenceTable, Registration};
pub use router::{RouteOutcome, Router};
pub use server::{Relay, RelayEvent};
pub use session::{CloseReason, SessionState, SessionSummary};
pub use transport::{FrameSink, FrameStream};

/// Path prefix of the WebSocket relay endpoint
pub const WS_PATH_PREFIX: &str = "/ws/";
