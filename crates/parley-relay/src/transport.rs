//! Transport seam between the relay engine and a concrete duplex channel
//!
//! The engine only needs to write text frames to a client and read frames
//! from it. The WebSocket adapter in [`crate::websocket`] implements both
//! halves; tests use an in-memory channel pair.

use async_trait::async_trait;

use crate::error::Result;

/// Writable half of a client connection
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection; must be safe to call more than once
    async fn close(&mut self) -> Result<()>;
}

/// Readable half of a client connection
#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound frame payload. `Ok(None)` means the peer closed the
    /// connection; `Err` is a transport failure.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>>;
}
