//! WebSocket adapter for the relay
//!
//! Clients connect to `ws://<host>/ws/{identity}`. The identity is taken
//! from the request path during the handshake; anything else is refused
//! with `404 Not Found` before the upgrade.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parley_core::{ErrorEnvelope, Identity};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};
use crate::server::Relay;
use crate::transport::{FrameSink, FrameStream};
use crate::WS_PATH_PREFIX;

type Socket = WebSocketStream<TcpStream>;

/// Writable half of a WebSocket connection
pub struct WsSink {
    inner: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner.send(Message::text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close().await {
            Ok(()) => Ok(()),
            Err(e) => match RelayError::from(e) {
                RelayError::ConnectionClosed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// Readable half of a WebSocket connection
pub struct WsStream {
    inner: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.inner.next().await {
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    return Ok(Some(message.into_data().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return match RelayError::from(e) {
                        RelayError::ConnectionClosed => Ok(None),
                        other => Err(other),
                    }
                }
            }
        }
    }
}

/// Split an upgraded socket into relay transport halves
pub fn split(socket: Socket) -> (WsSink, WsStream) {
    let (sink, stream) = socket.split();
    (WsSink { inner: sink }, WsStream { inner: stream })
}

/// Identity addressed by a `/ws/{identity}` request path
pub fn identity_from_path(path: &str) -> Option<Identity> {
    let token = path.strip_prefix(WS_PATH_PREFIX)?;
    Identity::parse(token).ok()
}

fn not_found() -> ErrorResponse {
    let body = ErrorEnvelope::not_found().encode().ok();
    let mut response = ErrorResponse::new(body);
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// Accept WebSocket clients on `listener` until the task is dropped
pub async fn serve(listener: TcpListener, relay: Arc<Relay>) -> Result<()> {
    info!("WebSocket relay listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Accepting connection failed: {}", e);
                continue;
            }
        };

        let relay = Arc::clone(&relay);
        tokio::spawn(async move {
            handle_connection(stream, peer, relay).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, relay: Arc<Relay>) {
    let mut identity = None;
    let callback = |request: &Request, response: Response| {
        match identity_from_path(request.uri().path()) {
            Some(claimed) => {
                identity = Some(claimed);
                Ok(response)
            }
            None => {
                debug!("Refusing {} from {}", request.uri().path(), peer);
                Err(not_found())
            }
        }
    };

    let socket = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let Some(identity) = identity else {
        warn!("Handshake with {} completed without an identity", peer);
        return;
    };

    debug!("{} connected from {}", identity, peer);
    let (sink, stream) = split(socket);
    relay.accept(identity, sink, stream).await;
}
