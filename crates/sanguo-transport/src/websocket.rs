//! Browser-facing transport over `tokio-tungstenite`.
//!
//! Each socket is split after the upgrade. The two halves sit behind
//! their own locks so the handler's pending `recv` and the writer's
//! `send` proceed independently.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::{Connection, ConnectionId, Transport, TransportError};

type Socket = WebSocketStream<TcpStream>;

/// TCP listener that upgrades every accepted stream to a WebSocket.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Listens on `addr`. With port `0` the OS picks one; ask
    /// [`Transport::local_addr`] which.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        info!(addr, "listening for players");
        Ok(Self { listener })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<WebSocketConnection, TransportError> {
        let (tcp, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        let socket = tokio_tungstenite::accept_async(tcp)
            .await
            .map_err(|e| TransportError::Handshake {
                peer,
                source: Box::new(e),
            })?;

        let id = ConnectionId::next();
        debug!(%id, %peer, "websocket upgraded");
        let (outgoing, incoming) = socket.split();
        Ok(WebSocketConnection {
            id,
            peer,
            outgoing: Mutex::new(outgoing),
            incoming: Mutex::new(incoming),
        })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// An upgraded player socket.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    outgoing: Mutex<SplitSink<Socket, Message>>,
    incoming: Mutex<SplitStream<Socket>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// UTF-8 frames travel as text, which is what the JSON codec
    /// produces; anything else goes out binary.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let message = match std::str::from_utf8(frame) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(frame.to_vec()),
        };
        let mut outgoing = self.outgoing.lock().await;
        outgoing
            .send(message)
            .await
            .map_err(|e| TransportError::Send(Box::new(e)))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut incoming = self.incoming.lock().await;
        while let Some(message) = incoming.next().await {
            match message.map_err(|e| TransportError::Receive(Box::new(e)))? {
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Binary(bytes) => return Ok(Some(bytes.to_vec())),
                Message::Close(_) => return Ok(None),
                // ping/pong frames are answered inside tungstenite
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut outgoing = self.outgoing.lock().await;
        outgoing
            .close()
            .await
            .map_err(|e| TransportError::Send(Box::new(e)))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
