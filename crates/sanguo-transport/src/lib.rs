//! Socket plumbing for the Sanguo game server.
//!
//! Everything above this crate deals in whole frames. A [`Transport`]
//! hands out [`Connection`]s, one per player socket, and each connection
//! is driven by two tasks at once: the handler reading player requests
//! and the writer pushing room notifications and heartbeats.
//!
//! The `websocket` feature (on by default) provides the browser-facing
//! implementation on top of `tokio-tungstenite`.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::{TransportError, WireError};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static CONNECTIONS_ISSUED: AtomicU64 = AtomicU64::new(0);

/// Process-unique tag for an accepted socket. Shows up as `C-<n>` in logs
/// until the player behind it has authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Issues the next id. Ids start at 1 and are never reused.
    pub fn next() -> Self {
        Self(CONNECTIONS_ISSUED.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// A listener producing player connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next socket and completes its handshake.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// One player socket.
///
/// Both directions borrow `&self`; a task parked in [`recv`](Self::recv)
/// never holds up [`send`](Self::send).
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Next frame from the player, or `Ok(None)` once they hung up.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    fn peer_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_increasing() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second > first);
        assert!(first.get() >= 1);
    }

    #[test]
    fn test_display_uses_log_prefix() {
        assert_eq!(ConnectionId(12).to_string(), "C-12");
    }
}
