use std::io;
use std::net::SocketAddr;

/// Protocol-level failure reported by the socket library.
pub type WireError = Box<dyn std::error::Error + Send + Sync>;

/// Failures on a single socket or on the listener.
///
/// Only [`Bind`](Self::Bind) is fatal; everything else ends one
/// connection and the accept loop carries on.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("websocket handshake with {peer} failed: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: WireError,
    },

    #[error("write to peer failed: {0}")]
    Send(#[source] WireError),

    #[error("read from peer failed: {0}")]
    Receive(#[source] WireError),
}
