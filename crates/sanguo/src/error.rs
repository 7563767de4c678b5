//! Unified error type for the Sanguo server.

use sanguo_protocol::ProtocolError;
use sanguo_room::RoomError;
use sanguo_session::SessionError;
use sanguo_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors without ceremony.
#[derive(Debug, thiserror::Error)]
pub enum SanguoError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed frame or payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or session bookkeeping failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room, registry or matchmaking operation was refused.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Startup configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SanguoError {
    /// HTTP-style code sent to the client in an `error` message.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Protocol(_) => 400,
            Self::Session(SessionError::AuthFailed(_)) => 401,
            Self::Session(SessionError::AlreadyConnected(_)) => 409,
            Self::Session(SessionError::NotFound(_)) => 404,
            Self::Room(err) => err.status_code(),
            Self::Transport(_) | Self::Config(_) => 500,
        }
    }
}
