//! Error types for the session layer.

use sanguo_protocol::PlayerId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was rejected by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// A player can hold only one live connection at a time.
    #[error("player {0} already has an active session")]
    AlreadyConnected(PlayerId),
}
