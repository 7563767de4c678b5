//! Error types for the room layer.

use sanguo_protocol::{PlayerId, RoomId};

/// Errors from registry, room and matchmaking operations.
///
/// A rejected game action is not one of these: it comes back as an
/// `ActionResponse` with `success = false`.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The registry is at its room ceiling.
    #[error("room limit of {0} reached")]
    TooManyRooms(usize),

    /// The room does not exist, or was closed because it emptied.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("not enough players: need {need}, have {have}")]
    NotEnoughPlayers { need: usize, have: usize },

    #[error("players not ready: {0:?}")]
    PlayersNotReady(Vec<PlayerId>),

    #[error("player {0} is already queued")]
    AlreadyQueued(PlayerId),

    /// Malformed request or a precondition outside the match engine.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    #[error("room {0} has already started")]
    GameInProgress(RoomId),

    #[error("invalid room config: {0}")]
    InvalidConfig(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl RoomError {
    /// HTTP-style status code carried in `error` messages.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAction(_) => 400,
            Self::NotInRoom(..) => 403,
            Self::RoomNotFound(_) => 404,
            Self::RoomFull(_)
            | Self::NotEnoughPlayers { .. }
            | Self::PlayersNotReady(_)
            | Self::AlreadyQueued(_)
            | Self::GameInProgress(_)
            | Self::InvalidState(_) => 409,
            Self::InvalidConfig(_) => 422,
            Self::TooManyRooms(_) => 503,
        }
    }
}
