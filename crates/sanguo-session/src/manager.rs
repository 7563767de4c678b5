//! Tracks live player connections.
//!
//! `SessionManager` is a plain `HashMap` and not thread-safe on its own.
//! The server keeps it behind a mutex and only holds that lock for the
//! length of a lookup or update.

use std::collections::HashMap;
use std::time::Instant;

use sanguo_protocol::{PlayerId, RoomId};

use crate::{PlayerIdentity, SessionError};

/// One connected player.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: PlayerIdentity,
    /// The room the player is currently a member of, if any.
    pub room: Option<RoomId>,
    pub connected_at: Instant,
}

/// All currently connected players, keyed by id.
///
/// ```text
/// register() ──→ enter_room() ⇄ leave_room() ──→ unregister()
/// ```
///
/// `unregister` hands back the final [`Session`] so the caller can clean
/// up the room membership it still records.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly authenticated connection.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the player already has one.
    pub fn register(&mut self, identity: PlayerIdentity) -> Result<&Session, SessionError> {
        let player_id = identity.id;
        if self.sessions.contains_key(&player_id) {
            return Err(SessionError::AlreadyConnected(player_id));
        }

        tracing::info!(%player_id, name = %identity.name, "session created");
        let session = self.sessions.entry(player_id).or_insert(Session {
            identity,
            room: None,
            connected_at: Instant::now(),
        });
        Ok(session)
    }

    /// Removes the player's session and returns it.
    pub fn unregister(&mut self, player_id: PlayerId) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .remove(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;
        tracing::info!(
            %player_id,
            connected_secs = session.connected_at.elapsed().as_secs(),
            "session closed"
        );
        Ok(session)
    }

    /// Records that the player joined `room_id`, returning the room they
    /// were in before.
    pub fn enter_room(
        &mut self,
        player_id: PlayerId,
        room_id: RoomId,
    ) -> Result<Option<RoomId>, SessionError> {
        let session = self.get_mut(player_id)?;
        Ok(session.room.replace(room_id))
    }

    /// Clears the player's room, returning it.
    pub fn leave_room(&mut self, player_id: PlayerId) -> Result<Option<RoomId>, SessionError> {
        let session = self.get_mut(player_id)?;
        Ok(session.room.take())
    }

    pub fn current_room(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.sessions.get(player_id).and_then(|s| s.room)
    }

    fn get_mut(&mut self, player_id: PlayerId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))
    }
}
