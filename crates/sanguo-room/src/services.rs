//! What a room needs from the outside world.
//!
//! Rooms push notifications and finished-match records through these
//! traits and never learn how they are delivered or stored. The server
//! plugs in its connection table as the [`RoomNotifier`]; a storage
//! layer would plug in as the [`HistorySink`].

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use sanguo_engine::{Catalog, FinishReason, GameEvent, GameState, PlayerState, Team, TerrainState};
use sanguo_protocol::{Envelope, MessageKind, PlayerId, ProtocolError, RoomId};

use crate::room::{RoomInfo, RoomPlayer};

/// Something a room tells its members.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Membership, readiness or status changed.
    RoomUpdate(RoomSnapshot),
    /// The match began; carries the seeded state.
    GameStart(Box<GameState>),
    GameEvents(Vec<GameEvent>),
    GameOver(GameOverSummary),
    /// Sent by matchmaking to each member of a new group.
    MatchFound(MatchFound),
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    #[serde(flatten)]
    pub info: RoomInfo,
    pub players: Vec<RoomPlayer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameOverSummary {
    pub winner: Option<Team>,
    pub round: u32,
    pub reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchFound {
    pub room_id: RoomId,
    pub players: Vec<PlayerId>,
}

impl Notification {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::RoomUpdate(_) => MessageKind::RoomUpdate,
            Self::GameStart(_) => MessageKind::GameStart,
            Self::GameEvents(_) => MessageKind::GameEvents,
            Self::GameOver(_) => MessageKind::GameOver,
            Self::MatchFound(_) => MessageKind::MatchFound,
        }
    }

    /// The wire frame for this notification.
    pub fn to_envelope(&self, room_id: RoomId) -> Result<Envelope, ProtocolError> {
        let kind = self.kind();
        let envelope = match self {
            Self::RoomUpdate(snapshot) => Envelope::with_payload(kind, snapshot),
            Self::GameStart(state) => Envelope::with_payload(kind, state.as_ref()),
            Self::GameEvents(events) => Envelope::with_payload(kind, events),
            Self::GameOver(summary) => Envelope::with_payload(kind, summary),
            Self::MatchFound(found) => Envelope::with_payload(kind, found),
        }?;
        Ok(envelope.in_room(room_id))
    }
}

/// Delivers room notifications to players. Fire-and-forget: a room never
/// waits on delivery and never learns whether it succeeded.
pub trait RoomNotifier: Send + Sync + 'static {
    fn notify(&self, room_id: RoomId, recipients: &[PlayerId], notification: &Notification);
}

/// The record handed to storage when a match ends.
#[derive(Debug, Clone, Serialize)]
pub struct MatchHistory {
    pub room_id: RoomId,
    pub winner: Option<Team>,
    pub rounds: u32,
    pub duration_seconds: u64,
    pub players: Vec<PlayerState>,
    pub events: Vec<GameEvent>,
    pub terrains: Vec<TerrainState>,
}

/// Receives finished matches.
pub trait HistorySink: Send + Sync + 'static {
    fn record(&self, history: MatchHistory);
}

/// A [`HistorySink`] that only logs a summary line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHistorySink;

impl HistorySink for LogHistorySink {
    fn record(&self, history: MatchHistory) {
        let winner = history
            .winner
            .map_or_else(|| "draw".to_owned(), |team| team.to_string());
        info!(
            room_id = %history.room_id,
            %winner,
            rounds = history.rounds,
            duration_seconds = history.duration_seconds,
            events = history.events.len(),
            "match recorded"
        );
    }
}

/// The collaborators every room shares.
#[derive(Clone)]
pub struct RoomServices {
    pub notifier: Arc<dyn RoomNotifier>,
    pub history: Arc<dyn HistorySink>,
    pub catalog: Arc<dyn Catalog>,
}

impl RoomServices {
    pub fn new(
        notifier: Arc<dyn RoomNotifier>,
        history: Arc<dyn HistorySink>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            notifier,
            history,
            catalog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_envelope_carries_room_and_kind() {
        let notification = Notification::MatchFound(MatchFound {
            room_id: RoomId(9),
            players: vec![PlayerId(1), PlayerId(2)],
        });
        let envelope = notification.to_envelope(RoomId(9)).unwrap();
        assert_eq!(envelope.kind, MessageKind::MatchFound);
        assert_eq!(envelope.room_id, Some(RoomId(9)));
        assert_eq!(envelope.data["players"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_game_over_payload() {
        let notification = Notification::GameOver(GameOverSummary {
            winner: Some(Team::Blue),
            round: 4,
            reason: Some(FinishReason::Elimination),
        });
        let envelope = notification.to_envelope(RoomId(2)).unwrap();
        assert_eq!(envelope.kind, MessageKind::GameOver);
        assert_eq!(envelope.data["winner"], "blue");
        assert_eq!(envelope.data["round"], 4);
    }
}
