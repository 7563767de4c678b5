//! Room configuration, server-wide room settings, and the room status
//! state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sanguo_engine::{Phase, Rules, VictoryCondition};

use crate::RoomError;

/// Hard bounds on room size, whatever the server settings say.
pub const MIN_ROOM_SIZE: usize = 2;
pub const MAX_ROOM_SIZE: usize = 6;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// The board starts empty; all terrain is deployed by players.
    #[default]
    FixedTerrain,
    /// Neutral catalog terrain is scattered over the middle rows at start.
    RandomTerrain,
}

/// Per-room settings chosen by the host. Fixed once the room exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub name: String,
    pub max_players: usize,
    pub game_mode: GameMode,
    pub victory: VictoryCondition,
    pub enable_synergy: bool,
    /// Ignore player picks and deal random generals.
    pub enable_random_pick: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "Sanguo room".to_owned(),
            max_players: 4,
            game_mode: GameMode::default(),
            victory: VictoryCondition::default(),
            enable_synergy: true,
            enable_random_pick: false,
        }
    }
}

impl RoomConfig {
    /// Checks the config against the server's room settings.
    pub fn validate(&self, settings: &RoomSettings) -> Result<(), RoomError> {
        if self.name.trim().is_empty() {
            return Err(RoomError::InvalidConfig("room name is empty".into()));
        }
        let (low, high) = settings.size_bounds();
        if !(low..=high).contains(&self.max_players) {
            return Err(RoomError::InvalidConfig(format!(
                "max_players must be between {low} and {high}, got {}",
                self.max_players
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// Server-wide limits and timing shared by every room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Ceiling on concurrently registered rooms.
    pub max_rooms: usize,
    pub min_players: usize,
    pub max_players: usize,
    /// Generals each player brings into a match.
    pub generals_per_player: usize,
    /// Tiles seeded in a [`GameMode::RandomTerrain`] room.
    pub random_terrain_count: usize,
    pub prepare_budget: Duration,
    pub deploy_budget: Duration,
    pub turn_budget: Duration,
    /// Base rules for every match. The room's victory condition and
    /// synergy toggle override the matching fields.
    pub rules: Rules,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_rooms: 1000,
            min_players: MIN_ROOM_SIZE,
            max_players: MAX_ROOM_SIZE,
            generals_per_player: 1,
            random_terrain_count: 4,
            prepare_budget: Duration::from_secs(5),
            deploy_budget: Duration::from_secs(45),
            turn_budget: Duration::from_secs(30),
            rules: Rules::default(),
        }
    }
}

impl RoomSettings {
    /// The allowed `max_players` range, clamped into `[2, 6]`.
    pub fn size_bounds(&self) -> (usize, usize) {
        let low = self.min_players.clamp(MIN_ROOM_SIZE, MAX_ROOM_SIZE);
        let high = self.max_players.clamp(low, MAX_ROOM_SIZE);
        (low, high)
    }

    /// How long the phase driver waits in `phase` before forcing it on.
    pub fn budget_for(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Prepare => self.prepare_budget,
            Phase::Deploy => self.deploy_budget,
            Phase::Combat => self.turn_budget,
            Phase::EndRound | Phase::Finished => Duration::ZERO,
        }
    }

    /// The rules for a room created with `config`.
    pub fn rules_for(&self, config: &RoomConfig) -> Rules {
        Rules {
            victory: config.victory,
            enable_synergy: config.enable_synergy,
            ..self.rules.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a room. Strictly ordered:
///
/// ```text
/// Waiting → Playing → Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Accepting members; readiness and picks can change.
    #[default]
    Waiting,
    Playing,
    /// The match is over. Members can still read the final state.
    Finished,
}

impl RoomStatus {
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Playing),
            Self::Playing => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Finished => "finished",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_status_follows_strict_order() {
        assert_eq!(RoomStatus::Waiting.next(), Some(RoomStatus::Playing));
        assert_eq!(RoomStatus::Playing.next(), Some(RoomStatus::Finished));
        assert_eq!(RoomStatus::Finished.next(), None);
        assert!(!RoomStatus::Waiting.can_transition_to(RoomStatus::Finished));
        assert!(!RoomStatus::Finished.can_transition_to(RoomStatus::Waiting));
    }

    #[test]
    fn test_only_waiting_rooms_are_joinable() {
        assert!(RoomStatus::Waiting.is_joinable());
        assert!(!RoomStatus::Playing.is_joinable());
        assert!(!RoomStatus::Finished.is_joinable());
    }

    #[test]
    fn test_max_players_bounds() {
        let settings = RoomSettings::default();
        for max_players in 2..=6 {
            let config = RoomConfig { max_players, ..RoomConfig::default() };
            assert!(config.validate(&settings).is_ok());
        }
        for max_players in [0, 1, 7, 12] {
            let config = RoomConfig { max_players, ..RoomConfig::default() };
            assert!(matches!(config.validate(&settings), Err(RoomError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_size_bounds_never_leave_two_to_six() {
        let settings = RoomSettings {
            min_players: 0,
            max_players: 40,
            ..RoomSettings::default()
        };
        assert_eq!(settings.size_bounds(), (2, 6));

        let settings = RoomSettings {
            min_players: 4,
            max_players: 3,
            ..RoomSettings::default()
        };
        assert_eq!(settings.size_bounds(), (4, 4));
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let config = RoomConfig {
            name: "  ".into(),
            ..RoomConfig::default()
        };
        assert!(config.validate(&RoomSettings::default()).is_err());
    }

    #[test]
    fn test_partial_config_json_uses_defaults() {
        let config: RoomConfig =
            serde_json::from_str(r#"{"name":"Red Cliffs","victory":"resource"}"#).unwrap();
        assert_eq!(config.name, "Red Cliffs");
        assert_eq!(config.max_players, 4);
        assert_eq!(config.victory, VictoryCondition::Resource);
    }

    #[test]
    fn test_room_overrides_rules() {
        let settings = RoomSettings::default();
        let config = RoomConfig {
            victory: VictoryCondition::TerrainControl,
            enable_synergy: false,
            ..RoomConfig::default()
        };
        let rules = settings.rules_for(&config);
        assert_eq!(rules.victory, VictoryCondition::TerrainControl);
        assert!(!rules.enable_synergy);
        assert_eq!(rules.round_ceiling, settings.rules.round_ceiling);
    }
}
