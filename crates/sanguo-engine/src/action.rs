//! The action-dispatch contract: what a player asks for, and what they
//! get back.

use std::fmt;

use serde::{Deserialize, Serialize};

use sanguo_protocol::PlayerId;

use crate::effect::TargetScope;
use crate::ids::{CardId, GeneralId};
use crate::model::{GameEvent, Phase, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PlayCard,
    UseSkill,
    Move,
    DeployTerrain,
    EndPhase,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PlayCard => "play_card",
            Self::UseSkill => "use_skill",
            Self::Move => "move",
            Self::DeployTerrain => "deploy_terrain",
            Self::EndPhase => "end_phase",
        })
    }
}

/// A player command, tagged by `action_type` on the wire:
///
/// ```json
/// { "action_type": "move", "general_id": 4, "to": { "x": 2, "y": 1 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum Action {
    PlayCard {
        card_id: CardId,
        /// The general playing the card.
        general_id: GeneralId,
        #[serde(default)]
        targets: Vec<GeneralId>,
    },
    UseSkill {
        general_id: GeneralId,
        skill_id: String,
        #[serde(default)]
        targets: Vec<GeneralId>,
    },
    Move {
        general_id: GeneralId,
        to: Position,
    },
    DeployTerrain {
        terrain: String,
        position: Position,
    },
    /// Ready for combat during Deploy; end of turn during Combat.
    EndPhase,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::PlayCard { .. } => ActionKind::PlayCard,
            Action::UseSkill { .. } => ActionKind::UseSkill,
            Action::Move { .. } => ActionKind::Move,
            Action::DeployTerrain { .. } => ActionKind::DeployTerrain,
            Action::EndPhase => ActionKind::EndPhase,
        }
    }
}

/// An [`Action`] attributed to the authenticated player who sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub action: Action,
}

impl ActionRequest {
    pub fn new(player_id: PlayerId, action: Action) -> Self {
        Self { player_id, action }
    }
}

/// The reply to an [`ActionRequest`]. A rejected action is a normal
/// response with `success = false`, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub events: Vec<GameEvent>,
}

impl ActionResponse {
    pub fn accepted(message: impl Into<String>, events: Vec<GameEvent>) -> Self {
        Self {
            success: true,
            message: message.into(),
            events,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            events: Vec::new(),
        }
    }
}

impl From<Rejection> for ActionResponse {
    fn from(rejection: Rejection) -> Self {
        ActionResponse::rejected(rejection.to_string())
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("match is not in progress")]
    NotPlaying,

    #[error("{action} is not allowed during the {phase} phase")]
    PhaseForbids { action: ActionKind, phase: Phase },

    #[error("player {0} is not taking part in this match")]
    NotParticipating(PlayerId),

    #[error("player {0} has been eliminated")]
    Eliminated(PlayerId),

    #[error("it is not player {0}'s turn")]
    NotYourTurn(PlayerId),

    #[error("player {0} has already ended this phase")]
    PhaseAlreadyEnded(PlayerId),

    #[error("general {general} does not belong to player {player}")]
    NotOwner { general: GeneralId, player: PlayerId },

    #[error("general {0} has fallen")]
    GeneralFallen(GeneralId),

    #[error("general {0} has already acted this round")]
    AlreadyActed(GeneralId),

    #[error("card {0} is not in hand")]
    CardNotInHand(CardId),

    #[error("general {general} has no skill {skill:?}")]
    UnknownSkill { general: GeneralId, skill: String },

    #[error("skill {0:?} cannot be activated")]
    NotActivatable(String),

    #[error("skill {skill:?} is cooling down for {rounds} more round(s)")]
    OnCooldown { skill: String, rounds: u32 },

    #[error("not enough action points: need {need}, have {have}")]
    NotEnoughActionPoints { need: u32, have: u32 },

    #[error("position {0} is off the board")]
    OffBoard(Position),

    #[error("position {0} is occupied")]
    Occupied(Position),

    #[error("terrain already present at {0}")]
    TerrainPresent(Position),

    #[error("unknown terrain {0:?}")]
    UnknownTerrain(String),

    #[error("{to} is out of movement range {range} from {from}")]
    OutOfRange { from: Position, to: Position, range: u32 },

    #[error("no valid {0} target")]
    MissingTarget(TargetScope),

    #[error("target {0} is not a living general")]
    InvalidTarget(GeneralId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_format() {
        let action: Action = serde_json::from_str(
            r#"{"action_type":"play_card","card_id":4,"general_id":2,"targets":[9]}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            Action::PlayCard {
                card_id: CardId(4),
                general_id: GeneralId(2),
                targets: vec![GeneralId(9)],
            }
        );
        assert_eq!(action.kind(), ActionKind::PlayCard);
    }

    #[test]
    fn test_targets_default_to_empty() {
        let action: Action =
            serde_json::from_str(r#"{"action_type":"use_skill","general_id":1,"skill_id":"guanxing"}"#)
                .unwrap();
        assert!(matches!(action, Action::UseSkill { targets, .. } if targets.is_empty()));
    }

    #[test]
    fn test_unknown_action_type_is_a_decode_error() {
        let result: Result<Action, _> = serde_json::from_str(r#"{"action_type":"surrender"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejection_becomes_failed_response() {
        let response: ActionResponse = Rejection::NotEnoughActionPoints { need: 2, have: 1 }.into();
        assert!(!response.success);
        assert_eq!(response.message, "not enough action points: need 2, have 1");
        assert!(response.events.is_empty());
    }
}
