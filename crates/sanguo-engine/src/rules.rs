//! Per-match rule settings.

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::model::{Phase, Position};

/// How a match that reaches the round ceiling is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryCondition {
    /// Only elimination wins; the ceiling is a draw.
    #[default]
    KillLord,
    /// The team owning more terrain on the board wins.
    TerrainControl,
    /// The team with more total HP left wins.
    Resource,
}

/// Which action kinds each waiting phase accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePolicy {
    pub deploy: Vec<ActionKind>,
    pub combat: Vec<ActionKind>,
}

impl Default for PhasePolicy {
    fn default() -> Self {
        Self {
            deploy: vec![ActionKind::Move, ActionKind::DeployTerrain, ActionKind::EndPhase],
            combat: vec![
                ActionKind::PlayCard,
                ActionKind::UseSkill,
                ActionKind::Move,
                ActionKind::DeployTerrain,
                ActionKind::EndPhase,
            ],
        }
    }
}

impl PhasePolicy {
    pub fn permits(&self, phase: Phase, kind: ActionKind) -> bool {
        match phase {
            Phase::Deploy => self.deploy.contains(&kind),
            Phase::Combat => self.combat.contains(&kind),
            Phase::Prepare | Phase::EndRound | Phase::Finished => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// The match ends once this round's EndRound resolves.
    pub round_ceiling: u32,
    /// Action points restored at every Prepare.
    pub action_points: u32,
    pub card_cost: u32,
    pub skill_cost: u32,
    pub move_cost: u32,
    pub deploy_cost: u32,
    /// Base movement range in board steps.
    pub move_range: u32,
    pub board_width: i32,
    pub board_height: i32,
    pub enable_synergy: bool,
    pub victory: VictoryCondition,
    pub phase_policy: PhasePolicy,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            round_ceiling: 15,
            action_points: 3,
            card_cost: 1,
            skill_cost: 1,
            move_cost: 1,
            deploy_cost: 1,
            move_range: 2,
            board_width: 8,
            board_height: 8,
            enable_synergy: true,
            victory: VictoryCondition::default(),
            phase_policy: PhasePolicy::default(),
        }
    }
}

impl Rules {
    pub fn on_board(&self, pos: Position) -> bool {
        (0..self.board_width).contains(&pos.x) && (0..self.board_height).contains(&pos.y)
    }
}
