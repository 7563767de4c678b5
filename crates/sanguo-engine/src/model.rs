//! Match state records.
//!
//! These are passive: the [`TurnEngine`](crate::TurnEngine) is the only
//! thing that mutates them, and it upholds the invariants noted here.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use sanguo_protocol::{PlayerId, RoomId};

use crate::action::ActionKind;
use crate::effect::{BuffKind, Effect, Modifier, Stat, TerrainEffect};
use crate::ids::{BuffId, CardId, GeneralId, TerrainId};

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// A board coordinate. Ordered so it can key a `BTreeMap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance.
    pub fn distance(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// Teams alternate by seat: red, blue, red, blue, ...
    pub fn for_seat(seat: usize) -> Self {
        if seat % 2 == 0 { Team::Red } else { Team::Blue }
    }

    pub fn opponent(self) -> Self {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Team::Red => "red",
            Team::Blue => "blue",
        })
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a match is in its round.
///
/// ```text
/// Prepare → Deploy → Combat → EndRound ─┬→ Prepare (next round)
///                                       └→ Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prepare,
    Deploy,
    Combat,
    EndRound,
    Finished,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Prepare, Phase::Deploy)
                | (Phase::Deploy, Phase::Combat)
                | (Phase::Combat, Phase::EndRound)
                | (Phase::EndRound, Phase::Prepare)
                | (Phase::EndRound, Phase::Finished)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Prepare => "prepare",
            Phase::Deploy => "deploy",
            Phase::Combat => "combat",
            Phase::EndRound => "end_round",
            Phase::Finished => "finished",
        })
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Everything about one running match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub room_id: RoomId,
    /// Starts at 1 and only ever increases.
    pub round: u32,
    pub current_phase: Phase,
    /// Seat order; also the combat turn order.
    pub players: Vec<PlayerState>,
    /// One terrain per position.
    #[serde(with = "terrain_list")]
    pub terrains: BTreeMap<Position, TerrainState>,
    pub events: Vec<GameEvent>,
    /// `None` on a finished match means a draw.
    pub winner: Option<Team>,
    pub is_finished: bool,
    /// Whose combat turn it is.
    pub active_player: Option<PlayerId>,
    /// Bumped on every phase or turn change.
    pub turn_seq: u64,
    pub synergies: Vec<SynergyState>,
}

impl GameState {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn general(&self, id: GeneralId) -> Option<&GeneralState> {
        self.players
            .iter()
            .flat_map(|p| p.generals.iter())
            .find(|g| g.id == id)
    }

    /// Whether any participating player on `team` is still alive.
    pub fn team_standing(&self, team: Team) -> bool {
        self.players
            .iter()
            .any(|p| p.team == team && p.participating && p.is_alive)
    }
}

/// A seat in a running match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,
    pub generals: Vec<GeneralState>,
    pub hand: Vec<Card>,
    /// False once every one of the player's generals has fallen.
    pub is_alive: bool,
    pub action_points: u32,
    /// Cleared when the player leaves or disconnects.
    pub participating: bool,
    /// Ready for combat (Deploy) or turn finished (Combat).
    pub phase_done: bool,
}

impl PlayerState {
    /// Whether the player still takes turns.
    pub fn is_eligible(&self) -> bool {
        self.participating && self.is_alive
    }

    pub(crate) fn refresh_alive(&mut self) {
        self.is_alive = self.generals.is_empty() || self.generals.iter().any(GeneralState::is_alive);
    }
}

/// A general on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralState {
    pub id: GeneralId,
    /// Catalog key this general was built from.
    pub key: String,
    pub name: String,
    pub faction: String,
    pub role: String,
    /// Always within `0..=max_hp`.
    pub current_hp: i32,
    pub max_hp: i32,
    pub position: Position,
    pub skills: Vec<Skill>,
    pub buffs: Vec<Buff>,
    pub equipment: Vec<Equipment>,
    /// Spent its action for this round.
    pub has_acted: bool,
}

impl GeneralState {
    pub fn is_alive(&self) -> bool {
        self.current_hp > 0
    }

    /// Sum of `stat` across buffs and equipment.
    pub fn modifier(&self, stat: Stat) -> i32 {
        let from_buffs = self.buffs.iter().flat_map(|b| b.modifiers.iter());
        let from_gear = self.equipment.iter().flat_map(|e| e.modifiers.iter());
        from_buffs
            .chain(from_gear)
            .filter(|m| m.stat == stat)
            .map(|m| m.amount)
            .sum()
    }

    /// Lowers HP by `amount`, never below zero. Returns the HP lost.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let before = self.current_hp;
        self.current_hp = (self.current_hp - amount.max(0)).clamp(0, self.max_hp);
        before - self.current_hp
    }

    /// Raises HP by `amount`, never above `max_hp`. Returns the HP gained.
    /// A fallen general stays fallen.
    pub fn heal(&mut self, amount: i32) -> i32 {
        if !self.is_alive() {
            return 0;
        }
        let before = self.current_hp;
        self.current_hp = (self.current_hp + amount.max(0)).clamp(0, self.max_hp);
        self.current_hp - before
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainState {
    pub id: TerrainId,
    pub key: String,
    pub name: String,
    pub position: Position,
    pub effects: Vec<TerrainEffect>,
    pub owner: Option<PlayerId>,
    /// Rounds remaining; `-1` is permanent, `0` means removed.
    pub duration: i32,
    pub is_activated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buff {
    pub id: BuffId,
    pub name: String,
    pub kind: BuffKind,
    /// Rounds remaining. Negative means permanent.
    pub duration: i32,
    pub modifiers: Vec<Modifier>,
    pub source: Option<PlayerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    Spades,
    Hearts,
    Clubs,
    Diamonds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub key: String,
    pub name: String,
    pub suit: Suit,
    pub value: u8,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    Active,
    Passive,
    Locked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub key: String,
    pub name: String,
    pub kind: SkillKind,
    pub cooldown: u32,
    /// Rounds until usable again; ticks down at EndRound.
    pub current_cooldown: u32,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentSlot {
    Weapon,
    Armor,
    Mount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub key: String,
    pub name: String,
    pub slot: EquipmentSlot,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

/// A catalog synergy and whether it held at the last Prepare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynergyState {
    pub key: String,
    pub name: String,
    /// Teams the synergy is active for.
    pub active_for: Vec<Team>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Something that happened in a match, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_id: Option<GeneralId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl GameEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            player_id: None,
            general_id: None,
            action: None,
            payload,
            timestamp: now_millis(),
        }
    }

    pub fn by(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    pub fn with_general(mut self, general_id: GeneralId) -> Self {
        self.general_id = Some(general_id);
        self
    }

    pub fn from_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Elimination,
    RoundCeiling,
}

/// The typed body of a [`GameEvent`], tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    PhaseChanged { round: u32, phase: Phase },
    TurnStarted,
    PhaseEnded,
    CardPlayed { card_id: CardId, card: String },
    SkillUsed { skill: String },
    GeneralMoved { from: Position, to: Position, cost: u32 },
    TerrainDeployed { terrain_id: TerrainId, terrain: String, position: Position },
    TerrainExpired { terrain_id: TerrainId, position: Position },
    Damaged { target: GeneralId, amount: i32, remaining_hp: i32 },
    Healed { target: GeneralId, amount: i32, current_hp: i32 },
    BuffApplied { target: GeneralId, buff_id: BuffId, name: String },
    BuffExpired { target: GeneralId, buff_id: BuffId },
    DebuffsRemoved { target: GeneralId, count: usize },
    GeneralFell { target: GeneralId },
    SynergyActivated { synergy: String, team: Team },
    PlayerLeft,
    GameOver { winner: Option<Team>, reason: FinishReason },
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// JSON maps need string keys, so the terrain map goes over the wire as a
/// list (each entry carries its own position).
mod terrain_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Position, TerrainState};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Position, TerrainState>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Position, TerrainState>, D::Error> {
        let list = Vec::<TerrainState>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|t| (t.position, t)).collect())
    }
}
