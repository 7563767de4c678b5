//! Match engine for Sanguo.
//!
//! A match is a [`GameState`] driven through rounds of
//! `Prepare → Deploy → Combat → EndRound` by a [`TurnEngine`]. Players
//! act through [`TurnEngine::dispatch`]; content (generals, terrain,
//! cards, synergies) comes from a [`Catalog`].
//!
//! The engine does no I/O and never waits. Timing belongs to whoever
//! owns it (see `sanguo-room`).

mod action;
mod catalog;
mod dispatch;
mod effect;
mod engine;
mod ids;
mod model;
mod rules;

pub use action::{Action, ActionKind, ActionRequest, ActionResponse, Rejection};
pub use catalog::{
    CardDef, Catalog, CatalogError, GeneralDef, SkillDef, StaticCatalog, SynergyDef, TerrainDef,
};
pub use effect::{
    BuffKind, BuffTemplate, Effect, EffectKind, Modifier, Stat, TargetScope, TerrainEffect,
    TerrainEffectKind, TerrainTrigger,
};
pub use engine::{Seat, TurnEngine, WaitPoint};
pub use ids::{BuffId, CardId, GeneralId, TerrainId};
pub use model::{
    Buff, Card, Equipment, EquipmentSlot, EventPayload, FinishReason, GameEvent, GameState,
    GeneralState, Phase, PlayerState, Position, Skill, SkillKind, Suit, SynergyState, Team,
    TerrainState,
};
pub use rules::{PhasePolicy, Rules, VictoryCondition};
