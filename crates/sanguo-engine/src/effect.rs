//! Effect records carried by cards, skills, synergies and terrain.
//!
//! Every effect is a closed variant with its own typed payload. Catalog
//! content picks from these variants; the engine knows how to resolve
//! each one.
//!
//! On the wire (and in catalog JSON) the variant is named by `kind` and
//! its fields sit next to it:
//!
//! ```json
//! { "kind": "damage", "amount": 2, "target": "enemy" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::BuffId;
use crate::model::Buff;
use sanguo_protocol::PlayerId;

/// What an effect does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectKind {
    Damage { amount: i32 },
    Heal { amount: i32 },
    ApplyBuff { buff: BuffTemplate },
    /// Strips every debuff from the target.
    RemoveDebuffs,
}

/// Which generals an effect lands on, relative to whoever triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    /// The acting general.
    #[serde(rename = "self")]
    Caster,
    /// One allied general named in the request's targets.
    Ally,
    /// One enemy general named in the request's targets.
    Enemy,
    AllAllies,
    AllEnemies,
    /// Every general named in the request's targets.
    Targets,
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Caster => "self",
            Self::Ally => "ally",
            Self::Enemy => "enemy",
            Self::AllAllies => "all_allies",
            Self::AllEnemies => "all_enemies",
            Self::Targets => "targets",
        })
    }
}

/// An effect plus where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    #[serde(flatten)]
    pub kind: EffectKind,
    pub target: TargetScope,
}

// ---------------------------------------------------------------------------
// Buffs and stat modifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    /// Added to outgoing card and skill damage.
    Attack,
    /// Subtracted from incoming card and skill damage.
    Defense,
    /// Added to the movement range.
    Movement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub stat: Stat,
    pub amount: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    Buff,
    Debuff,
}

/// The catalog's description of a buff; [`BuffTemplate::instantiate`]
/// turns it into a live [`Buff`] with its own id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffTemplate {
    pub name: String,
    pub kind: BuffKind,
    /// Rounds remaining. Negative means it never expires.
    pub duration: i32,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

impl BuffTemplate {
    pub fn instantiate(&self, source: Option<PlayerId>) -> Buff {
        Buff {
            id: BuffId::next(),
            name: self.name.clone(),
            kind: self.kind,
            duration: self.duration,
            modifiers: self.modifiers.clone(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Terrain effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainEffectKind {
    Damage { amount: i32 },
    Heal { amount: i32 },
    ApplyBuff { buff: BuffTemplate },
    /// Moving onto the tile costs this many extra action points.
    MovementLimit { extra_cost: u32 },
}

/// When a terrain effect fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainTrigger {
    /// At every Prepare phase, on whoever stands on the tile.
    #[default]
    Stay,
    /// When a general moves onto the tile.
    Enter,
}

impl TerrainEffectKind {
    /// The general-facing part of this effect, if it has one.
    pub fn as_effect(&self) -> Option<EffectKind> {
        match self {
            Self::Damage { amount } => Some(EffectKind::Damage { amount: *amount }),
            Self::Heal { amount } => Some(EffectKind::Heal { amount: *amount }),
            Self::ApplyBuff { buff } => Some(EffectKind::ApplyBuff { buff: buff.clone() }),
            Self::MovementLimit { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainEffect {
    #[serde(flatten)]
    pub kind: TerrainEffectKind,
    #[serde(default)]
    pub trigger: TerrainTrigger,
}
