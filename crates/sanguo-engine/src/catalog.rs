//! Read-only game content: generals, terrain, cards and synergies.
//!
//! The engine consumes content through the [`Catalog`] trait and never
//! owns it. [`StaticCatalog`] is the stock implementation, loaded from
//! JSON.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use sanguo_protocol::PlayerId;

use crate::effect::{Effect, TerrainEffect};
use crate::ids::{CardId, GeneralId, TerrainId};
use crate::model::{
    Card, Equipment, GeneralState, Position, Skill, SkillKind, Suit, TerrainState,
};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate {kind} key {key:?}")]
    DuplicateKey { kind: &'static str, key: String },

    #[error("{owner:?} references unknown {kind} {key:?}")]
    UnknownReference {
        owner: String,
        kind: &'static str,
        key: String,
    },

    #[error("terrain {0:?} must have duration -1 or at least 1")]
    InvalidDuration(String),
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralDef {
    pub key: String,
    pub name: String,
    pub faction: String,
    pub role: String,
    pub hp: i32,
    #[serde(default)]
    pub skills: Vec<SkillDef>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
}

impl GeneralDef {
    /// Builds a fresh general at `position`, at full HP.
    pub fn instantiate(&self, position: Position) -> GeneralState {
        GeneralState {
            id: GeneralId::next(),
            key: self.key.clone(),
            name: self.name.clone(),
            faction: self.faction.clone(),
            role: self.role.clone(),
            current_hp: self.hp,
            max_hp: self.hp,
            position,
            skills: self.skills.iter().map(SkillDef::instantiate).collect(),
            buffs: Vec::new(),
            equipment: self.equipment.clone(),
            has_acted: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDef {
    pub key: String,
    pub name: String,
    pub kind: SkillKind,
    #[serde(default)]
    pub cooldown: u32,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

impl SkillDef {
    fn instantiate(&self) -> Skill {
        Skill {
            key: self.key.clone(),
            name: self.name.clone(),
            kind: self.kind,
            cooldown: self.cooldown,
            current_cooldown: 0,
            effects: self.effects.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainDef {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub effects: Vec<TerrainEffect>,
    /// `-1` for permanent terrain.
    pub duration: i32,
}

impl TerrainDef {
    /// An activated tile at `position`, controlled by `owner` if any.
    pub fn instantiate(&self, position: Position, owner: Option<PlayerId>) -> TerrainState {
        TerrainState {
            id: TerrainId::next(),
            key: self.key.clone(),
            name: self.name.clone(),
            position,
            effects: self.effects.clone(),
            owner,
            duration: self.duration,
            is_activated: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDef {
    pub key: String,
    pub name: String,
    pub suit: Suit,
    pub value: u8,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

impl CardDef {
    pub fn instantiate(&self) -> Card {
        Card {
            id: CardId::next(),
            key: self.key.clone(),
            name: self.name.clone(),
            suit: self.suit,
            value: self.value,
            effects: self.effects.clone(),
        }
    }
}

/// A bonus that holds while every listed general is alive on one team
/// (and, if named, the terrain is active somewhere on the board).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynergyDef {
    pub key: String,
    pub name: String,
    /// General catalog keys.
    pub generals: Vec<String>,
    #[serde(default)]
    pub terrain: Option<String>,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// Source of game content.
pub trait Catalog: Send + Sync {
    fn generals(&self) -> &[GeneralDef];
    fn terrains(&self) -> &[TerrainDef];
    fn cards(&self) -> &[CardDef];
    fn synergies(&self) -> &[SynergyDef];
    /// Card keys dealt to every player when a match starts.
    fn starting_hand(&self) -> &[String];

    fn general(&self, key: &str) -> Option<&GeneralDef> {
        self.generals().iter().find(|g| g.key == key)
    }

    fn terrain(&self, key: &str) -> Option<&TerrainDef> {
        self.terrains().iter().find(|t| t.key == key)
    }

    fn card(&self, key: &str) -> Option<&CardDef> {
        self.cards().iter().find(|c| c.key == key)
    }
}

/// Content held in memory, usually loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub generals: Vec<GeneralDef>,
    #[serde(default)]
    pub terrains: Vec<TerrainDef>,
    #[serde(default)]
    pub cards: Vec<CardDef>,
    #[serde(default)]
    pub synergies: Vec<SynergyDef>,
    #[serde(default)]
    pub starting_hand: Vec<String>,
}

const BUILTIN: &str = include_str!("../data/catalog.json");

impl StaticCatalog {
    /// Parses and validates a catalog document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// The content that ships with the server.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        unique("general", self.generals.iter().map(|g| &g.key))?;
        unique("terrain", self.terrains.iter().map(|t| &t.key))?;
        unique("card", self.cards.iter().map(|c| &c.key))?;
        unique("synergy", self.synergies.iter().map(|s| &s.key))?;

        if let Some(t) = self.terrains.iter().find(|t| t.duration == 0 || t.duration < -1) {
            return Err(CatalogError::InvalidDuration(t.key.clone()));
        }

        for synergy in &self.synergies {
            for general in &synergy.generals {
                if self.general(general).is_none() {
                    return Err(unknown(&synergy.key, "general", general));
                }
            }
            if let Some(terrain) = &synergy.terrain {
                if self.terrain(terrain).is_none() {
                    return Err(unknown(&synergy.key, "terrain", terrain));
                }
            }
        }

        for card in &self.starting_hand {
            if self.card(card).is_none() {
                return Err(unknown("starting_hand", "card", card));
            }
        }
        Ok(())
    }
}

impl Catalog for StaticCatalog {
    fn generals(&self) -> &[GeneralDef] {
        &self.generals
    }

    fn terrains(&self) -> &[TerrainDef] {
        &self.terrains
    }

    fn cards(&self) -> &[CardDef] {
        &self.cards
    }

    fn synergies(&self) -> &[SynergyDef] {
        &self.synergies
    }

    fn starting_hand(&self) -> &[String] {
        &self.starting_hand
    }
}

fn unique<'a>(
    kind: &'static str,
    keys: impl Iterator<Item = &'a String>,
) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(CatalogError::DuplicateKey {
                kind,
                key: key.clone(),
            });
        }
    }
    Ok(())
}

fn unknown(owner: &str, kind: &'static str, key: &str) -> CatalogError {
    CatalogError::UnknownReference {
        owner: owner.to_owned(),
        kind,
        key: key.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = StaticCatalog::builtin().expect("builtin catalog must be valid");
        assert!(catalog.generals().len() >= 6);
        assert!(catalog.general("guan_yu").is_some());
        assert!(catalog.terrain("river").is_some());
        assert!(!catalog.starting_hand().is_empty());
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let json = r#"{"generals":[
            {"key":"a","name":"A","faction":"wei","role":"x","hp":3},
            {"key":"a","name":"B","faction":"wei","role":"x","hp":3}
        ]}"#;
        let err = StaticCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateKey { kind: "general", .. }));
    }

    #[test]
    fn test_synergy_must_reference_known_generals() {
        let json = r#"{"synergies":[{"key":"oath","name":"Oath","generals":["liu_bei"]}]}"#;
        let err = StaticCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownReference { kind: "general", .. }));
    }

    #[test]
    fn test_zero_duration_terrain_is_rejected() {
        let json = r#"{"terrains":[{"key":"fog","name":"Fog","duration":0}]}"#;
        assert!(matches!(
            StaticCatalog::from_json(json),
            Err(CatalogError::InvalidDuration(key)) if key == "fog"
        ));
    }

    #[test]
    fn test_general_instantiates_at_full_hp() {
        let catalog = StaticCatalog::builtin().unwrap();
        let def = catalog.general("zhuge_liang").unwrap();
        let general = def.instantiate(Position::new(1, 0));
        assert_eq!(general.current_hp, def.hp);
        assert_eq!(general.max_hp, def.hp);
        assert_eq!(general.skills.len(), def.skills.len());
        assert!(general.skills.iter().all(|s| s.current_cooldown == 0));
    }
}
