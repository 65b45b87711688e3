//! Data-Driven Unit Catalog
//!
//! Per-type unit stats are defined in `assets/config/units.ron` instead of
//! being hardcoded. The simulation only ever reads them: a [`StatTable`]
//! answers `(type_id, level) -> UnitStats` and the answer is resolved once
//! per spawned entity into its [`Capabilities`].
//!
//! ## Usage
//! ```ignore
//! let catalog = StatCatalog::builtin()?;
//! let grunt = catalog.stats("grunt", 3).unwrap();
//! println!("Level 3 grunt has {} HP", grunt.max_health);
//! ```

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::combat::AttackProfile;
use crate::constants::DEFAULT_MASS;
use crate::entity::EntityKind;
use crate::navigation::obstacles::PassabilityTag;
use crate::targeting::TargetingPolicy;

/// Catalog shipped with the crate.
pub const BUILTIN_CATALOG: &str = include_str!("../../assets/config/units.ron");

fn default_mass() -> f32 {
    DEFAULT_MASS
}

fn default_true() -> bool {
    true
}

/// Per-level growth, as fractions of the level-1 value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelScaling {
    #[serde(default)]
    pub health: f32,
    #[serde(default)]
    pub damage: f32,
    #[serde(default)]
    pub armor: f32,
    #[serde(default)]
    pub reward: f32,
}

/// Level-1 stats of a unit type, as written in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Display name
    pub name: String,
    pub max_health: f32,
    #[serde(default)]
    pub armor: f32,
    /// Movement speed in units/second
    pub move_speed: f32,
    #[serde(default = "default_mass")]
    pub mass: f32,
    pub radius: f32,
    /// Reward granted when this unit is destroyed
    #[serde(default)]
    pub reward: u32,
    pub attack: AttackProfile,
    pub targeting: TargetingPolicy,
    #[serde(default)]
    pub passability: PassabilityTag,
    /// Wander around the spawn point while idle
    #[serde(default)]
    pub wanders: bool,
    /// Ask the pathfinder for waypoints when far from the target
    #[serde(default = "default_true")]
    pub uses_pathfinding: bool,
    #[serde(default)]
    pub per_level: LevelScaling,
}

impl UnitStats {
    /// Stats at `level` (levels start at 1; 0 is treated as 1).
    pub fn at_level(&self, level: u32) -> UnitStats {
        let steps = level.max(1) as f32 - 1.0;
        let grow = |base: f32, rate: f32| base * (1.0 + rate * steps);

        let mut scaled = self.clone();
        scaled.max_health = grow(self.max_health, self.per_level.health);
        scaled.armor = grow(self.armor, self.per_level.armor);
        scaled.attack.damage = grow(self.attack.damage, self.per_level.damage);
        scaled.reward = grow(self.reward as f32, self.per_level.reward).round().max(0.0) as u32;
        scaled
    }

    /// Check the values a simulation cannot sanitize on its own.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_health.is_finite() && self.max_health > 0.0) {
            return Err(format!("{}: max_health must be positive", self.name));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(format!("{}: radius must be non-negative", self.name));
        }
        if !(self.move_speed.is_finite() && self.move_speed >= 0.0) {
            return Err(format!("{}: move_speed must be non-negative", self.name));
        }
        if self.targeting.allowed.is_empty() {
            return Err(format!("{}: targeting must allow at least one kind", self.name));
        }
        self.attack.validate().map_err(|e| format!("{}: {}", self.name, e))
    }
}

/// Read-only `(type_id, level) -> stats` lookup.
pub trait StatTable {
    fn stats(&self, type_id: &str, level: u32) -> Option<UnitStats>;
}

/// Root structure of a units.ron file
#[derive(Debug, Serialize, Deserialize)]
pub struct UnitsConfig {
    pub units: BTreeMap<String, UnitStats>,
}

/// Unit catalog loaded from RON.
#[derive(Resource, Debug, Clone)]
pub struct StatCatalog {
    units: BTreeMap<String, UnitStats>,
}

impl StatCatalog {
    pub fn new(config: UnitsConfig) -> Result<Self, String> {
        if config.units.is_empty() {
            return Err("Unit catalog is empty".to_string());
        }
        for stats in config.units.values() {
            stats.validate()?;
        }
        Ok(Self { units: config.units })
    }

    /// Parse a catalog from RON text.
    pub fn from_ron_str(contents: &str) -> Result<Self, String> {
        let config: UnitsConfig =
            ron::from_str(contents).map_err(|e| format!("Failed to parse unit catalog: {}", e))?;
        Self::new(config)
    }

    /// Load a catalog from a RON file on disk.
    pub fn load_from_file(path: &str) -> Result<Self, String> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
        let catalog = Self::from_ron_str(&contents).map_err(|e| format!("{}: {}", path, e))?;
        info!("Loaded {} unit types from {}", catalog.units.len(), path);
        Ok(catalog)
    }

    /// The catalog embedded in the crate.
    pub fn builtin() -> Result<Self, String> {
        Self::from_ron_str(BUILTIN_CATALOG)
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.units.contains_key(type_id)
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }
}

impl StatTable for StatCatalog {
    fn stats(&self, type_id: &str, level: u32) -> Option<UnitStats> {
        self.units.get(type_id).map(|stats| stats.at_level(level))
    }
}

/// Everything an entity can do, resolved once at spawn.
#[derive(Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub type_id: String,
    pub level: u32,
    pub kind: EntityKind,
    pub max_health: f32,
    pub armor: f32,
    pub move_speed: f32,
    pub mass: f32,
    pub radius: f32,
    pub reward: u32,
    /// None for entities that never attack (obstacles)
    pub attack: Option<AttackProfile>,
    pub targeting: Option<TargetingPolicy>,
    pub passability: PassabilityTag,
    pub wanders: bool,
    pub uses_pathfinding: bool,
}

impl Capabilities {
    pub fn for_unit(type_id: &str, level: u32, kind: EntityKind, stats: UnitStats) -> Self {
        Self {
            type_id: type_id.to_string(),
            level: level.max(1),
            kind,
            max_health: stats.max_health,
            armor: stats.armor,
            move_speed: stats.move_speed,
            mass: stats.mass,
            radius: stats.radius,
            reward: stats.reward,
            attack: Some(stats.attack),
            targeting: Some(stats.targeting),
            passability: stats.passability,
            wanders: stats.wanders,
            uses_pathfinding: stats.uses_pathfinding,
        }
    }

    /// A static destructible blocker.
    pub fn obstacle(radius: f32, max_health: f32) -> Self {
        Self {
            type_id: "obstacle".to_string(),
            level: 1,
            kind: EntityKind::Obstacle,
            max_health,
            armor: 0.0,
            move_speed: 0.0,
            mass: DEFAULT_MASS,
            radius,
            reward: 0,
            attack: None,
            targeting: None,
            passability: PassabilityTag::Ground,
            wanders: false,
            uses_pathfinding: false,
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.move_speed > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = StatCatalog::builtin();
        assert!(catalog.is_ok(), "{:?}", catalog.err());
        if let Ok(catalog) = catalog {
            assert!(catalog.contains("grunt"));
            assert!(catalog.contains("archer"));
        }
    }

    #[test]
    fn test_level_scaling() {
        let catalog = StatCatalog::builtin().unwrap();
        let level1 = catalog.stats("grunt", 1).unwrap();
        let level3 = catalog.stats("grunt", 3).unwrap();
        assert!(level3.max_health > level1.max_health);
        assert_eq!(catalog.stats("grunt", 0), Some(level1));
        assert_eq!(catalog.stats("no_such_unit", 1), None);
    }

    #[test]
    fn test_rejects_bad_catalog() {
        assert!(StatCatalog::from_ron_str("(units: {})").is_err());
        assert!(StatCatalog::from_ron_str("not ron").is_err());
    }
}
