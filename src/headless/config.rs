//! JSON scenario configuration for headless mode
//!
//! A scenario describes the map, the defenders placed at the start, static
//! obstacles and the hostile waves. It is parsed with `serde_json` and
//! validated before anything is spawned.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{DEFAULT_MAP_HALF_HEIGHT, DEFAULT_MAP_HALF_WIDTH, MAX_TICK_MS};
use crate::entity::EntityKind;
use crate::stats::StatCatalog;
use crate::world::spawning::Wave;
use crate::world::{Simulation, SimulationSettings};

/// A static obstacle placed at scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleConfig {
    pub position: Vec2,
    pub radius: f32,
    #[serde(default = "default_obstacle_health")]
    pub health: f32,
}

/// A group of units placed in a column at scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadConfig {
    pub type_id: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_faction")]
    pub faction: EntityKind,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Centre of the column
    pub position: Vec2,
    /// Vertical distance between members
    #[serde(default = "default_spacing")]
    pub spacing: f32,
}

impl SquadConfig {
    /// Start positions of every member, centred on `position`.
    pub fn positions(&self) -> Vec<Vec2> {
        let middle = (self.count.max(1) - 1) as f32 * 0.5;
        (0..self.count)
            .map(|i| self.position + Vec2::new(0.0, (i as f32 - middle) * self.spacing))
            .collect()
    }
}

/// Headless scenario loaded from JSON
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Half the map width (map spans -w..w)
    #[serde(default = "default_half_width")]
    pub map_half_width: f32,
    /// Half the map height (map spans -h..h)
    #[serde(default = "default_half_height")]
    pub map_half_height: f32,
    /// Simulation step in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: f32,
    /// Maximum run duration in seconds (default: 300)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f32,
    /// Random seed for reproducible runs
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Custom output path for the run log (optional)
    #[serde(default)]
    pub output_path: Option<String>,
    /// Write the run log when the run ends
    #[serde(default = "default_true")]
    pub save_log: bool,
    /// Unit catalog to use instead of the built-in one
    #[serde(default)]
    pub catalog_path: Option<String>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
    pub squads: Vec<SquadConfig>,
    #[serde(default)]
    pub waves: Vec<Wave>,
}

fn default_obstacle_health() -> f32 {
    200.0
}

fn default_level() -> u32 {
    1
}

fn default_faction() -> EntityKind {
    EntityKind::Friendly
}

fn default_count() -> u32 {
    1
}

fn default_spacing() -> f32 {
    24.0
}

fn default_half_width() -> f32 {
    DEFAULT_MAP_HALF_WIDTH
}

fn default_half_height() -> f32 {
    DEFAULT_MAP_HALF_HEIGHT
}

fn default_tick_ms() -> f32 {
    1000.0 / 60.0
}

fn default_max_duration() -> f32 {
    300.0
}

fn default_true() -> bool {
    true
}

impl ScenarioConfig {
    /// Load a scenario from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scenario file: {}", e))?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a scenario from JSON text
    pub fn from_json_str(contents: &str) -> Result<Self, String> {
        let config: ScenarioConfig =
            serde_json::from_str(contents).map_err(|e| format!("Failed to parse JSON: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that do not depend on the unit catalog
    pub fn validate(&self) -> Result<(), String> {
        if !(self.map_half_width.is_finite() && self.map_half_width > 0.0)
            || !(self.map_half_height.is_finite() && self.map_half_height > 0.0)
        {
            return Err("map_half_width and map_half_height must be positive".to_string());
        }
        if !(self.tick_ms.is_finite() && self.tick_ms > 0.0 && self.tick_ms <= MAX_TICK_MS) {
            return Err(format!("tick_ms must be in (0, {}]", MAX_TICK_MS));
        }
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err("max_duration_secs must be positive".to_string());
        }

        if self.squads.is_empty() {
            return Err("at least one squad is required".to_string());
        }
        if !self.squads.iter().any(|s| s.faction == EntityKind::Friendly && s.count > 0) {
            return Err("at least one friendly unit is required".to_string());
        }
        for (i, squad) in self.squads.iter().enumerate() {
            if !matches!(squad.faction, EntityKind::Friendly | EntityKind::Hostile) {
                return Err(format!("squad {} must be Friendly or Hostile", i));
            }
            if !squad.position.is_finite() || !squad.spacing.is_finite() {
                return Err(format!("squad {} has a non-finite position", i));
            }
        }

        for (i, obstacle) in self.obstacles.iter().enumerate() {
            if !obstacle.position.is_finite() || !(obstacle.radius.is_finite() && obstacle.radius > 0.0) {
                return Err(format!("obstacle {} needs a finite position and positive radius", i));
            }
        }

        for (i, wave) in self.waves.iter().enumerate() {
            if !(wave.start_secs.is_finite() && wave.start_secs >= 0.0) {
                return Err(format!("wave {} start_secs must be non-negative", i));
            }
            if wave.count > 0 && !wave.spawns.iter().any(|s| s.weight.is_finite() && s.weight > 0.0) {
                return Err(format!("wave {} has no spawn entry with positive weight", i));
            }
        }

        Ok(())
    }

    /// Check that every unit type the scenario names exists in `catalog`
    pub fn validate_against(&self, catalog: &StatCatalog) -> Result<(), String> {
        let squad_types = self.squads.iter().map(|s| s.type_id.as_str());
        let wave_types = self
            .waves
            .iter()
            .flat_map(|w| w.spawns.iter().map(|s| s.type_id.as_str()));
        for type_id in squad_types.chain(wave_types) {
            if !catalog.contains(type_id) {
                let known: Vec<&str> = catalog.type_ids().collect();
                return Err(format!(
                    "Unknown unit type: '{}'. Valid types: {}",
                    type_id,
                    known.join(", ")
                ));
            }
        }
        Ok(())
    }

    /// The unit catalog this scenario runs with
    pub fn load_catalog(&self) -> Result<StatCatalog, String> {
        let catalog = match &self.catalog_path {
            Some(path) => StatCatalog::load_from_file(path)?,
            None => StatCatalog::builtin()?,
        };
        self.validate_against(&catalog)?;
        Ok(catalog)
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(
            -self.map_half_width,
            -self.map_half_height,
            self.map_half_width,
            self.map_half_height,
        )
    }

    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            bounds: self.bounds(),
            seed: self.random_seed,
            ..Default::default()
        }
    }

    /// Place obstacles and squads, and queue the waves.
    pub fn populate(&self, simulation: &mut Simulation) {
        simulation.log_match_event("Scenario started".to_string());
        for obstacle in &self.obstacles {
            simulation.spawn_obstacle(obstacle.position, obstacle.radius, obstacle.health);
        }
        for squad in &self.squads {
            for position in squad.positions() {
                simulation.spawn_unit(&squad.type_id, squad.level, squad.faction, position);
            }
        }
        for wave in &self.waves {
            simulation.add_wave(wave.clone());
        }
        info!(
            "Scenario ready: {} obstacles, {} squads, {} waves",
            self.obstacles.len(),
            self.squads.len(),
            self.waves.len()
        );
    }
}
