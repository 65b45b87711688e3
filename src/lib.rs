//! hordesim - Horde Defense Simulation Core
//!
//! A tick-driven 2D simulation of hostile waves, defenders and destructible
//! obstacles: spatial indexing, steering and pathfinding, targeting, combat
//! and status effects, hosted in Bevy or run headless.
//!
//! This library exposes the core modules for testing and reuse.

pub mod cli;
pub mod combat;
pub mod constants;
pub mod entity;
pub mod headless;
pub mod navigation;
pub mod physics;
pub mod plugin;
pub mod presentation;
pub mod rng;
pub mod spatial;
pub mod stats;
pub mod status;
pub mod targeting;
pub mod world;

// Re-export commonly used types
pub use combat::log::{CombatLog, CombatLogEventType};
pub use entity::{EntityId, EntityKind, KindMask};
pub use headless::{run_headless, MatchResult, ScenarioConfig};
pub use plugin::SimulationPlugin;
pub use presentation::{ObjectSnapshot, PresentationQueue, PresentationSink};
pub use stats::{StatCatalog, StatTable};
pub use world::{Counters, Simulation, SimulationSettings};
