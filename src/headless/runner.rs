//! Headless scenario execution
//!
//! Runs a scenario without any graphical output, suitable for automated
//! testing and balance sweeps. Time advances by a fixed manual step, so a
//! seeded run replays identically.

use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use serde::Serialize;
use std::time::Duration;

use crate::combat::log::CombatLogEventType;
use crate::entity::EntityKind;
use crate::plugin::{SimulationPlugin, SimulationSet};
use crate::presentation::PresentationQueue;
use crate::world::{Counters, Simulation};

use super::config::ScenarioConfig;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchOutcome {
    /// Every wave spawned and every hostile destroyed
    Defended,
    /// No friendly unit left
    Overrun,
    /// `max_duration_secs` reached first
    TimedOut,
}

/// A unit still standing when the run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurvivorResult {
    pub type_id: String,
    pub kind: EntityKind,
    pub level: u32,
    pub max_health: f32,
    pub final_health: f32,
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub kills: u32,
}

/// Result of a completed headless run
///
/// This struct provides programmatic access to run results for testing and analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub outcome: MatchOutcome,
    /// Simulated seconds until the run ended
    pub elapsed_secs: f32,
    /// Live friendlies and hostiles, in id order
    pub survivors: Vec<SurvivorResult>,
    pub hostiles_killed: u32,
    pub friendlies_lost: u32,
    pub rewards: u64,
    /// Random seed used (if deterministic mode)
    pub random_seed: Option<u64>,
    pub counters: Counters,
}

/// Resource to track headless run state
#[derive(Resource)]
pub struct HeadlessState {
    /// Maximum run duration before declaring a timeout
    pub max_duration: f32,
    /// Custom output path for the run log
    pub output_path: Option<String>,
    pub save_log: bool,
    /// Whether the run has completed
    pub complete: bool,
    /// Populated when the run completes
    pub result: Option<MatchResult>,
}

/// Plugin for headless execution
pub struct HeadlessPlugin {
    pub config: ScenarioConfig,
}

impl Plugin for HeadlessPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.config.clone())
            .insert_resource(HeadlessState {
                max_duration: self.config.max_duration_secs,
                output_path: self.config.output_path.clone(),
                save_log: self.config.save_log,
                complete: false,
                result: None,
            })
            .add_systems(Startup, headless_setup)
            .add_systems(
                Update,
                (headless_discard_presentation, headless_check_end)
                    .chain()
                    .after(SimulationSet::Report),
            )
            .add_systems(PostUpdate, headless_exit_on_complete);
    }
}

/// Populate the world from the scenario
fn headless_setup(config: Res<ScenarioConfig>, mut simulation: ResMut<Simulation>) {
    match simulation.seed() {
        Some(seed) => info!("Using deterministic RNG with seed: {}", seed),
        None => info!("Using non-deterministic RNG (no seed provided)"),
    }
    config.populate(&mut simulation);
}

/// Nothing renders in headless mode; keep the queue from growing.
fn headless_discard_presentation(mut queue: ResMut<PresentationQueue>) {
    queue.clear();
}

/// Decide whether the run is over (overrun, defended, or timeout)
fn headless_check_end(mut simulation: ResMut<Simulation>, mut state: ResMut<HeadlessState>) {
    if state.complete {
        return;
    }

    let counters = simulation.counters();
    let elapsed = simulation.elapsed_secs();
    let outcome = if counters.friendlies == 0 {
        info!("Defenders overrun after {:.1}s", elapsed);
        MatchOutcome::Overrun
    } else if counters.hostiles == 0 && simulation.waves_exhausted() {
        info!("All waves defeated after {:.1}s", elapsed);
        MatchOutcome::Defended
    } else if elapsed >= state.max_duration {
        info!("Run timed out after {:.1}s", elapsed);
        MatchOutcome::TimedOut
    } else {
        return;
    };

    simulation.log_match_event(format!("Run ended: {:?}", outcome));
    let result = build_match_result(&simulation, outcome);
    if state.save_log {
        match simulation.log().save_to_file(&result, state.output_path.as_deref()) {
            Ok(path) => println!("Run complete. Log saved to: {}", path),
            Err(e) => eprintln!("Failed to save combat log: {}", e),
        }
    }
    state.result = Some(result);
    state.complete = true;
}

/// Build the MatchResult from the current world
pub fn build_match_result(simulation: &Simulation, outcome: MatchOutcome) -> MatchResult {
    let counters = simulation.counters();
    let survivors = simulation
        .units()
        .filter(|u| u.alive && matches!(u.kind(), EntityKind::Friendly | EntityKind::Hostile))
        .map(|u| SurvivorResult {
            type_id: u.caps.type_id.clone(),
            kind: u.kind(),
            level: u.caps.level,
            max_health: u.caps.max_health,
            final_health: u.health,
            damage_dealt: u.damage_dealt,
            damage_taken: u.damage_taken,
            kills: u.kills,
        })
        .collect();

    MatchResult {
        outcome,
        elapsed_secs: simulation.elapsed_secs(),
        survivors,
        hostiles_killed: counters.hostiles_killed,
        friendlies_lost: counters.friendlies_lost,
        rewards: counters.rewards,
        random_seed: simulation.seed(),
        counters,
    }
}

/// Exit the app when the run is complete
fn headless_exit_on_complete(state: Res<HeadlessState>, mut exit: EventWriter<AppExit>) {
    if state.complete {
        exit.send(AppExit::Success);
    }
}

/// Run a scenario to completion and return its result
pub fn run_headless(config: ScenarioConfig) -> Result<MatchResult, String> {
    run(config, None)
}

/// Like [`run_headless`], with a `LogPlugin` installed on the run's app so
/// simulation logging reaches stderr.
pub fn run_headless_with_log(config: ScenarioConfig, level: Level) -> Result<MatchResult, String> {
    run(config, Some(level))
}

fn run(config: ScenarioConfig, log_level: Option<Level>) -> Result<MatchResult, String> {
    let (mut app, max_frames) = build_headless_app(config, log_level)?;

    for _ in 0..max_frames {
        app.update();
        if app.should_exit().is_some() {
            break;
        }
    }

    app.world_mut()
        .resource_mut::<HeadlessState>()
        .result
        .take()
        .ok_or_else(|| "Run did not finish within its frame budget".to_string())
}

/// Assemble the headless app and the number of frames it may take.
fn build_headless_app(config: ScenarioConfig, log_level: Option<Level>) -> Result<(App, u64), String> {
    config.validate()?;
    let catalog = config.load_catalog()?;
    let step = Duration::from_secs_f64(f64::from(config.tick_ms) / 1000.0);
    // One extra frame primes the clock; the rest is slack for float drift
    let max_frames = (f64::from(config.max_duration_secs) / step.as_secs_f64()).ceil() as u64 + 4;

    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    if let Some(level) = log_level {
        app.add_plugins(LogPlugin { level, ..default() });
    }

    info!(
        "Starting headless run: {} squads, {} waves, max {:.0}s",
        config.squads.len(),
        config.waves.len(),
        config.max_duration_secs
    );

    app.add_plugins(SimulationPlugin {
        catalog,
        settings: config.settings(),
    })
    .add_plugins(HeadlessPlugin { config })
    .insert_resource(TimeUpdateStrategy::ManualDuration(step));
    app.finish();
    app.cleanup();

    Ok((app, max_frames))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(json: &str) -> ScenarioConfig {
        let mut config = ScenarioConfig::from_json_str(json).unwrap();
        config.save_log = false;
        config
    }

    #[test]
    fn test_empty_map_is_defended_immediately() {
        let result = run_headless(scenario(
            r#"{ "random_seed": 1, "squads": [{ "type_id": "archer", "position": [0.0, 0.0] }] }"#,
        ))
        .unwrap();
        assert_eq!(result.outcome, MatchOutcome::Defended);
        assert_eq!(result.survivors.len(), 1);
        assert_eq!(result.random_seed, Some(1));
    }

    #[test]
    fn test_log_plugin_joins_the_run_app() {
        let config = || {
            scenario(r#"{ "random_seed": 1, "squads": [{ "type_id": "archer", "position": [0.0, 0.0] }] }"#)
        };

        let (quiet, _) = build_headless_app(config(), None).unwrap();
        assert!(!quiet.is_plugin_added::<LogPlugin>());
        assert!(quiet.is_plugin_added::<HeadlessPlugin>());

        let (logged, _) = build_headless_app(config(), Some(Level::WARN)).unwrap();
        assert!(logged.is_plugin_added::<LogPlugin>());
        assert!(logged.is_plugin_added::<SimulationPlugin>());
    }

    #[test]
    fn test_logged_run_matches_quiet_run() {
        let json = r#"{ "random_seed": 3, "max_duration_secs": 2.0,
            "squads": [{ "type_id": "knight", "position": [0.0, 0.0] }],
            "waves": [{ "start_secs": 0.2, "count": 2, "spawns": [{ "type_id": "grunt", "weight": 1.0 }] }] }"#;
        let quiet = run_headless(scenario(json)).unwrap();
        let logged = run_headless_with_log(scenario(json), Level::WARN).unwrap();
        assert_eq!(quiet, logged);
    }

    #[test]
    fn test_timeout_respected() {
        let result = run_headless(scenario(
            r#"{
                "random_seed": 1,
                "max_duration_secs": 1.0,
                "squads": [{ "type_id": "archer", "position": [0.0, 0.0] }],
                "waves": [{ "start_secs": 30.0, "count": 1, "spawns": [{ "type_id": "grunt", "weight": 1.0 }] }]
            }"#,
        ))
        .unwrap();
        assert_eq!(result.outcome, MatchOutcome::TimedOut);
        assert!(result.elapsed_secs >= 1.0 - 1e-3);
        assert!(result.elapsed_secs < 1.1);
    }
}
