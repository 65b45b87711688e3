//! Integration tests for the combat log
//!
//! These tests verify that the CombatLog correctly:
//! - Records spawns, waves, damage and deaths from a running simulation
//! - Stamps entries with simulation time in order
//! - Filters and trims entries

use bevy::prelude::*;
use hordesim::world::spawning::{Wave, WeightedSpawn};
use hordesim::{
    CombatLog, CombatLogEventType, EntityKind, PresentationQueue, Simulation, SimulationSettings, StatCatalog,
};

fn create_test_log() -> CombatLog {
    CombatLog::default()
}

fn skirmish() -> Simulation {
    let mut sim = Simulation::new(
        StatCatalog::builtin().unwrap(),
        SimulationSettings {
            seed: Some(99),
            ..Default::default()
        },
    );
    sim.spawn_unit("knight", 1, EntityKind::Friendly, Vec2::ZERO);
    sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::new(40.0, 0.0));
    sim.add_wave(Wave {
        start_secs: 0.5,
        count: 1,
        interval_secs: 0.0,
        spawns: vec![WeightedSpawn {
            type_id: "grunt".to_string(),
            level: 1,
            weight: 1.0,
        }],
    });
    sim
}

fn run(sim: &mut Simulation, seconds: f32) {
    let mut sink = PresentationQueue::new(sim.bounds());
    let ticks = (seconds * 1000.0 / 16.0) as u32;
    for _ in 0..ticks {
        sim.tick(16.0, &mut sink);
        sink.clear();
    }
}

// =============================================================================
// Basic Log Operations
// =============================================================================

#[test]
fn test_empty_log() {
    let log = create_test_log();
    assert!(log.entries.is_empty());
    assert!(log.recent(5).is_empty());
    assert!(log.filter_by_type(CombatLogEventType::Damage).is_empty());
}

#[test]
fn test_recent_returns_tail() {
    let mut log = create_test_log();
    for i in 0..4 {
        log.log(CombatLogEventType::Damage, format!("hit {}", i));
    }
    let recent = log.recent(10);
    assert_eq!(recent.len(), 4);
    assert_eq!(recent[0].message, "hit 0");
}

#[test]
fn test_clear_resets_time() {
    let mut log = create_test_log();
    log.match_time = 12.0;
    log.log(CombatLogEventType::MatchEvent, "end".to_string());
    log.clear();
    assert!(log.entries.is_empty());
    assert_eq!(log.match_time, 0.0);
}

// =============================================================================
// Simulation Recording
// =============================================================================

#[test]
fn test_spawns_are_logged() {
    let sim = skirmish();
    let spawns = sim.log().filter_by_type(CombatLogEventType::Spawn);
    assert_eq!(spawns.len(), 2);
    assert!(spawns[0].message.contains("knight"));
    assert!(spawns[1].message.contains("grunt"));
}

#[test]
fn test_fight_records_damage_and_deaths() {
    let mut sim = skirmish();
    run(&mut sim, 20.0);

    let log = sim.log();
    assert!(!log.filter_by_type(CombatLogEventType::Damage).is_empty());
    assert_eq!(log.filter_by_type(CombatLogEventType::Wave).len(), 1);
    assert_eq!(
        log.filter_by_type(CombatLogEventType::Death).len() as u32,
        sim.counters().hostiles_killed + sim.counters().friendlies_lost
    );
}

#[test]
fn test_timestamps_follow_simulation_time() {
    let mut sim = skirmish();
    run(&mut sim, 3.0);

    let log = sim.log();
    assert!(log
        .entries
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    let wave = log.filter_by_type(CombatLogEventType::Wave);
    assert!(wave[0].timestamp >= 0.5);
    assert!(log.match_time <= sim.elapsed_secs() + 1e-4);
}

#[test]
fn test_match_events_are_logged() {
    let mut sim = skirmish();
    sim.log_match_event("Scenario started".to_string());
    let events = sim.log().filter_by_type(CombatLogEventType::MatchEvent);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timestamp, 0.0);
}
