//! Simulation World
//!
//! [`Simulation`] owns every table the subsystems operate on and advances
//! them in a fixed order each tick:
//!
//! 1. Wave spawning
//! 2. Pathfinder obstacle cache
//! 3. Targeting (ascending id, reservations reset per tick)
//! 4. Navigation steering
//! 5. Integration, overlap separation and bounds clamp
//! 6. Spatial re-registration
//! 7. Projectile flight
//! 8. Attacks
//! 9. Damage over time
//! 10. Status expiry
//! 11. Presentation flush
//!
//! Nothing here is fatal. Unknown unit types, non-finite positions and stale
//! ids are logged and ignored.

pub mod spawning;
pub mod unit;

use bevy::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::combat::events::TickEvents;
use crate::combat::log::{CombatLog, CombatLogEventType};
use crate::combat::projectiles::{Projectile, ProjectileSet};
use crate::combat::{self, CombatContext};
use crate::constants::*;
use crate::entity::{EntityId, EntityKind, IdAllocator};
use crate::navigation::obstacles::PassabilityTag;
use crate::navigation::pathfinding::PathfindingService;
use crate::navigation::{GridPathfinder, NavAgent, NavContext, NavTarget, NavigationController, Obstacle, ObstacleField};
use crate::physics::MovementIntegrator;
use crate::presentation::{ObjectSnapshot, PresentationSink};
use crate::rng::GameRng;
use crate::spatial::SpatialIndex;
use crate::stats::{Capabilities, StatTable};
use crate::status::StatusEffectStack;
use crate::targeting::{Seeker, TargetingResolver, TargetingWorld};
use spawning::{Wave, WaveSpawner};

pub use unit::Unit;

/// World construction parameters.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub bounds: Rect,
    pub spatial_cell_size: f32,
    pub path_cell_size: f32,
    /// Seed for the shared random source; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            bounds: Rect::new(
                -DEFAULT_MAP_HALF_WIDTH,
                -DEFAULT_MAP_HALF_HEIGHT,
                DEFAULT_MAP_HALF_WIDTH,
                DEFAULT_MAP_HALF_HEIGHT,
            ),
            spatial_cell_size: SPATIAL_CELL_SIZE,
            path_cell_size: PATH_CELL_SIZE,
            seed: None,
        }
    }
}

/// Aggregate numbers surfaced to the runner and UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Counters {
    pub hostiles: usize,
    pub friendlies: usize,
    pub obstacles: usize,
    pub projectiles: usize,
    pub hostile_health: f32,
    pub friendly_health: f32,
    pub spawned: u32,
    pub hostiles_killed: u32,
    pub friendlies_lost: u32,
    pub obstacles_destroyed: u32,
    pub rewards: u64,
    pub ticks: u64,
}

/// Keep a unit's circle inside `bounds`. Never panics on a map smaller than
/// the unit.
fn clamp_to_bounds(position: Vec2, radius: f32, bounds: Rect) -> Vec2 {
    let inset = Vec2::splat(radius.max(0.0));
    let min = bounds.min + inset;
    let max = bounds.max - inset;
    Vec2::new(
        position.x.max(min.x).min(max.x.max(min.x)),
        position.y.max(min.y).min(max.y.max(min.y)),
    )
}

fn projectile_snapshot(projectile: &Projectile) -> ObjectSnapshot {
    ObjectSnapshot {
        id: projectile.id,
        kind: EntityKind::Projectile,
        type_id: projectile
            .visual
            .clone()
            .unwrap_or_else(|| "projectile".to_string()),
        position: projectile.position,
        facing: projectile.velocity.y.atan2(projectile.velocity.x),
        radius: projectile.radius,
        health: 1.0,
        max_health: 1.0,
        tint: None,
    }
}

/// The whole simulated world.
#[derive(Resource)]
pub struct Simulation {
    bounds: Rect,
    catalog: Box<dyn StatTable + Send + Sync>,
    units: BTreeMap<EntityId, Unit>,
    index: SpatialIndex<EntityKind>,
    integrator: MovementIntegrator,
    navigation: NavigationController,
    targeting: TargetingResolver,
    statuses: StatusEffectStack,
    obstacles: ObstacleField,
    pathfinder: Box<dyn PathfindingService + Send + Sync>,
    projectiles: ProjectileSet,
    log: CombatLog,
    rng: GameRng,
    spawner: WaveSpawner,
    ids: IdAllocator,
    events: TickEvents,
    totals: Counters,
    elapsed: f32,
    /// Entities not yet announced to the presentation sink
    pending_adds: Vec<EntityId>,
    pending_removes: Vec<EntityId>,
}

impl Simulation {
    pub fn new(catalog: impl StatTable + Send + Sync + 'static, settings: SimulationSettings) -> Self {
        let bounds = if settings.bounds.is_empty() || !settings.bounds.min.is_finite() || !settings.bounds.max.is_finite() {
            warn!("Invalid map bounds {:?}, using defaults", settings.bounds);
            SimulationSettings::default().bounds
        } else {
            settings.bounds
        };
        let rng = match settings.seed {
            Some(seed) => GameRng::from_seed(seed),
            None => GameRng::from_entropy(),
        };

        Self {
            bounds,
            catalog: Box::new(catalog),
            units: BTreeMap::new(),
            index: SpatialIndex::new(settings.spatial_cell_size),
            integrator: MovementIntegrator::new(),
            navigation: NavigationController::new(),
            targeting: TargetingResolver::new(),
            statuses: StatusEffectStack::new(),
            obstacles: ObstacleField::new(settings.spatial_cell_size),
            pathfinder: Box::new(GridPathfinder::new(settings.path_cell_size, bounds)),
            projectiles: ProjectileSet::new(),
            log: CombatLog::default(),
            rng,
            spawner: WaveSpawner::default(),
            ids: IdAllocator::default(),
            events: TickEvents::default(),
            totals: Counters::default(),
            elapsed: 0.0,
            pending_adds: Vec::new(),
            pending_removes: Vec::new(),
        }
    }

    /// Swap the pathfinding service, e.g. for a straight-line one on open maps.
    pub fn set_pathfinder(&mut self, pathfinder: impl PathfindingService + Send + Sync + 'static) {
        self.pathfinder = Box::new(pathfinder);
    }

    pub fn add_wave(&mut self, wave: Wave) {
        self.spawner.add_wave(wave);
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Simulated seconds since the start.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed
    }

    pub fn seed(&self) -> Option<u64> {
        self.rng.seed
    }

    pub fn waves_exhausted(&self) -> bool {
        self.spawner.is_exhausted()
    }

    pub fn log(&self) -> &CombatLog {
        &self.log
    }

    /// Record a run-level event (start, end) in the combat log.
    pub fn log_match_event(&mut self, message: String) {
        self.log.log(CombatLogEventType::MatchEvent, message);
    }

    /// Events produced by the last tick.
    pub fn events(&self) -> &TickEvents {
        &self.events
    }

    pub fn statuses(&self) -> &StatusEffectStack {
        &self.statuses
    }

    pub fn statuses_mut(&mut self) -> &mut StatusEffectStack {
        &mut self.statuses
    }

    pub fn navigation(&self) -> &NavigationController {
        &self.navigation
    }

    pub fn projectiles(&self) -> &ProjectileSet {
        &self.projectiles
    }

    pub fn entity(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Closest live entity to `position`, e.g. for picking under a cursor.
    pub fn nearest_entity(&self, position: Vec2) -> Option<EntityId> {
        self.index
            .nearest_entry(position, NEAREST_MAX_LAYERS)
            .map(|(id, _)| id)
    }

    /// Every live unit and obstacle, in id order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Spawn a hostile or friendly unit of `type_id` at `position`.
    ///
    /// Returns `None` for unknown types, non-unit factions, or a non-finite
    /// position. Positions outside the map are clamped onto it.
    pub fn spawn_unit(&mut self, type_id: &str, level: u32, faction: EntityKind, position: Vec2) -> Option<EntityId> {
        if !matches!(faction, EntityKind::Hostile | EntityKind::Friendly) {
            warn!("Cannot spawn {} as {}", type_id, faction.name());
            return None;
        }
        if !position.is_finite() {
            warn!("Cannot spawn {} at non-finite position", type_id);
            return None;
        }
        let Some(stats) = self.catalog.stats(type_id, level) else {
            warn!("Unknown unit type '{}'", type_id);
            return None;
        };

        let caps = Capabilities::for_unit(type_id, level, faction, stats);
        let position = clamp_to_bounds(position, caps.radius, self.bounds);
        let id = self.ids.next_id();
        let body = self.integrator.create_body(position, caps.mass, caps.move_speed);
        self.index.set(id, position, caps.radius, faction);

        debug!("Spawned {} {} '{}' (level {}) at {:?}", faction.name(), id, type_id, caps.level, position);
        self.log.log(
            CombatLogEventType::Spawn,
            format!("{} {} '{}' level {}", faction.name(), id, type_id, caps.level),
        );

        self.units.insert(id, Unit::new(id, caps, position, Some(body)));
        self.pending_adds.push(id);
        self.totals.spawned += 1;
        Some(id)
    }

    /// Spawn a static destructible obstacle.
    pub fn spawn_obstacle(&mut self, position: Vec2, radius: f32, max_health: f32) -> Option<EntityId> {
        if !position.is_finite() || !radius.is_finite() || radius <= 0.0 {
            warn!("Rejected obstacle at {:?} with radius {}", position, radius);
            return None;
        }
        let max_health = if max_health.is_finite() && max_health > 0.0 {
            max_health
        } else {
            warn!("Obstacle health {} invalid, using 1", max_health);
            1.0
        };

        let id = self.ids.next_id();
        let caps = Capabilities::obstacle(radius, max_health);
        self.index.set(id, position, radius, EntityKind::Obstacle);
        self.obstacles.insert(Obstacle::solid(id, position, radius));
        self.units.insert(id, Unit::new(id, caps, position, None));
        self.pending_adds.push(id);
        debug!("Spawned obstacle {} at {:?} (r {})", id, position, radius);
        Some(id)
    }

    /// Remove an entity without a death. Returns false for unknown ids.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if self.remove_entity(id).is_some() {
            debug!("Despawned {}", id);
            true
        } else {
            false
        }
    }

    fn remove_entity(&mut self, id: EntityId) -> Option<Unit> {
        let unit = self.units.remove(&id)?;
        if let Some(body) = unit.body {
            self.integrator.remove_body(body);
        }
        self.index.delete(id);
        self.navigation.remove(id);
        self.targeting.remove(id);
        self.statuses.remove_target(id);
        self.obstacles.remove(id);
        self.pending_removes.push(id);
        Some(unit)
    }

    /// Aggregate counters, with entity counts and health totals taken now.
    pub fn counters(&self) -> Counters {
        let mut counters = self.totals;
        for unit in self.units.values().filter(|u| u.alive) {
            match unit.kind() {
                EntityKind::Hostile => {
                    counters.hostiles += 1;
                    counters.hostile_health += unit.health;
                }
                EntityKind::Friendly => {
                    counters.friendlies += 1;
                    counters.friendly_health += unit.health;
                }
                EntityKind::Obstacle => counters.obstacles += 1,
                EntityKind::Projectile => {}
            }
        }
        counters.projectiles = self.projectiles.len();
        counters
    }

    /// Cloned view of every live object, in id order.
    pub fn snapshot(&self) -> Vec<ObjectSnapshot> {
        let mut objects: Vec<ObjectSnapshot> = self
            .units
            .values()
            .filter(|u| u.alive)
            .map(|u| u.snapshot(self.statuses.visible_tint(u.id)))
            .collect();
        objects.extend(self.projectiles.iter().map(projectile_snapshot));
        objects.sort_by_key(|o| o.id);
        objects
    }

    /// Advance the world by `delta_ms` milliseconds.
    ///
    /// Non-finite or non-positive deltas advance nothing but still flush
    /// pending presentation changes. Deltas above [`MAX_TICK_MS`] are clamped.
    pub fn tick(&mut self, delta_ms: f32, sink: &mut dyn PresentationSink) {
        self.events.clear();
        if !(delta_ms.is_finite() && delta_ms > 0.0) {
            self.flush_presentation(sink);
            return;
        }
        let delta_ms = delta_ms.min(MAX_TICK_MS);
        let dt = delta_ms / 1000.0;
        self.elapsed += dt;
        self.log.match_time = self.elapsed;
        self.totals.ticks += 1;

        self.spawn_waves();
        self.pathfinder.cache_all_obstacles(&self.obstacles, PassabilityTag::Ground);
        self.update_targets();
        self.steer(dt);
        self.integrate(dt);
        self.separate();

        let hits = self.projectiles.advance(dt, &mut self.index, self.bounds);
        let mut ctx = self.combat_context();
        combat::resolve_projectile_hits(&mut ctx, hits);
        combat::resolve_attacks(&mut ctx, dt);
        let dot_ticks = ctx.statuses.tick_damage_over_time(delta_ms);
        combat::apply_damage_over_time(&mut ctx, &dot_ticks);
        self.statuses.update(delta_ms);

        self.collect_dead();
        self.flush_presentation(sink);
    }

    fn combat_context(&mut self) -> CombatContext<'_> {
        CombatContext {
            units: &mut self.units,
            index: &mut self.index,
            integrator: &mut self.integrator,
            statuses: &mut self.statuses,
            projectiles: &mut self.projectiles,
            ids: &mut self.ids,
            rng: &mut self.rng,
            log: &mut self.log,
            events: &mut self.events,
        }
    }

    fn spawn_waves(&mut self) {
        let wave_tick = self.spawner.update(self.elapsed, &mut self.rng, self.bounds);
        for index in wave_tick.started {
            info!("Wave {} started at {:.1}s", index + 1, self.elapsed);
            self.log.log(CombatLogEventType::Wave, format!("Wave {} started", index + 1));
        }
        for request in wave_tick.spawns {
            self.spawn_unit(&request.type_id, request.level, EntityKind::Hostile, request.position);
        }
    }

    fn update_targets(&mut self) {
        self.targeting.begin_tick();
        let ids: Vec<EntityId> = self.units.keys().copied().collect();

        for id in ids {
            let Some(unit) = self.units.get(&id).filter(|u| u.alive) else {
                continue;
            };
            let Some(policy) = unit.caps.targeting.as_ref() else {
                continue;
            };
            let seeker = Seeker {
                id,
                position: unit.position,
                radius: unit.caps.radius,
                reach: unit.caps.attack.as_ref().map(|a| a.reach).unwrap_or(0.0),
            };
            let mut world = TargetingWorld {
                index: &mut self.index,
                statuses: &self.statuses,
            };
            let current = unit.target;
            let target = self.targeting.resolve(&seeker, current, policy, &mut world);

            if target != current {
                if let Some(new_target) = target {
                    debug!("{} now targets {}", id, new_target);
                }
            }
            if let Some(unit) = self.units.get_mut(&id) {
                unit.target = target;
            }
        }
    }

    fn steer(&mut self, dt: f32) {
        let ids: Vec<EntityId> = self.units.keys().copied().collect();

        for id in ids {
            let Some(unit) = self.units.get(&id).filter(|u| u.alive) else {
                continue;
            };
            let Some(body) = unit.body else {
                continue;
            };
            let agent = NavAgent {
                id,
                position: unit.position,
                velocity: self.integrator.velocity(body).unwrap_or(unit.velocity),
                radius: unit.caps.radius,
                mass: unit.caps.mass,
                max_speed: unit.caps.move_speed,
                reach: unit.caps.attack.as_ref().map(|a| a.reach).unwrap_or(0.0),
                facing: unit.facing,
                spawn: unit.spawn,
                passability: unit.caps.passability,
                wanders: unit.caps.wanders,
                // The grid is cached for ground movement only
                uses_pathfinding: unit.caps.uses_pathfinding && unit.caps.passability == PassabilityTag::Ground,
            };
            let target = unit
                .target
                .and_then(|t| self.units.get(&t))
                .filter(|t| t.alive)
                .map(|t| NavTarget {
                    id: t.id,
                    position: t.position,
                    radius: t.caps.radius,
                });

            let mut ctx = NavContext {
                obstacles: &mut self.obstacles,
                pathfinder: self.pathfinder.as_mut(),
                rng: &mut self.rng,
                bounds: self.bounds,
            };
            let output = self.navigation.steer(&agent, target, dt, &mut ctx);
            self.integrator.set_force(body, output.force);

            if let Some(unit) = self.units.get_mut(&id) {
                unit.facing = output.facing;
                unit.phase = output.phase;
                unit.in_attack_range = output.in_attack_range;
            }
        }
    }

    /// Integrate bodies, copy the results back and re-register moved units.
    fn integrate(&mut self, dt: f32) {
        self.integrator.update(dt);

        for unit in self.units.values_mut().filter(|u| u.alive) {
            let Some(body) = unit.body else {
                continue;
            };
            let (Some(position), Some(velocity)) = (self.integrator.position(body), self.integrator.velocity(body)) else {
                continue;
            };
            let clamped = clamp_to_bounds(position, unit.caps.radius, self.bounds);
            if clamped != position {
                self.integrator.set_position(body, clamped);
            }
            unit.position = clamped;
            unit.velocity = velocity;
            self.index.set(unit.id, clamped, unit.caps.radius, unit.caps.kind);
        }
    }

    /// Push overlapping bodies apart.
    ///
    /// Pairs are visited in id order so float accumulation is reproducible.
    /// Immobile units and obstacles never move; a mobile unit takes the whole
    /// correction against them and half against another mobile unit.
    fn separate(&mut self) {
        let movable = |unit: &Unit| unit.alive && unit.body.is_some() && unit.caps.is_mobile();
        let ids: Vec<EntityId> = self
            .units
            .values()
            .filter(|u| movable(u))
            .map(|u| u.id)
            .collect();

        let mut pushes: BTreeMap<EntityId, Vec2> = BTreeMap::new();
        let mut nearby = Vec::new();
        for id in ids {
            let Some(unit) = self.units.get(&id) else {
                continue;
            };
            let (position, radius, passability) = (unit.position, unit.caps.radius, unit.caps.passability);
            self.index.query_ids_into(position, radius, &mut nearby);
            nearby.sort();

            for other_id in nearby.iter().copied() {
                if other_id == id {
                    continue;
                }
                let Some(other) = self.units.get(&other_id).filter(|u| u.alive) else {
                    continue;
                };
                let other_movable = movable(other);
                if other_movable && other_id < id {
                    continue;
                }
                if other.kind() == EntityKind::Obstacle
                    && self
                        .obstacles
                        .get(other_id)
                        .is_some_and(|o| o.passable_for(passability))
                {
                    continue;
                }

                let offset = position - other.position;
                let min_distance = radius + other.caps.radius;
                let distance = offset.length();
                if distance >= min_distance {
                    continue;
                }
                let normal = if distance > 1e-4 { offset / distance } else { Vec2::X };
                let correction = normal * (min_distance - distance) * SEPARATION_STRENGTH;

                if other_movable {
                    *pushes.entry(id).or_default() += correction * 0.5;
                    *pushes.entry(other_id).or_default() -= correction * 0.5;
                } else {
                    *pushes.entry(id).or_default() += correction;
                }
            }
        }

        for (id, push) in pushes {
            let Some(unit) = self.units.get_mut(&id) else {
                continue;
            };
            let position = clamp_to_bounds(unit.position + push, unit.caps.radius, self.bounds);
            unit.position = position;
            if let Some(body) = unit.body {
                self.integrator.set_position(body, position);
            }
            self.index.set(id, position, unit.caps.radius, unit.caps.kind);
        }
    }

    /// Finish cleanup of everything destroyed this tick.
    fn collect_dead(&mut self) {
        let deaths = self.events.deaths.clone();
        for death in deaths {
            self.totals.rewards += u64::from(death.reward);
            match death.victim_kind {
                EntityKind::Hostile => self.totals.hostiles_killed += 1,
                EntityKind::Friendly => self.totals.friendlies_lost += 1,
                EntityKind::Obstacle => self.totals.obstacles_destroyed += 1,
                EntityKind::Projectile => {}
            }
            self.remove_entity(death.victim);
        }
    }

    fn flush_presentation(&mut self, sink: &mut dyn PresentationSink) {
        // Spawned and removed before ever being shown: the sink never hears of it
        let mut adds = std::mem::take(&mut self.pending_adds);
        let mut removes = std::mem::take(&mut self.pending_removes);
        let (projectile_adds, projectile_removes) = self.projectiles.drain_changes();
        adds.extend(projectile_adds);
        removes.extend(projectile_removes);
        let unseen: BTreeSet<EntityId> = adds.iter().copied().filter(|id| removes.contains(id)).collect();

        let mut changed: BTreeSet<EntityId> = self.events.damage.iter().map(|d| d.target).collect();
        changed.extend(self.statuses.drain_tint_changes().into_iter().map(|(id, _)| id));

        let added: BTreeSet<EntityId> = adds.into_iter().filter(|id| !unseen.contains(id)).collect();
        for id in &added {
            if let Some(unit) = self.units.get(id) {
                sink.add_object(&unit.snapshot(self.statuses.visible_tint(*id)));
            } else if let Some(projectile) = self.projectiles.get(*id) {
                sink.add_object(&projectile_snapshot(projectile));
            }
        }

        for unit in self.units.values() {
            if added.contains(&unit.id) {
                continue;
            }
            if unit.body.is_some() || changed.contains(&unit.id) {
                sink.update_object(&unit.snapshot(self.statuses.visible_tint(unit.id)));
            }
        }
        for projectile in self.projectiles.iter() {
            if !added.contains(&projectile.id) {
                sink.update_object(&projectile_snapshot(projectile));
            }
        }

        for effect in &self.events.effects {
            sink.play_effect(effect);
        }
        for id in removes {
            if !unseen.contains(&id) {
                sink.remove_object(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::{PresentationCommand, PresentationQueue};
    use crate::stats::StatCatalog;

    fn sim() -> Simulation {
        let catalog = StatCatalog::builtin().unwrap();
        Simulation::new(
            catalog,
            SimulationSettings {
                seed: Some(7),
                ..Default::default()
            },
        )
    }

    fn queue(sim: &Simulation) -> PresentationQueue {
        PresentationQueue::new(sim.bounds())
    }

    #[test]
    fn test_clamp_to_bounds_handles_tiny_maps() {
        let bounds = Rect::new(0.0, 0.0, 4.0, 4.0);
        let clamped = clamp_to_bounds(Vec2::new(-50.0, 50.0), 10.0, bounds);
        assert!(clamped.is_finite());
        assert_eq!(clamp_to_bounds(Vec2::new(2.0, 2.0), 1.0, bounds), Vec2::new(2.0, 2.0));
    }

    #[test]
    fn test_spawn_rejects_unknown_and_non_finite() {
        let mut sim = sim();
        assert!(sim.spawn_unit("no_such_unit", 1, EntityKind::Hostile, Vec2::ZERO).is_none());
        assert!(sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::NAN).is_none());
        assert!(sim.spawn_unit("grunt", 1, EntityKind::Obstacle, Vec2::ZERO).is_none());
        assert!(sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::ZERO).is_some());
        assert_eq!(sim.counters().hostiles, 1);
    }

    #[test]
    fn test_spawn_clamped_into_map() {
        let mut sim = sim();
        let id = sim
            .spawn_unit("grunt", 1, EntityKind::Friendly, Vec2::new(1.0e6, 0.0))
            .unwrap();
        let unit = sim.entity(id).unwrap();
        assert!(unit.position.x <= sim.bounds().max.x);
    }

    #[test]
    fn test_despawn_is_soft_for_stale_ids() {
        let mut sim = sim();
        let id = sim.spawn_obstacle(Vec2::ZERO, 10.0, 50.0).unwrap();
        assert!(sim.despawn(id));
        assert!(!sim.despawn(id));
        assert!(sim.entity(id).is_none());
        assert_eq!(sim.counters().obstacles, 0);
    }

    #[test]
    fn test_spawned_then_despawned_never_presented() {
        let mut sim = sim();
        let mut sink = queue(&sim);
        let id = sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::ZERO).unwrap();
        sim.despawn(id);
        sim.tick(16.0, &mut sink);
        assert!(sink.commands().is_empty());
    }

    #[test]
    fn test_first_tick_announces_objects() {
        let mut sim = sim();
        let mut sink = queue(&sim);
        let id = sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::ZERO).unwrap();
        sim.tick(16.0, &mut sink);
        assert!(sink
            .commands()
            .iter()
            .any(|c| matches!(c, PresentationCommand::Add(o) if o.id == id)));

        sink.clear();
        sim.tick(16.0, &mut sink);
        assert!(sink
            .commands()
            .iter()
            .all(|c| !matches!(c, PresentationCommand::Add(_))));
    }

    #[test]
    fn test_invalid_delta_advances_nothing() {
        let mut sim = sim();
        let mut sink = queue(&sim);
        sim.tick(f32::NAN, &mut sink);
        sim.tick(-5.0, &mut sink);
        assert_eq!(sim.elapsed_secs(), 0.0);
        assert_eq!(sim.counters().ticks, 0);
    }

    #[test]
    fn test_overlapping_units_pushed_apart() {
        let mut sim = sim();
        let mut sink = queue(&sim);
        let a = sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::new(0.0, 0.0)).unwrap();
        let b = sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::new(1.0, 0.0)).unwrap();
        let before = sim.entity(a).unwrap().position.distance(sim.entity(b).unwrap().position);
        for _ in 0..10 {
            sim.tick(16.0, &mut sink);
        }
        let after = sim.entity(a).unwrap().position.distance(sim.entity(b).unwrap().position);
        assert!(after > before);
    }

    #[test]
    fn test_nearest_entity_skips_removed() {
        let mut sim = sim();
        let near = sim.spawn_obstacle(Vec2::new(10.0, 0.0), 5.0, 50.0).unwrap();
        let far = sim.spawn_obstacle(Vec2::new(100.0, 0.0), 5.0, 50.0).unwrap();
        assert_eq!(sim.nearest_entity(Vec2::ZERO), Some(near));
        sim.despawn(near);
        assert_eq!(sim.nearest_entity(Vec2::ZERO), Some(far));
    }

    #[test]
    fn test_counters_track_health() {
        let mut sim = sim();
        sim.spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::new(-200.0, 0.0));
        sim.spawn_unit("archer", 1, EntityKind::Friendly, Vec2::new(200.0, 0.0));
        let counters = sim.counters();
        assert_eq!(counters.hostiles, 1);
        assert_eq!(counters.friendlies, 1);
        assert!(counters.hostile_health > 0.0);
        assert!(counters.friendly_health > 0.0);
        assert_eq!(counters.spawned, 2);
    }
}
