//! Bevy integration
//!
//! [`SimulationPlugin`] hosts a [`Simulation`] as a resource and advances it
//! from Bevy's `Time` every `Update`. Presentation changes land in a
//! [`PresentationQueue`] resource and combat events are re-sent as Bevy
//! events, so rendering or analytics systems can stay outside the core.

use bevy::prelude::*;

use crate::combat::events::{DamageEvent, DeathEvent, EffectEvent};
use crate::presentation::PresentationQueue;
use crate::stats::StatCatalog;
use crate::world::{Simulation, SimulationSettings};

/// Ordering of the simulation systems within `Update`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    /// Advance the world by the frame's delta
    Advance,
    /// Forward what the tick produced
    Report,
}

/// Speed multiplier for simulation time (0 pauses).
#[derive(Resource, Clone, Copy, Debug)]
pub struct SimulationSpeed {
    pub multiplier: f32,
}

impl Default for SimulationSpeed {
    fn default() -> Self {
        Self { multiplier: 1.0 }
    }
}

/// Adds the simulation resources and systems to an app.
pub struct SimulationPlugin {
    pub catalog: StatCatalog,
    pub settings: SimulationSettings,
}

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        let simulation = Simulation::new(self.catalog.clone(), self.settings.clone());
        let queue = PresentationQueue::new(simulation.bounds());

        app.insert_resource(simulation)
            .insert_resource(queue)
            .init_resource::<SimulationSpeed>()
            .add_event::<DamageEvent>()
            .add_event::<DeathEvent>()
            .add_event::<EffectEvent>()
            .configure_sets(Update, (SimulationSet::Advance, SimulationSet::Report).chain())
            .add_systems(Update, advance_simulation.in_set(SimulationSet::Advance))
            .add_systems(Update, forward_events.in_set(SimulationSet::Report));
    }
}

/// Tick the simulation by this frame's scaled delta.
pub fn advance_simulation(
    time: Res<Time>,
    speed: Res<SimulationSpeed>,
    mut simulation: ResMut<Simulation>,
    mut queue: ResMut<PresentationQueue>,
) {
    let delta_ms = time.delta_secs() * speed.multiplier * 1000.0;
    if delta_ms <= 0.0 {
        return;
    }
    simulation.tick(delta_ms, &mut *queue);
}

/// Re-send the last tick's combat events through Bevy's event queues.
pub fn forward_events(
    simulation: Res<Simulation>,
    mut damage: EventWriter<DamageEvent>,
    mut deaths: EventWriter<DeathEvent>,
    mut effects: EventWriter<EffectEvent>,
) {
    if !simulation.is_changed() {
        return;
    }
    let events = simulation.events();
    damage.send_batch(events.damage.iter().cloned());
    deaths.send_batch(events.deaths.iter().cloned());
    effects.send_batch(events.effects.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::time::TimeUpdateStrategy;
    use std::time::Duration;

    use crate::entity::EntityKind;

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(SimulationPlugin {
                catalog: StatCatalog::builtin().unwrap(),
                settings: SimulationSettings {
                    seed: Some(11),
                    ..Default::default()
                },
            })
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(20)));
        app
    }

    #[test]
    fn test_plugin_advances_with_time() {
        let mut app = app();
        app.world_mut()
            .resource_mut::<Simulation>()
            .spawn_unit("grunt", 1, EntityKind::Hostile, Vec2::ZERO);

        for _ in 0..5 {
            app.update();
        }

        let simulation = app.world().resource::<Simulation>();
        // First update only primes the clock
        assert!((simulation.elapsed_secs() - 0.08).abs() < 1e-4);
        assert!(!app.world().resource::<PresentationQueue>().commands().is_empty());
    }

    #[test]
    fn test_zero_speed_pauses() {
        let mut app = app();
        app.insert_resource(SimulationSpeed { multiplier: 0.0 });
        for _ in 0..5 {
            app.update();
        }
        assert_eq!(app.world().resource::<Simulation>().elapsed_secs(), 0.0);
    }
}
