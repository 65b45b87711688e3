//! Presentation boundary
//!
//! The simulation never renders. Once per tick it pushes object changes and
//! transient effects into a write-only [`PresentationSink`]; the only thing it
//! reads back is the map bounds.

use bevy::prelude::*;
use serde::Serialize;

use crate::combat::events::EffectEvent;
use crate::entity::{EntityId, EntityKind};

/// Cloned view of one simulated object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Unit type from the catalog ("projectile" for projectiles)
    pub type_id: String,
    pub position: Vec2,
    pub facing: f32,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    /// Packed 0xRRGGBB status tint
    pub tint: Option<u32>,
}

impl ObjectSnapshot {
    pub fn health_fraction(&self) -> f32 {
        if self.max_health > 0.0 {
            (self.health / self.max_health).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Write-only target for visual updates.
pub trait PresentationSink {
    fn add_object(&mut self, object: &ObjectSnapshot);
    fn update_object(&mut self, object: &ObjectSnapshot);
    fn remove_object(&mut self, id: EntityId);
    fn play_effect(&mut self, _effect: &EffectEvent) {}
    fn map_bounds(&self) -> Rect;
}

/// One recorded presentation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PresentationCommand {
    Add(ObjectSnapshot),
    Update(ObjectSnapshot),
    Remove(EntityId),
    Effect(EffectEvent),
}

/// Sink that records every call, for the Bevy plugin, the headless runner
/// and tests.
#[derive(Resource, Debug, Clone)]
pub struct PresentationQueue {
    bounds: Rect,
    /// Keep per-tick position updates; off for long headless runs
    pub record_updates: bool,
    commands: Vec<PresentationCommand>,
}

impl PresentationQueue {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            record_updates: true,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[PresentationCommand] {
        &self.commands
    }

    pub fn drain(&mut self) -> Vec<PresentationCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl PresentationSink for PresentationQueue {
    fn add_object(&mut self, object: &ObjectSnapshot) {
        self.commands.push(PresentationCommand::Add(object.clone()));
    }

    fn update_object(&mut self, object: &ObjectSnapshot) {
        if self.record_updates {
            self.commands.push(PresentationCommand::Update(object.clone()));
        }
    }

    fn remove_object(&mut self, id: EntityId) {
        self.commands.push(PresentationCommand::Remove(id));
    }

    fn play_effect(&mut self, effect: &EffectEvent) {
        self.commands.push(PresentationCommand::Effect(effect.clone()));
    }

    fn map_bounds(&self) -> Rect {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(health: f32) -> ObjectSnapshot {
        ObjectSnapshot {
            id: EntityId(1),
            kind: EntityKind::Hostile,
            type_id: "grunt".to_string(),
            position: Vec2::ZERO,
            facing: 0.0,
            radius: 5.0,
            health,
            max_health: 20.0,
            tint: None,
        }
    }

    #[test]
    fn test_health_fraction_clamped() {
        assert_eq!(snapshot(10.0).health_fraction(), 0.5);
        assert_eq!(snapshot(-3.0).health_fraction(), 0.0);
    }

    #[test]
    fn test_queue_skips_updates_when_disabled() {
        let mut queue = PresentationQueue::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        queue.record_updates = false;
        queue.add_object(&snapshot(20.0));
        queue.update_object(&snapshot(10.0));
        queue.remove_object(EntityId(1));
        assert_eq!(queue.commands().len(), 2);
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.commands().is_empty());
    }
}
