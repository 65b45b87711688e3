//! Simulated units
//!
//! Per-entity mutable state. Everything static about a unit lives in its
//! [`Capabilities`], resolved once at spawn.

use bevy::prelude::*;

use crate::entity::{EntityId, EntityKind};
use crate::navigation::NavPhase;
use crate::physics::BodyId;
use crate::presentation::ObjectSnapshot;
use crate::stats::Capabilities;

/// A hostile, friendly or obstacle entity.
#[derive(Debug, Clone)]
pub struct Unit {
    pub id: EntityId,
    pub caps: Capabilities,
    /// Movement body; obstacles have none
    pub body: Option<BodyId>,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Facing in radians
    pub facing: f32,
    pub spawn: Vec2,
    pub health: f32,
    pub target: Option<EntityId>,
    /// Seconds until the next attack
    pub attack_cooldown: f32,
    pub phase: NavPhase,
    pub in_attack_range: bool,
    /// Cleared the moment health reaches zero
    pub alive: bool,

    // Match statistics
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub kills: u32,
}

impl Unit {
    pub fn new(id: EntityId, caps: Capabilities, position: Vec2, body: Option<BodyId>) -> Self {
        Self {
            id,
            health: caps.max_health,
            caps,
            body,
            position,
            velocity: Vec2::ZERO,
            facing: 0.0,
            spawn: position,
            target: None,
            attack_cooldown: 0.0,
            phase: NavPhase::Idle,
            in_attack_range: false,
            alive: true,
            damage_dealt: 0.0,
            damage_taken: 0.0,
            kills: 0,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.caps.kind
    }

    pub fn is_alive(&self) -> bool {
        self.alive && self.health > 0.0
    }

    pub fn snapshot(&self, tint: Option<u32>) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            kind: self.caps.kind,
            type_id: self.caps.type_id.clone(),
            position: self.position,
            facing: self.facing,
            radius: self.caps.radius,
            health: self.health,
            max_health: self.caps.max_health,
            tint,
        }
    }
}
