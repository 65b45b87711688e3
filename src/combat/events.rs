//! Combat events
//!
//! Records of what happened during a tick. The simulation collects them and
//! the Bevy plugin forwards them as events for anything listening outside
//! the core.

use bevy::prelude::*;
use serde::Serialize;

use crate::entity::{EntityId, EntityKind};

/// How a damage instance was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DamageType {
    Direct,
    Area,
    Projectile,
    Arc,
    OverTime,
}

/// Event fired when damage is dealt
#[derive(Event, Debug, Clone, PartialEq, Serialize)]
pub struct DamageEvent {
    /// Entity dealing the damage (None once the source is gone)
    pub source: Option<EntityId>,
    /// Entity receiving the damage
    pub target: EntityId,
    /// Amount of damage before mitigation
    pub amount: f32,
    /// Amount of damage after mitigation
    pub final_amount: f32,
    pub damage_type: DamageType,
}

/// Event fired when an entity's health reaches zero
#[derive(Event, Debug, Clone, PartialEq, Serialize)]
pub struct DeathEvent {
    pub victim: EntityId,
    pub victim_kind: EntityKind,
    /// Entity that dealt the killing blow
    pub killer: Option<EntityId>,
    /// Reward granted for the kill
    pub reward: u32,
}

/// Shape of a transient visual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EffectShape {
    /// Beam or lightning arc between two points
    Link,
    /// Expanding ring around `from`
    Burst,
    /// Hit flash at `to`
    Impact,
}

/// Transient visual requested from the presentation layer
#[derive(Event, Debug, Clone, PartialEq, Serialize)]
pub struct EffectEvent {
    pub shape: EffectShape,
    /// Visual name from the unit catalog, if any
    pub visual: Option<String>,
    pub from: Vec2,
    pub to: Vec2,
    /// Radius for bursts
    pub radius: f32,
}

/// Everything combat produced during one tick
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    pub damage: Vec<DamageEvent>,
    pub deaths: Vec<DeathEvent>,
    pub effects: Vec<EffectEvent>,
}

impl TickEvents {
    pub fn clear(&mut self) {
        self.damage.clear();
        self.deaths.clear();
        self.effects.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.damage.is_empty() && self.deaths.is_empty() && self.effects.is_empty()
    }
}
