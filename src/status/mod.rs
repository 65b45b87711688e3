//! Status Effect Stack
//!
//! Timed modifiers attached to a target: damage-over-time, incoming and
//! outgoing damage multipliers, and flat outgoing damage reduction.
//! Includes:
//! - At most one entry per (target, kind); re-application refreshes it
//! - Damage-over-time tick accumulation
//! - Deterministic visible tint when several effects are stacked

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

use crate::constants::DOT_TICK_INTERVAL_MS;
use crate::entity::EntityId;

/// Kind of a status effect. Declaration order breaks tint priority ties
/// (earlier kind wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusEffectKind {
    /// Deals `magnitude` damage every tick interval
    DamageOverTime,
    /// Scales damage taken by `magnitude`
    IncomingDamageMultiplier,
    /// Scales damage dealt by `magnitude`
    OutgoingDamageMultiplier,
    /// Subtracts `magnitude` from damage dealt
    OutgoingFlatReduction,
}

impl StatusEffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            StatusEffectKind::DamageOverTime => "Damage over time",
            StatusEffectKind::IncomingDamageMultiplier => "Vulnerable",
            StatusEffectKind::OutgoingDamageMultiplier => "Weakened",
            StatusEffectKind::OutgoingFlatReduction => "Blunted",
        }
    }

    /// Which of two magnitudes counts as stronger for this kind.
    fn stronger(&self, a: f32, b: f32) -> f32 {
        match self {
            StatusEffectKind::OutgoingDamageMultiplier => a.min(b),
            StatusEffectKind::DamageOverTime
            | StatusEffectKind::IncomingDamageMultiplier
            | StatusEffectKind::OutgoingFlatReduction => a.max(b),
        }
    }
}

/// Template for an effect an attack applies, as stored in unit stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusEffectSpec {
    pub kind: StatusEffectKind,
    pub duration_ms: f32,
    pub magnitude: f32,
    /// Packed 0xRRGGBB tint shown while the effect is active
    #[serde(default)]
    pub tint: Option<u32>,
    #[serde(default)]
    pub priority: i32,
}

impl StatusEffectSpec {
    pub fn instantiate(&self, source: Option<EntityId>) -> StatusEffect {
        StatusEffect {
            kind: self.kind,
            remaining_ms: self.duration_ms,
            magnitude: self.magnitude,
            tint: self.tint,
            priority: self.priority,
            source,
            tick_accumulator_ms: 0.0,
        }
    }
}

/// An active effect on one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEffect {
    pub kind: StatusEffectKind,
    pub remaining_ms: f32,
    pub magnitude: f32,
    pub tint: Option<u32>,
    pub priority: i32,
    /// Entity credited for damage-over-time kills
    pub source: Option<EntityId>,
    tick_accumulator_ms: f32,
}

/// One damage-over-time tick that came due.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotTick {
    pub target: EntityId,
    pub source: Option<EntityId>,
    pub damage: f32,
}

/// All active effects, keyed by target.
#[derive(Debug, Default)]
pub struct StatusEffectStack {
    effects: BTreeMap<EntityId, SmallVec<[StatusEffect; 4]>>,
    tints: HashMap<EntityId, u32>,
    tint_changes: Vec<(EntityId, Option<u32>)>,
}

impl StatusEffectStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an effect to `target`.
    ///
    /// If the target already carries the same kind, the duration is replaced
    /// by the new one and the stronger magnitude is kept. Effects with a
    /// non-finite or non-positive duration, or a non-finite magnitude, are
    /// ignored. Returns whether the effect was accepted.
    pub fn apply_effect(&mut self, target: EntityId, effect: StatusEffect) -> bool {
        if !effect.remaining_ms.is_finite() || effect.remaining_ms <= 0.0 || !effect.magnitude.is_finite() {
            warn!(
                "Ignoring malformed {} on {} (duration {}, magnitude {})",
                effect.kind.name(),
                target,
                effect.remaining_ms,
                effect.magnitude
            );
            return false;
        }

        let list = self.effects.entry(target).or_default();
        match list.iter_mut().find(|existing| existing.kind == effect.kind) {
            Some(existing) => {
                existing.magnitude = effect.kind.stronger(existing.magnitude, effect.magnitude);
                existing.remaining_ms = effect.remaining_ms;
                existing.tint = effect.tint;
                existing.priority = effect.priority;
                existing.source = effect.source.or(existing.source);
            }
            None => list.push(effect),
        }

        self.refresh_tint(target);
        true
    }

    /// Advance damage-over-time accumulators by `delta_ms` and return the
    /// ticks that came due. Must run before [`update`](Self::update) so an
    /// expiring effect still lands its final tick.
    pub fn tick_damage_over_time(&mut self, delta_ms: f32) -> Vec<DotTick> {
        let mut ticks = Vec::new();
        if !delta_ms.is_finite() || delta_ms <= 0.0 {
            return ticks;
        }
        for (target, list) in self.effects.iter_mut() {
            for effect in list.iter_mut().filter(|e| e.kind == StatusEffectKind::DamageOverTime) {
                effect.tick_accumulator_ms += delta_ms.min(effect.remaining_ms);
                while effect.tick_accumulator_ms >= DOT_TICK_INTERVAL_MS {
                    effect.tick_accumulator_ms -= DOT_TICK_INTERVAL_MS;
                    ticks.push(DotTick {
                        target: *target,
                        source: effect.source,
                        damage: effect.magnitude.max(0.0),
                    });
                }
            }
        }
        ticks
    }

    /// Count down every effect, drop the expired ones and recompute tints.
    pub fn update(&mut self, delta_ms: f32) {
        if !delta_ms.is_finite() || delta_ms <= 0.0 {
            return;
        }
        let targets: Vec<EntityId> = self.effects.keys().copied().collect();
        for target in targets {
            if let Some(list) = self.effects.get_mut(&target) {
                for effect in list.iter_mut() {
                    effect.remaining_ms -= delta_ms;
                }
                list.retain(|effect| effect.remaining_ms > 0.0);
                if list.is_empty() {
                    self.effects.remove(&target);
                }
            }
            self.refresh_tint(target);
        }
    }

    fn refresh_tint(&mut self, target: EntityId) {
        let tint = self.effects.get(&target).and_then(|list| {
            list.iter()
                .filter(|effect| effect.tint.is_some())
                .max_by(|a, b| a.priority.cmp(&b.priority).then(b.kind.cmp(&a.kind)))
                .and_then(|effect| effect.tint)
        });

        let previous = match tint {
            Some(tint) => self.tints.insert(target, tint),
            None => self.tints.remove(&target),
        };
        if previous != tint {
            self.tint_changes.push((target, tint));
        }
    }

    /// Damage taken multiplier for `target`, 1.0 when unaffected.
    pub fn incoming_damage_multiplier(&self, target: EntityId) -> f32 {
        self.aggregate(target, StatusEffectKind::IncomingDamageMultiplier)
            .reduce(f32::max)
            .unwrap_or(1.0)
    }

    pub fn outgoing_damage_multiplier(&self, target: EntityId) -> f32 {
        self.aggregate(target, StatusEffectKind::OutgoingDamageMultiplier)
            .reduce(f32::min)
            .unwrap_or(1.0)
    }

    pub fn outgoing_flat_reduction(&self, target: EntityId) -> f32 {
        self.aggregate(target, StatusEffectKind::OutgoingFlatReduction)
            .reduce(f32::max)
            .unwrap_or(0.0)
    }

    fn aggregate(&self, target: EntityId, kind: StatusEffectKind) -> impl Iterator<Item = f32> + '_ {
        self.effects(target)
            .iter()
            .filter(move |effect| effect.kind == kind)
            .map(|effect| effect.magnitude)
    }

    pub fn has_effect(&self, target: EntityId, kind: StatusEffectKind) -> bool {
        self.effects(target).iter().any(|effect| effect.kind == kind)
    }

    pub fn effects(&self, target: EntityId) -> &[StatusEffect] {
        self.effects.get(&target).map(|list| list.as_slice()).unwrap_or(&[])
    }

    pub fn visible_tint(&self, target: EntityId) -> Option<u32> {
        self.tints.get(&target).copied()
    }

    /// Forget a destroyed target. No tint notification is emitted.
    pub fn remove_target(&mut self, target: EntityId) {
        self.effects.remove(&target);
        self.tints.remove(&target);
        self.tint_changes.retain(|(id, _)| *id != target);
    }

    /// Targets whose visible tint changed since the last drain.
    pub fn drain_tint_changes(&mut self) -> Vec<(EntityId, Option<u32>)> {
        std::mem::take(&mut self.tint_changes)
    }

    /// Number of targets carrying at least one effect.
    pub fn affected_count(&self) -> usize {
        self.effects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(kind: StatusEffectKind, duration_ms: f32, magnitude: f32) -> StatusEffect {
        StatusEffectSpec {
            kind,
            duration_ms,
            magnitude,
            tint: None,
            priority: 0,
        }
        .instantiate(None)
    }

    fn tinted(kind: StatusEffectKind, tint: u32, priority: i32) -> StatusEffect {
        StatusEffectSpec {
            kind,
            duration_ms: 1000.0,
            magnitude: 1.0,
            tint: Some(tint),
            priority,
        }
        .instantiate(None)
    }

    #[test]
    fn test_defaults_without_effects() {
        let stack = StatusEffectStack::new();
        assert_eq!(stack.incoming_damage_multiplier(EntityId(1)), 1.0);
        assert_eq!(stack.outgoing_damage_multiplier(EntityId(1)), 1.0);
        assert_eq!(stack.outgoing_flat_reduction(EntityId(1)), 0.0);
        assert!(stack.effects(EntityId(1)).is_empty());
    }

    #[test]
    fn test_outgoing_multiplier_keeps_weaker_value() {
        let mut stack = StatusEffectStack::new();
        let target = EntityId(3);
        stack.apply_effect(target, effect(StatusEffectKind::OutgoingDamageMultiplier, 1000.0, 0.5));
        stack.apply_effect(target, effect(StatusEffectKind::OutgoingDamageMultiplier, 1000.0, 0.8));
        assert_eq!(stack.outgoing_damage_multiplier(target), 0.5);
    }

    #[test]
    fn test_expired_effects_are_dropped() {
        let mut stack = StatusEffectStack::new();
        let target = EntityId(1);
        stack.apply_effect(target, effect(StatusEffectKind::OutgoingFlatReduction, 500.0, 3.0));
        stack.update(300.0);
        assert_eq!(stack.outgoing_flat_reduction(target), 3.0);
        stack.update(300.0);
        assert_eq!(stack.outgoing_flat_reduction(target), 0.0);
        assert_eq!(stack.affected_count(), 0);
    }

    #[test]
    fn test_malformed_effect_rejected() {
        let mut stack = StatusEffectStack::new();
        assert!(!stack.apply_effect(EntityId(1), effect(StatusEffectKind::DamageOverTime, f32::NAN, 2.0)));
        assert!(!stack.apply_effect(EntityId(1), effect(StatusEffectKind::DamageOverTime, -5.0, 2.0)));
        assert!(stack.effects(EntityId(1)).is_empty());
    }

    #[test]
    fn test_dot_ticks_once_per_interval() {
        let mut stack = StatusEffectStack::new();
        let target = EntityId(2);
        stack.apply_effect(target, effect(StatusEffectKind::DamageOverTime, 3000.0, 4.0));

        let mut total = 0.0;
        for _ in 0..200 {
            total += stack
                .tick_damage_over_time(20.0)
                .iter()
                .map(|tick| tick.damage)
                .sum::<f32>();
            stack.update(20.0);
        }
        assert_eq!(total, 12.0);
    }

    #[test]
    fn test_tint_priority_then_kind_order() {
        let mut stack = StatusEffectStack::new();
        let target = EntityId(7);
        stack.apply_effect(target, tinted(StatusEffectKind::OutgoingFlatReduction, 0x0000ff, 1));
        stack.apply_effect(target, tinted(StatusEffectKind::IncomingDamageMultiplier, 0xff0000, 1));
        // Same priority: the earlier kind wins regardless of order applied
        assert_eq!(stack.visible_tint(target), Some(0xff0000));

        stack.apply_effect(target, tinted(StatusEffectKind::DamageOverTime, 0x00ff00, 5));
        assert_eq!(stack.visible_tint(target), Some(0x00ff00));

        let changes = stack.drain_tint_changes();
        assert_eq!(changes.last(), Some(&(target, Some(0x00ff00))));
        assert!(stack.drain_tint_changes().is_empty());
    }

    #[test]
    fn test_remove_target_clears_everything() {
        let mut stack = StatusEffectStack::new();
        let target = EntityId(4);
        stack.apply_effect(target, tinted(StatusEffectKind::DamageOverTime, 0x00ff00, 0));
        stack.remove_target(target);
        assert!(stack.effects(target).is_empty());
        assert_eq!(stack.visible_tint(target), None);
        assert!(stack.drain_tint_changes().is_empty());
    }
}
