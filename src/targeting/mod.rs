//! Targeting Resolver
//!
//! Picks an attack target for each entity under a [`TargetingPolicy`].
//!
//! Entities are processed in ascending id order each tick. When a policy asks
//! for exclusive targets, a chosen id is reserved immediately, so entities
//! processed later in the same tick spread out instead of piling onto one
//! victim.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::constants::TARGET_SEARCH_PADDING;
use crate::entity::{EntityId, EntityKind, KindMask};
use crate::spatial::SpatialIndex;
use crate::status::{StatusEffectKind, StatusEffectStack};

/// How an entity chooses what to attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingPolicy {
    /// Kinds that may be targeted
    pub allowed: KindMask,
    /// Only consider candidates within reach + radii + padding
    #[serde(default)]
    pub restricted: bool,
    #[serde(default = "default_padding")]
    pub search_padding: f32,
    /// Skip targets already reserved this tick, and reserve the pick
    #[serde(default)]
    pub exclusive: bool,
    /// Candidates carrying any of these are ignored
    #[serde(default)]
    pub disqualifying: Vec<StatusEffectKind>,
}

fn default_padding() -> f32 {
    TARGET_SEARCH_PADDING
}

impl TargetingPolicy {
    /// Nearest allowed candidate anywhere on the map.
    pub fn nearest(allowed: KindMask) -> Self {
        Self {
            allowed,
            restricted: false,
            search_padding: TARGET_SEARCH_PADDING,
            exclusive: false,
            disqualifying: Vec::new(),
        }
    }

    /// Nearby candidates only.
    pub fn restricted(allowed: KindMask) -> Self {
        Self {
            restricted: true,
            ..Self::nearest(allowed)
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn disqualified_by(mut self, kind: StatusEffectKind) -> Self {
        if !self.disqualifying.contains(&kind) {
            self.disqualifying.push(kind);
        }
        self
    }

    /// Distance (centre to candidate edge) a restricted search covers.
    pub fn search_radius(&self, seeker: &Seeker) -> f32 {
        seeker.reach.max(0.0) + seeker.radius.max(0.0) + self.search_padding.max(0.0)
    }
}

/// The entity looking for a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seeker {
    pub id: EntityId,
    pub position: Vec2,
    pub radius: f32,
    pub reach: f32,
}

/// Read-only view of the world a search runs against. The index payload is
/// each candidate's kind.
pub struct TargetingWorld<'a> {
    pub index: &'a mut SpatialIndex<EntityKind>,
    pub statuses: &'a StatusEffectStack,
}

/// Holds the per-tick reservation set.
#[derive(Debug, Default)]
pub struct TargetingResolver {
    reserved: HashSet<EntityId>,
}

impl TargetingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all reservations. Called once at the start of every tick.
    pub fn begin_tick(&mut self) {
        self.reserved.clear();
    }

    pub fn is_reserved(&self, id: EntityId) -> bool {
        self.reserved.contains(&id)
    }

    pub fn reserved(&self) -> &HashSet<EntityId> {
        &self.reserved
    }

    /// Forget a destroyed entity.
    pub fn remove(&mut self, id: EntityId) {
        self.reserved.remove(&id);
    }

    /// Whether `candidate` may be picked by `seeker` right now, ignoring range.
    fn eligible(
        &self,
        seeker: &Seeker,
        policy: &TargetingPolicy,
        statuses: &StatusEffectStack,
        candidate: EntityId,
        kind: EntityKind,
    ) -> bool {
        candidate != seeker.id
            && policy.allowed.contains(kind)
            && !(policy.exclusive && self.reserved.contains(&candidate))
            && !policy
                .disqualifying
                .iter()
                .any(|status| statuses.has_effect(candidate, *status))
    }

    /// Choose the closest eligible candidate, ties broken by lower id.
    /// Reserves the choice when the policy is exclusive.
    pub fn find_target_for_entity(
        &mut self,
        seeker: &Seeker,
        policy: &TargetingPolicy,
        world: &mut TargetingWorld<'_>,
    ) -> Option<EntityId> {
        if policy.allowed.is_empty() || !seeker.position.is_finite() {
            return None;
        }

        let mut best: Option<(f32, EntityId)> = None;
        let mut consider = |id: EntityId, position: Vec2| {
            let dist_sq = position.distance_squared(seeker.position);
            let better = match best {
                Some((best_sq, best_id)) => dist_sq < best_sq || (dist_sq == best_sq && id < best_id),
                None => true,
            };
            if better {
                best = Some((dist_sq, id));
            }
        };

        if policy.restricted {
            let radius = policy.search_radius(seeker);
            let statuses = world.statuses;
            let this = &*self;
            world.index.for_each_in_circle(seeker.position, radius, |id, entry| {
                if this.eligible(seeker, policy, statuses, id, entry.payload) {
                    consider(id, entry.position);
                }
            });
        } else {
            for (id, entry) in world.index.iter() {
                if self.eligible(seeker, policy, world.statuses, id, entry.payload) {
                    consider(id, entry.position);
                }
            }
        }

        let chosen = best.map(|(_, id)| id);
        if let Some(id) = chosen {
            if policy.exclusive {
                self.reserved.insert(id);
            }
        }
        chosen
    }

    /// Check whether the current target can be kept. A kept target is
    /// reserved again when the policy is exclusive.
    pub fn validate_target(
        &mut self,
        seeker: &Seeker,
        target: EntityId,
        policy: &TargetingPolicy,
        world: &mut TargetingWorld<'_>,
    ) -> bool {
        let Some(entry) = world.index.get(target) else {
            return false;
        };
        if !self.eligible(seeker, policy, world.statuses, target, entry.payload) {
            return false;
        }
        if policy.restricted {
            let limit = policy.search_radius(seeker) + entry.radius;
            if entry.position.distance_squared(seeker.position) > limit * limit {
                return false;
            }
        }
        if policy.exclusive {
            self.reserved.insert(target);
        }
        true
    }

    /// Keep the current target if it is still valid, otherwise search for a
    /// new one.
    pub fn resolve(
        &mut self,
        seeker: &Seeker,
        current: Option<EntityId>,
        policy: &TargetingPolicy,
        world: &mut TargetingWorld<'_>,
    ) -> Option<EntityId> {
        if let Some(current) = current {
            if self.validate_target(seeker, current, policy, world) {
                return Some(current);
            }
        }
        self.find_target_for_entity(seeker, policy, world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeker(id: u32, x: f32) -> Seeker {
        Seeker {
            id: EntityId(id),
            position: Vec2::new(x, 0.0),
            radius: 5.0,
            reach: 10.0,
        }
    }

    fn hostiles() -> KindMask {
        KindMask::of(&[EntityKind::Hostile])
    }

    #[test]
    fn test_nearest_ignores_disallowed_kinds() {
        let mut index = SpatialIndex::new(32.0);
        index.set(EntityId(10), Vec2::new(5.0, 0.0), 5.0, EntityKind::Friendly);
        index.set(EntityId(11), Vec2::new(300.0, 0.0), 5.0, EntityKind::Hostile);
        let statuses = StatusEffectStack::new();
        let mut world = TargetingWorld { index: &mut index, statuses: &statuses };

        let mut resolver = TargetingResolver::new();
        let picked = resolver.find_target_for_entity(&seeker(1, 0.0), &TargetingPolicy::nearest(hostiles()), &mut world);
        assert_eq!(picked, Some(EntityId(11)));
    }

    #[test]
    fn test_restricted_respects_range() {
        let mut index = SpatialIndex::new(32.0);
        index.set(EntityId(11), Vec2::new(300.0, 0.0), 5.0, EntityKind::Hostile);
        let statuses = StatusEffectStack::new();
        let mut world = TargetingWorld { index: &mut index, statuses: &statuses };

        let mut resolver = TargetingResolver::new();
        let picked = resolver.find_target_for_entity(&seeker(1, 0.0), &TargetingPolicy::restricted(hostiles()), &mut world);
        assert_eq!(picked, None);
    }

    #[test]
    fn test_equal_distance_prefers_lower_id() {
        let mut index = SpatialIndex::new(32.0);
        index.set(EntityId(21), Vec2::new(20.0, 0.0), 5.0, EntityKind::Hostile);
        index.set(EntityId(20), Vec2::new(-20.0, 0.0), 5.0, EntityKind::Hostile);
        let statuses = StatusEffectStack::new();
        let mut world = TargetingWorld { index: &mut index, statuses: &statuses };

        let mut resolver = TargetingResolver::new();
        let picked = resolver.find_target_for_entity(&seeker(1, 0.0), &TargetingPolicy::nearest(hostiles()), &mut world);
        assert_eq!(picked, Some(EntityId(20)));
    }

    #[test]
    fn test_disqualified_candidates_skipped() {
        let mut index = SpatialIndex::new(32.0);
        index.set(EntityId(10), Vec2::new(10.0, 0.0), 5.0, EntityKind::Hostile);
        index.set(EntityId(11), Vec2::new(30.0, 0.0), 5.0, EntityKind::Hostile);
        let mut statuses = StatusEffectStack::new();
        statuses.apply_effect(
            EntityId(10),
            crate::status::StatusEffectSpec {
                kind: StatusEffectKind::DamageOverTime,
                duration_ms: 1000.0,
                magnitude: 1.0,
                tint: None,
                priority: 0,
            }
            .instantiate(None),
        );
        let mut world = TargetingWorld { index: &mut index, statuses: &statuses };

        let policy = TargetingPolicy::restricted(hostiles()).disqualified_by(StatusEffectKind::DamageOverTime);
        let mut resolver = TargetingResolver::new();
        assert_eq!(
            resolver.find_target_for_entity(&seeker(1, 0.0), &policy, &mut world),
            Some(EntityId(11))
        );
    }

    #[test]
    fn test_validate_drops_removed_target() {
        let mut index = SpatialIndex::new(32.0);
        index.set(EntityId(10), Vec2::new(10.0, 0.0), 5.0, EntityKind::Hostile);
        index.delete(EntityId(10));
        let statuses = StatusEffectStack::new();
        let mut world = TargetingWorld { index: &mut index, statuses: &statuses };

        let mut resolver = TargetingResolver::new();
        let policy = TargetingPolicy::nearest(hostiles());
        assert!(!resolver.validate_target(&seeker(1, 0.0), EntityId(10), &policy, &mut world));
    }
}
