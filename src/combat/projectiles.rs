//! Projectiles
//!
//! Straight-line attack payloads. Each projectile carries the damage and
//! knockback rolled when it was fired and hands them back as a
//! [`ProjectileHit`] on first contact with something it may hit.

use bevy::prelude::*;
use smallvec::SmallVec;
use std::collections::BTreeMap;

use super::HitPayload;
use crate::entity::{EntityId, EntityKind, KindMask};
use crate::spatial::SpatialIndex;

/// A projectile in flight.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    /// Seconds left before the projectile fizzles
    pub remaining: f32,
    /// Kinds this projectile collides with
    pub hits: KindMask,
    pub payload: HitPayload,
    pub visual: Option<String>,
}

/// A projectile reaching a target this tick.
#[derive(Debug, Clone)]
pub struct ProjectileHit {
    pub projectile: EntityId,
    pub target: EntityId,
    pub position: Vec2,
    /// Travel direction at impact
    pub direction: Vec2,
    pub payload: HitPayload,
    pub visual: Option<String>,
}

/// Evenly fan `count` directions across `spread` radians around `aim`.
pub fn fan_directions(aim: Vec2, count: u32, spread: f32) -> SmallVec<[Vec2; 8]> {
    let aim = aim.try_normalize().unwrap_or(Vec2::X);
    let count = count.max(1);
    let spread = if spread.is_finite() { spread.max(0.0) } else { 0.0 };
    if count == 1 || spread == 0.0 {
        return std::iter::repeat(aim).take(count as usize).collect();
    }

    let step = spread / (count - 1) as f32;
    (0..count)
        .map(|i| Vec2::from_angle(-spread * 0.5 + step * i as f32).rotate(aim))
        .collect()
}

fn distance_to_segment_sq(point: Vec2, start: Vec2, end: Vec2) -> (f32, f32) {
    let segment = end - start;
    let length_sq = segment.length_squared();
    let t = if length_sq > 0.0 {
        ((point - start).dot(segment) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    ((start + segment * t).distance_squared(point), t)
}

/// Every projectile currently in flight, in id order.
#[derive(Debug, Default)]
pub struct ProjectileSet {
    projectiles: BTreeMap<EntityId, Projectile>,
    spawned: Vec<EntityId>,
    removed: Vec<EntityId>,
}

impl ProjectileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    pub fn get(&self, id: EntityId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    pub fn spawn(&mut self, projectile: Projectile) {
        if !projectile.position.is_finite() || !projectile.velocity.is_finite() {
            warn!("Dropping projectile {} with non-finite motion", projectile.id);
            return;
        }
        self.spawned.push(projectile.id);
        self.projectiles.insert(projectile.id, projectile);
    }

    /// Projectiles spawned and removed since the last drain.
    pub fn drain_changes(&mut self) -> (Vec<EntityId>, Vec<EntityId>) {
        (std::mem::take(&mut self.spawned), std::mem::take(&mut self.removed))
    }

    /// Move every projectile by `dt` seconds and collect hits.
    ///
    /// Collision is swept along the travelled segment, so fast projectiles
    /// do not tunnel through small targets. A projectile hits at most one
    /// entity and is removed on hit, on timeout, or on leaving `bounds`.
    pub fn advance(&mut self, dt: f32, index: &mut SpatialIndex<EntityKind>, bounds: Rect) -> Vec<ProjectileHit> {
        let mut hits = Vec::new();
        if !dt.is_finite() || dt <= 0.0 {
            return hits;
        }

        let mut finished: Vec<EntityId> = Vec::new();
        for projectile in self.projectiles.values_mut() {
            let start = projectile.position;
            let end = start + projectile.velocity * dt;
            projectile.position = end;
            projectile.remaining -= dt;

            let half = (end - start) * 0.5;
            let reach = half.length() + projectile.radius;
            let mut best: Option<(f32, EntityId)> = None;
            index.for_each_in_circle(start + half, reach, |id, entry| {
                if Some(id) == projectile.payload.source || !projectile.hits.contains(entry.payload) {
                    return;
                }
                let (dist_sq, t) = distance_to_segment_sq(entry.position, start, end);
                let limit = projectile.radius + entry.radius;
                if dist_sq > limit * limit {
                    return;
                }
                let better = match best {
                    Some((best_t, best_id)) => t < best_t || (t == best_t && id < best_id),
                    None => true,
                };
                if better {
                    best = Some((t, id));
                }
            });

            if let Some((t, target)) = best {
                hits.push(ProjectileHit {
                    projectile: projectile.id,
                    target,
                    position: start.lerp(end, t),
                    direction: projectile.velocity.normalize_or_zero(),
                    payload: projectile.payload.clone(),
                    visual: projectile.visual.clone(),
                });
                finished.push(projectile.id);
            } else if projectile.remaining <= 0.0 || !bounds.contains(end) {
                finished.push(projectile.id);
            }
        }

        for id in finished {
            self.projectiles.remove(&id);
            self.removed.push(id);
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(source: u32) -> HitPayload {
        HitPayload {
            source: Some(EntityId(source)),
            damage: 10.0,
            armor_penetration: 0.0,
            knockback_speed: None,
            knockback_distance: 0.0,
            status: None,
            damage_type: super::super::events::DamageType::Projectile,
        }
    }

    fn projectile(id: u32, velocity: Vec2) -> Projectile {
        Projectile {
            id: EntityId(id),
            position: Vec2::ZERO,
            velocity,
            radius: 2.0,
            remaining: 1.0,
            hits: KindMask::of(&[EntityKind::Hostile]),
            payload: payload(1),
            visual: None,
        }
    }

    fn bounds() -> Rect {
        Rect::new(-500.0, -500.0, 500.0, 500.0)
    }

    #[test]
    fn test_fan_is_symmetric() {
        let dirs = fan_directions(Vec2::X, 3, std::f32::consts::FRAC_PI_2);
        assert_eq!(dirs.len(), 3);
        assert!((dirs[1] - Vec2::X).length() < 1e-5);
        assert!((dirs[0].y + dirs[2].y).abs() < 1e-5);
        assert!(dirs[0].y < 0.0);
    }

    #[test]
    fn test_fan_degenerate_aim_uses_x() {
        let dirs = fan_directions(Vec2::ZERO, 1, 0.0);
        assert_eq!(dirs.as_slice(), &[Vec2::X]);
    }

    #[test]
    fn test_fast_projectile_does_not_tunnel() {
        let mut index = SpatialIndex::new(32.0);
        index.set(EntityId(5), Vec2::new(50.0, 0.0), 3.0, EntityKind::Hostile);
        let mut set = ProjectileSet::new();
        set.spawn(projectile(100, Vec2::new(6000.0, 0.0)));

        let hits = set.advance(1.0 / 60.0, &mut index, bounds());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, EntityId(5));
        assert!(set.is_empty());
    }

    #[test]
    fn test_ignores_source_and_other_kinds() {
        let mut index = SpatialIndex::new(32.0);
        index.set(EntityId(1), Vec2::new(5.0, 0.0), 5.0, EntityKind::Hostile);
        index.set(EntityId(2), Vec2::new(10.0, 0.0), 5.0, EntityKind::Friendly);
        let mut set = ProjectileSet::new();
        set.spawn(projectile(100, Vec2::new(600.0, 0.0)));

        let hits = set.advance(0.05, &mut index, bounds());
        assert!(hits.is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_expires_after_lifetime() {
        let mut index = SpatialIndex::new(32.0);
        let mut set = ProjectileSet::new();
        set.spawn(projectile(100, Vec2::new(10.0, 0.0)));
        for _ in 0..11 {
            set.advance(0.1, &mut index, bounds());
        }
        assert!(set.is_empty());
        let (spawned, removed) = set.drain_changes();
        assert_eq!(spawned, vec![EntityId(100)]);
        assert_eq!(removed, vec![EntityId(100)]);
    }
}
