//! Obstacle geometry
//!
//! Static blocking circles consulted by avoidance steering and by the
//! pathfinder. Whether an obstacle blocks is decided per passability tag,
//! so flying or phasing units can share a map with ground units.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entity::EntityId;
use crate::spatial::SpatialIndex;

/// Movement category asking "does this obstacle block me?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PassabilityTag {
    #[default]
    Ground,
    Flying,
    Phasing,
}

impl PassabilityTag {
    const fn bit(self) -> u8 {
        match self {
            PassabilityTag::Ground => 1 << 0,
            PassabilityTag::Flying => 1 << 1,
            PassabilityTag::Phasing => 1 << 2,
        }
    }
}

/// A static circular blocker.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub id: EntityId,
    pub position: Vec2,
    pub radius: f32,
    /// Tags that may pass through this obstacle
    passable: u8,
}

impl Obstacle {
    /// An obstacle that blocks everything except `Flying` and `Phasing`.
    pub fn solid(id: EntityId, position: Vec2, radius: f32) -> Self {
        Self {
            id,
            position,
            radius: radius.max(0.0),
            passable: PassabilityTag::Flying.bit() | PassabilityTag::Phasing.bit(),
        }
    }

    /// Mark an additional tag as able to pass.
    pub fn passable_by(mut self, tag: PassabilityTag) -> Self {
        self.passable |= tag.bit();
        self
    }

    pub fn passable_for(&self, tag: PassabilityTag) -> bool {
        self.passable & tag.bit() != 0
    }
}

/// Source of static blocking geometry.
pub trait ObstacleProvider {
    /// Visit every obstacle whose circle intersects the query circle.
    fn for_each_obstacle_near(&mut self, position: Vec2, radius: f32, visitor: &mut dyn FnMut(&Obstacle));

    /// Visit every obstacle.
    fn for_each_obstacle(&self, visitor: &mut dyn FnMut(&Obstacle));
}

/// Obstacle table backed by its own spatial index.
#[derive(Debug, Clone, Default)]
pub struct ObstacleField {
    obstacles: BTreeMap<EntityId, Obstacle>,
    index: SpatialIndex<EntityId>,
}

impl ObstacleField {
    pub fn new(cell_size: f32) -> Self {
        Self {
            obstacles: BTreeMap::new(),
            index: SpatialIndex::new(cell_size),
        }
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn get(&self, id: EntityId) -> Option<&Obstacle> {
        self.obstacles.get(&id)
    }

    pub fn insert(&mut self, obstacle: Obstacle) -> bool {
        if !self.index.set(obstacle.id, obstacle.position, obstacle.radius, obstacle.id) {
            return false;
        }
        self.obstacles.insert(obstacle.id, obstacle);
        true
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Obstacle> {
        self.index.delete(id);
        self.obstacles.remove(&id)
    }
}

impl ObstacleProvider for ObstacleField {
    fn for_each_obstacle_near(&mut self, position: Vec2, radius: f32, visitor: &mut dyn FnMut(&Obstacle)) {
        let Self { obstacles, index } = self;
        index.for_each_in_circle(position, radius, |id, _| {
            if let Some(obstacle) = obstacles.get(&id) {
                visitor(obstacle);
            }
        });
    }

    fn for_each_obstacle(&self, visitor: &mut dyn FnMut(&Obstacle)) {
        for obstacle in self.obstacles.values() {
            visitor(obstacle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_blocks_ground_only() {
        let obstacle = Obstacle::solid(EntityId(1), Vec2::ZERO, 5.0);
        assert!(!obstacle.passable_for(PassabilityTag::Ground));
        assert!(obstacle.passable_for(PassabilityTag::Flying));
        assert!(obstacle.passable_for(PassabilityTag::Phasing));
    }

    #[test]
    fn test_field_near_query() {
        let mut field = ObstacleField::new(32.0);
        field.insert(Obstacle::solid(EntityId(1), Vec2::new(10.0, 0.0), 5.0));
        field.insert(Obstacle::solid(EntityId(2), Vec2::new(500.0, 0.0), 5.0));

        let mut seen = Vec::new();
        field.for_each_obstacle_near(Vec2::ZERO, 10.0, &mut |o| seen.push(o.id));
        assert_eq!(seen, vec![EntityId(1)]);

        field.remove(EntityId(1));
        seen.clear();
        field.for_each_obstacle_near(Vec2::ZERO, 10.0, &mut |o| seen.push(o.id));
        assert!(seen.is_empty());
    }
}
