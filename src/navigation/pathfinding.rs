//! Pathfinding services
//!
//! Navigation asks a [`PathfindingService`] for waypoints whenever direct
//! steering is not enough. The service is pluggable; [`GridPathfinder`] is a
//! bounded A* over a uniform grid and [`DirectPathfinder`] returns the
//! straight line (useful for open maps and tests).
//!
//! An unreachable goal is never an error: the result carries
//! `goal_reached: false` and the best partial path found.

use bevy::prelude::*;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use super::obstacles::{Obstacle, ObstacleProvider, PassabilityTag};
use crate::entity::EntityId;
use crate::spatial::SpatialIndex;

/// A path query for one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathRequest {
    pub start: Vec2,
    pub target: Vec2,
    pub target_radius: f32,
    pub entity_radius: f32,
    pub passability: PassabilityTag,
}

/// Waypoints from (excluding) the start towards the target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathResult {
    pub waypoints: Vec<Vec2>,
    /// `false` when only a partial path towards the goal exists
    pub goal_reached: bool,
}

pub trait PathfindingService {
    fn find_path_to_target(&mut self, request: &PathRequest) -> PathResult;

    /// Snapshot the blocking geometry for `tag`. Called once per tick before
    /// any queries.
    fn cache_all_obstacles(&mut self, obstacles: &dyn ObstacleProvider, tag: PassabilityTag);

    fn cell_size(&self) -> f32;
}

/// Straight-line "pathfinder" that ignores obstacles.
#[derive(Debug, Clone)]
pub struct DirectPathfinder {
    pub cell_size: f32,
}

impl Default for DirectPathfinder {
    fn default() -> Self {
        Self { cell_size: 32.0 }
    }
}

impl PathfindingService for DirectPathfinder {
    fn find_path_to_target(&mut self, request: &PathRequest) -> PathResult {
        PathResult {
            waypoints: vec![request.target],
            goal_reached: true,
        }
    }

    fn cache_all_obstacles(&mut self, _obstacles: &dyn ObstacleProvider, _tag: PassabilityTag) {}

    fn cell_size(&self) -> f32 {
        self.cell_size
    }
}

/// Open-set entry ordered by lowest estimated total cost.
#[derive(Debug, Clone, Copy)]
struct OpenNode {
    cell: (i32, i32),
    estimate: f32,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties broken by cell for determinism
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Bounded A* over a uniform grid covering the map.
#[derive(Debug, Clone)]
pub struct GridPathfinder {
    cell_size: f32,
    bounds: Rect,
    /// Expansion budget per query
    pub max_expanded: usize,
    cached_tag: Option<PassabilityTag>,
    blockers: SpatialIndex<EntityId>,
    largest_blocker: f32,
}

impl GridPathfinder {
    pub fn new(cell_size: f32, bounds: Rect) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            32.0
        };
        Self {
            cell_size,
            bounds,
            max_expanded: 4096,
            cached_tag: None,
            blockers: SpatialIndex::new(cell_size),
            largest_blocker: 0.0,
        }
    }

    pub fn cached_tag(&self) -> Option<PassabilityTag> {
        self.cached_tag
    }

    fn cell_of(&self, position: Vec2) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    fn center_of(&self, cell: (i32, i32)) -> Vec2 {
        Vec2::new(
            (cell.0 as f32 + 0.5) * self.cell_size,
            (cell.1 as f32 + 0.5) * self.cell_size,
        )
    }

    fn in_bounds(&self, cell: (i32, i32)) -> bool {
        self.bounds.contains(self.center_of(cell))
    }

    fn is_blocked(&mut self, cell: (i32, i32), clearance: f32) -> bool {
        let center = self.center_of(cell);
        let mut blocked = false;
        let reach = clearance + self.largest_blocker;
        self.blockers.for_each_in_circle(center, reach, |_, entry| {
            let limit = entry.radius + clearance;
            if entry.position.distance_squared(center) < limit * limit {
                blocked = true;
            }
        });
        blocked
    }

    fn reconstruct(
        &self,
        came_from: &HashMap<(i32, i32), (i32, i32)>,
        start: (i32, i32),
        end: (i32, i32),
    ) -> Vec<Vec2> {
        let mut cells = vec![end];
        let mut current = end;
        while current != start {
            match came_from.get(&current) {
                Some(previous) => {
                    current = *previous;
                    cells.push(current);
                }
                None => break,
            }
        }
        cells.reverse();

        // Keep only the corners of the cell chain
        let mut waypoints = Vec::new();
        for window in 1..cells.len() {
            let here = cells[window];
            let is_last = window + 1 == cells.len();
            if !is_last {
                let prev = cells[window - 1];
                let next = cells[window + 1];
                let d1 = (here.0 - prev.0, here.1 - prev.1);
                let d2 = (next.0 - here.0, next.1 - here.1);
                if d1 == d2 {
                    continue;
                }
            }
            waypoints.push(self.center_of(here));
        }
        waypoints
    }
}

impl PathfindingService for GridPathfinder {
    fn find_path_to_target(&mut self, request: &PathRequest) -> PathResult {
        if !request.start.is_finite() || !request.target.is_finite() {
            return PathResult::default();
        }
        let clearance = request.entity_radius.max(0.0);
        let goal_reach = request.target_radius.max(0.0) + clearance + self.cell_size;
        let start = self.cell_of(request.start);
        let goal = self.cell_of(request.target);
        let cell_size = self.cell_size;
        let center = move |cell: (i32, i32)| {
            Vec2::new((cell.0 as f32 + 0.5) * cell_size, (cell.1 as f32 + 0.5) * cell_size)
        };
        let heuristic = |cell: (i32, i32)| center(cell).distance(request.target);
        let in_goal =
            |cell: (i32, i32)| center(cell).distance_squared(request.target) <= goal_reach * goal_reach;

        if start == goal || in_goal(start) {
            return PathResult {
                waypoints: vec![request.target],
                goal_reached: true,
            };
        }

        let mut open = BinaryHeap::new();
        let mut best_cost: HashMap<(i32, i32), f32> = HashMap::new();
        let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
        let mut blocked_cache: HashMap<(i32, i32), bool> = HashMap::new();

        best_cost.insert(start, 0.0);
        open.push(OpenNode {
            cell: start,
            estimate: heuristic(start),
        });
        let mut closest = (start, heuristic(start));
        let mut expanded = 0;

        while let Some(OpenNode { cell, .. }) = open.pop() {
            if in_goal(cell) {
                let mut waypoints = self.reconstruct(&came_from, start, cell);
                waypoints.push(request.target);
                return PathResult {
                    waypoints,
                    goal_reached: true,
                };
            }
            expanded += 1;
            if expanded > self.max_expanded {
                break;
            }
            let cost_here = best_cost.get(&cell).copied().unwrap_or(f32::INFINITY);

            for (dx, dy) in NEIGHBOURS {
                let next = (cell.0 + dx, cell.1 + dy);
                if !self.in_bounds(next) {
                    continue;
                }
                let mut passable = |c: (i32, i32), this: &mut Self| {
                    if in_goal(c) {
                        return true;
                    }
                    !*blocked_cache
                        .entry(c)
                        .or_insert_with(|| this.is_blocked(c, clearance))
                };
                if !passable(next, &mut *self) {
                    continue;
                }
                // No corner cutting past a blocked orthogonal neighbour
                if dx != 0 && dy != 0
                    && (!passable((cell.0 + dx, cell.1), &mut *self) || !passable((cell.0, cell.1 + dy), &mut *self))
                {
                    continue;
                }

                let step = if dx != 0 && dy != 0 {
                    std::f32::consts::SQRT_2
                } else {
                    1.0
                } * self.cell_size;
                let tentative = cost_here + step;
                if tentative < best_cost.get(&next).copied().unwrap_or(f32::INFINITY) {
                    best_cost.insert(next, tentative);
                    came_from.insert(next, cell);
                    let h = heuristic(next);
                    if h < closest.1 {
                        closest = (next, h);
                    }
                    open.push(OpenNode {
                        cell: next,
                        estimate: tentative + h,
                    });
                }
            }
        }

        // Unreachable or over budget: head for the closest explored cell
        PathResult {
            waypoints: self.reconstruct(&came_from, start, closest.0),
            goal_reached: false,
        }
    }

    fn cache_all_obstacles(&mut self, obstacles: &dyn ObstacleProvider, tag: PassabilityTag) {
        self.blockers.clear();
        self.largest_blocker = 0.0;
        let mut collected: Vec<Obstacle> = Vec::new();
        obstacles.for_each_obstacle(&mut |obstacle| {
            if !obstacle.passable_for(tag) {
                collected.push(obstacle.clone());
            }
        });
        for obstacle in collected {
            self.largest_blocker = self.largest_blocker.max(obstacle.radius);
            self.blockers.set(obstacle.id, obstacle.position, obstacle.radius, obstacle.id);
        }
        self.cached_tag = Some(tag);
    }

    fn cell_size(&self) -> f32 {
        self.cell_size
    }
}
