//! Spatial Index
//!
//! Uniform-grid broad phase over positioned, radius-bearing entities.
//! Every entity is registered in each cell its bounding circle overlaps,
//! so circle queries only visit the cells under the query's bounding box
//! instead of scanning every entity.
//!
//! The index never owns the entities themselves: it stores a copy of a small
//! payload (usually an id plus a category) handed in by whichever table
//! spawned the entity.

use bevy::prelude::*;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::constants::SPATIAL_CELL_SIZE;
use crate::entity::EntityId;

/// Packed integer key of a grid cell.
pub type CellKey = u64;

/// Pack quantized cell coordinates into a single key.
pub fn cell_key(cx: i32, cy: i32) -> CellKey {
    ((cx as u32 as u64) << 32) | (cy as u32 as u64)
}

/// One registered entity.
#[derive(Debug, Clone)]
pub struct SpatialEntry<T> {
    pub position: Vec2,
    pub radius: f32,
    pub payload: T,
    cells: SmallVec<[CellKey; 4]>,
    range: CellRange,
}

impl<T> SpatialEntry<T> {
    /// Number of cells this entry is registered in.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

/// Inclusive range of cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRange {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl CellRange {
    fn cell_count(&self) -> u64 {
        let w = (self.max_x as i64 - self.min_x as i64 + 1).max(0) as u64;
        let h = (self.max_y as i64 - self.min_y as i64 + 1).max(0) as u64;
        w.saturating_mul(h)
    }
}

/// Grid-bucketed proximity index.
///
/// Queries take `&mut self` because they reuse an internal visited-set to
/// report entities spanning several cells exactly once without allocating.
#[derive(Debug, Clone)]
pub struct SpatialIndex<T> {
    cell_size: f32,
    cells: HashMap<CellKey, SmallVec<[EntityId; 8]>>,
    /// Ordered so flat scans and `iter` visit ids ascending
    entries: BTreeMap<EntityId, SpatialEntry<T>>,
    visited: HashSet<EntityId>,
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new(SPATIAL_CELL_SIZE)
    }
}

impl<T> SpatialIndex<T> {
    /// Create an index with the given cell edge length.
    /// Non-finite or non-positive sizes fall back to [`SPATIAL_CELL_SIZE`].
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            warn!("Invalid spatial cell size {}, using {}", cell_size, SPATIAL_CELL_SIZE);
            SPATIAL_CELL_SIZE
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            entries: BTreeMap::new(),
            visited: HashSet::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&SpatialEntry<T>> {
        self.entries.get(&id)
    }

    /// Iterate over every registered entity in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &SpatialEntry<T>)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
        self.visited.clear();
    }

    fn quantize(&self, value: f32) -> i32 {
        // Float-to-int casts saturate, so far-away coordinates clamp to the edge cells
        (value / self.cell_size).floor() as i32
    }

    fn cell_of(&self, position: Vec2) -> (i32, i32) {
        (self.quantize(position.x), self.quantize(position.y))
    }

    fn range_for(&self, position: Vec2, radius: f32) -> CellRange {
        CellRange {
            min_x: self.quantize(position.x - radius),
            min_y: self.quantize(position.y - radius),
            max_x: self.quantize(position.x + radius),
            max_y: self.quantize(position.y + radius),
        }
    }

    /// Insert or replace an entity.
    ///
    /// Returns `false` (and leaves the index untouched) when the position is
    /// not finite. Negative or non-finite radii are treated as zero.
    pub fn set(&mut self, id: EntityId, position: Vec2, radius: f32, payload: T) -> bool {
        if !position.is_finite() {
            warn!("Rejected non-finite position {:?} for {}", position, id);
            return false;
        }
        let radius = sanitize_radius(radius);
        let range = self.range_for(position, radius);

        if let Some(entry) = self.entries.get_mut(&id) {
            let unchanged = entry.range == range;
            entry.position = position;
            entry.radius = radius;
            entry.payload = payload;
            if unchanged {
                return true;
            }
            entry.range = range;
            let old_cells = std::mem::take(&mut entry.cells);
            for key in old_cells {
                remove_from_cell(&mut self.cells, key, id);
            }
        } else {
            self.entries.insert(
                id,
                SpatialEntry {
                    position,
                    radius,
                    payload,
                    cells: SmallVec::new(),
                    range,
                },
            );
        }

        let mut registered: SmallVec<[CellKey; 4]> = SmallVec::new();
        for cx in range.min_x..=range.max_x {
            for cy in range.min_y..=range.max_y {
                let key = cell_key(cx, cy);
                let bucket = self.cells.entry(key).or_default();
                if !bucket.contains(&id) {
                    bucket.push(id);
                }
                registered.push(key);
            }
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.cells = registered;
        }
        true
    }

    /// Remove an entity from every cell it was registered in.
    /// Returns the payload, or `None` when the id was unknown.
    pub fn delete(&mut self, id: EntityId) -> Option<T> {
        let entry = self.entries.remove(&id)?;
        for key in entry.cells.iter().copied() {
            remove_from_cell(&mut self.cells, key, id);
        }
        Some(entry.payload)
    }

    /// Visit every entity whose bounding circle intersects the query circle.
    ///
    /// Each entity is reported once even when it spans several visited cells.
    pub fn for_each_in_circle<F>(&mut self, position: Vec2, radius: f32, mut visitor: F)
    where
        F: FnMut(EntityId, &SpatialEntry<T>),
    {
        if !position.is_finite() || self.entries.is_empty() {
            return;
        }
        let radius = sanitize_radius(radius);
        let range = self.range_for(position, radius);

        // A huge query box is cheaper to answer with a flat scan
        if range.cell_count() > self.entries.len() as u64 {
            for (id, entry) in self.entries.iter() {
                if circles_intersect(position, radius, entry.position, entry.radius) {
                    visitor(*id, entry);
                }
            }
            return;
        }

        let Self {
            cells,
            entries,
            visited,
            ..
        } = self;
        visited.clear();
        for cx in range.min_x..=range.max_x {
            for cy in range.min_y..=range.max_y {
                let Some(bucket) = cells.get(&cell_key(cx, cy)) else {
                    continue;
                };
                for id in bucket.iter().copied() {
                    if !visited.insert(id) {
                        continue;
                    }
                    let Some(entry) = entries.get(&id) else {
                        continue;
                    };
                    if circles_intersect(position, radius, entry.position, entry.radius) {
                        visitor(id, entry);
                    }
                }
            }
        }
    }

    /// Ids of every entity in the query circle, collected into `out`.
    pub fn query_ids_into(&mut self, position: Vec2, radius: f32, out: &mut Vec<EntityId>) {
        out.clear();
        self.for_each_in_circle(position, radius, |id, _| out.push(id));
    }

    /// Nearest entity by centre distance, searching outward ring by ring.
    ///
    /// Layer 0 is the cell containing `position`; layer `n` is the square ring
    /// of cells at Chebyshev distance `n`. A candidate found in ring `n` is
    /// not accepted blindly: rings keep being scanned while an unvisited ring
    /// could still hold a closer centre, so the result is the exact nearest
    /// entity among those within `max_layers` rings.
    pub fn nearest_entry(&self, position: Vec2, max_layers: u32) -> Option<(EntityId, &SpatialEntry<T>)> {
        if !position.is_finite() || self.entries.is_empty() {
            return None;
        }
        let (ox, oy) = self.cell_of(position);
        let mut best: Option<(f32, EntityId)> = None;

        for layer in 0..=max_layers {
            if let Some((best_dist_sq, _)) = best {
                // Any centre in this ring is at least (layer - 1) cells away
                let floor = (layer as f32 - 1.0).max(0.0) * self.cell_size;
                if floor * floor >= best_dist_sq {
                    break;
                }
            }
            let layer = layer as i32;
            for_each_ring_cell(ox, oy, layer, |cx, cy| {
                let Some(bucket) = self.cells.get(&cell_key(cx, cy)) else {
                    return;
                };
                for id in bucket.iter().copied() {
                    let Some(entry) = self.entries.get(&id) else {
                        continue;
                    };
                    let dist_sq = entry.position.distance_squared(position);
                    let better = match best {
                        None => true,
                        Some((best_sq, best_id)) => {
                            dist_sq < best_sq || (dist_sq == best_sq && id < best_id)
                        }
                    };
                    if better {
                        best = Some((dist_sq, id));
                    }
                }
            });
        }

        let (_, id) = best?;
        self.entries.get(&id).map(|entry| (id, entry))
    }

    /// Payload of the nearest entity, or `None` when nothing lies within
    /// `max_layers` rings.
    pub fn query_nearest(&self, position: Vec2, max_layers: u32) -> Option<&T> {
        self.nearest_entry(position, max_layers).map(|(_, entry)| &entry.payload)
    }
}

impl<T: Clone> SpatialIndex<T> {
    /// Payloads of every entity whose bounding circle intersects the query circle.
    pub fn query_circle(&mut self, position: Vec2, radius: f32) -> Vec<T> {
        let mut found = Vec::new();
        self.for_each_in_circle(position, radius, |_, entry| found.push(entry.payload.clone()));
        found
    }
}

fn sanitize_radius(radius: f32) -> f32 {
    if radius.is_finite() && radius > 0.0 {
        radius
    } else {
        0.0
    }
}

fn circles_intersect(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    let reach = ra + rb;
    a.distance_squared(b) <= reach * reach
}

fn remove_from_cell(
    cells: &mut HashMap<CellKey, SmallVec<[EntityId; 8]>>,
    key: CellKey,
    id: EntityId,
) {
    if let Some(bucket) = cells.get_mut(&key) {
        if let Some(slot) = bucket.iter().position(|other| *other == id) {
            bucket.swap_remove(slot);
        }
        if bucket.is_empty() {
            cells.remove(&key);
        }
    }
}

/// Call `visit` for every cell on the square ring at Chebyshev distance `layer`.
fn for_each_ring_cell<F: FnMut(i32, i32)>(ox: i32, oy: i32, layer: i32, mut visit: F) {
    if layer == 0 {
        visit(ox, oy);
        return;
    }
    for dx in -layer..=layer {
        visit(ox.saturating_add(dx), oy.saturating_sub(layer));
        visit(ox.saturating_add(dx), oy.saturating_add(layer));
    }
    for dy in (-layer + 1)..layer {
        visit(ox.saturating_sub(layer), oy.saturating_add(dy));
        visit(ox.saturating_add(layer), oy.saturating_add(dy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SpatialIndex<u32> {
        SpatialIndex::new(10.0)
    }

    #[test]
    fn test_cell_key_distinguishes_signs() {
        assert_ne!(cell_key(-1, 0), cell_key(1, 0));
        assert_ne!(cell_key(0, -1), cell_key(-1, 0));
        assert_eq!(cell_key(3, 4), cell_key(3, 4));
    }

    #[test]
    fn test_zero_radius_occupies_one_cell() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::new(5.0, 5.0), 0.0, 1);
        assert_eq!(idx.get(EntityId(1)).map(|e| e.cell_count()), Some(1));
    }

    #[test]
    fn test_large_radius_spans_multiple_cells() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::new(5.0, 5.0), 12.0, 1);
        // x and y each span cells -1..=1
        assert_eq!(idx.get(EntityId(1)).map(|e| e.cell_count()), Some(9));
    }

    #[test]
    fn test_multi_cell_entity_reported_once() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::ZERO, 25.0, 1);
        let found = idx.query_circle(Vec2::ZERO, 30.0);
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn test_multi_cell_entity_reported_once_on_grid_path() {
        let mut idx = index();
        // Enough distant entities that the query walks cells instead of scanning
        for i in 0..200 {
            idx.set(EntityId(100 + i), Vec2::new(1000.0 + i as f32 * 20.0, 1000.0), 1.0, 100 + i);
        }
        idx.set(EntityId(1), Vec2::ZERO, 25.0, 1);
        let found = idx.query_circle(Vec2::ZERO, 5.0);
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn test_replace_moves_registration() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::new(5.0, 5.0), 1.0, 1);
        idx.set(EntityId(1), Vec2::new(505.0, 5.0), 1.0, 2);
        assert!(idx.query_circle(Vec2::new(5.0, 5.0), 2.0).is_empty());
        assert_eq!(idx.query_circle(Vec2::new(505.0, 5.0), 2.0), vec![2]);
        assert_eq!(idx.occupied_cells(), 1);
    }

    #[test]
    fn test_delete_cleans_empty_cells() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::new(5.0, 5.0), 15.0, 1);
        assert!(idx.occupied_cells() > 1);
        assert_eq!(idx.delete(EntityId(1)), Some(1));
        assert_eq!(idx.occupied_cells(), 0);
        assert_eq!(idx.delete(EntityId(1)), None);
    }

    #[test]
    fn test_non_finite_position_rejected() {
        let mut idx = index();
        assert!(!idx.set(EntityId(1), Vec2::new(f32::NAN, 0.0), 1.0, 1));
        assert!(idx.is_empty());
    }

    #[test]
    fn test_negative_radius_sanitized() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::new(5.0, 5.0), -3.0, 1);
        assert_eq!(idx.get(EntityId(1)).map(|e| e.radius), Some(0.0));
    }

    #[test]
    fn test_nearest_prefers_closer_diagonal_neighbour() {
        let mut idx = index();
        // Query sits at the right edge of cell (0,0)
        let origin = Vec2::new(9.9, 5.0);
        // Ring 1, straight right: distance ~0.2
        idx.set(EntityId(1), Vec2::new(10.1, 5.0), 0.0, 1);
        // Origin cell, far corner: distance ~10
        idx.set(EntityId(2), Vec2::new(0.1, 0.1), 0.0, 2);
        assert_eq!(idx.query_nearest(origin, 4), Some(&1));
    }

    #[test]
    fn test_nearest_checks_ring_beyond_first_hit() {
        let mut idx = index();
        let origin = Vec2::new(0.5, 0.5);
        // Ring 1 candidate in the diagonal corner, distance ~26.9
        idx.set(EntityId(1), Vec2::new(19.5, 19.5), 0.0, 1);
        // Ring 2 candidate straight up, distance 20
        idx.set(EntityId(2), Vec2::new(0.5, 20.5), 0.0, 2);
        assert_eq!(idx.query_nearest(origin, 4), Some(&2));
    }

    #[test]
    fn test_nearest_respects_layer_limit() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::new(100.0, 0.0), 0.0, 1);
        assert_eq!(idx.query_nearest(Vec2::ZERO, 2), None);
        assert_eq!(idx.query_nearest(Vec2::ZERO, 10), Some(&1));
    }

    #[test]
    fn test_nearest_on_empty_index() {
        let idx = index();
        assert_eq!(idx.query_nearest(Vec2::ZERO, 8), None);
    }

    #[test]
    fn test_huge_query_falls_back_to_scan() {
        let mut idx = index();
        idx.set(EntityId(1), Vec2::new(-500.0, 0.0), 1.0, 1);
        idx.set(EntityId(2), Vec2::new(500.0, 0.0), 1.0, 2);
        let mut found = idx.query_circle(Vec2::ZERO, 1.0e6);
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }
}
