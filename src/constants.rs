//! Simulation Constants
//!
//! Centralized location for tuning numbers used throughout the simulation.
//! Per-unit stats live in the unit catalog; these are the rules of the world.

// ============================================================================
// Spatial Index
// ============================================================================

/// Default edge length of a spatial index cell in world units.
/// Roughly two average actor diameters.
pub const SPATIAL_CELL_SIZE: f32 = 64.0;

/// Default ring limit for nearest-neighbour searches.
pub const NEAREST_MAX_LAYERS: u32 = 8;

// ============================================================================
// Movement
// ============================================================================

/// Mass used when a body is created with a non-positive or non-finite mass.
pub const DEFAULT_MASS: f32 = 1.0;

/// Steering force scale: max force = move speed × this × mass.
pub const STEERING_FORCE_FACTOR: f32 = 5.0;

/// Default lifetime of a knockback impulse in seconds.
pub const KNOCKBACK_DURATION: f32 = 0.25;

/// Fraction of the overlap resolved per tick when two actors intersect.
pub const SEPARATION_STRENGTH: f32 = 0.5;

// ============================================================================
// Navigation
// ============================================================================

/// An entity making no progress for this long is treated as stuck (seconds).
pub const STUCK_TIME: f32 = 0.6;

/// Net displacement below this over the stuck window counts as no progress.
pub const STUCK_DISTANCE: f32 = 2.0;

/// Repath cooldown when the target is further than [`REPATH_FAR_DISTANCE`].
pub const REPATH_COOLDOWN_FAR: f32 = 1.0;
/// Repath cooldown when the target is further than [`REPATH_MID_DISTANCE`].
pub const REPATH_COOLDOWN_MID: f32 = 0.6;
/// Repath cooldown for nearby targets.
pub const REPATH_COOLDOWN_NEAR: f32 = 0.35;
/// Repath cooldown once the goal was reached at least once.
pub const REPATH_COOLDOWN_GOAL: f32 = 0.2;

pub const REPATH_FAR_DISTANCE: f32 = 300.0;
pub const REPATH_MID_DISTANCE: f32 = 150.0;

/// Desired speed never ramps below this fraction of max speed while seeking.
pub const MIN_ARRIVAL_SPEED_FRACTION: f32 = 0.25;

/// Obstacles within own radius × this are considered for avoidance.
pub const AVOIDANCE_RADIUS_FACTOR: f32 = 3.0;

/// Below this speed an entity is considered stationary for facing purposes.
pub const FACING_SPEED_THRESHOLD: f32 = 5.0;

/// Turn rate cap (radians per second) applied only while nearly stationary.
pub const STATIONARY_TURN_RATE: f32 = 6.0;

/// Wander destinations are seeded within this distance of the spawn point.
pub const WANDER_RADIUS: f32 = 120.0;

/// A wander destination is abandoned after this many seconds.
pub const WANDER_TIMEOUT: f32 = 4.0;

// ============================================================================
// Combat
// ============================================================================

/// Armor factor applied to damage-over-time ticks.
/// Armor only half-applies to lingering damage.
pub const DOT_ARMOR_FACTOR: f32 = 0.5;

/// Interval between damage-over-time ticks in milliseconds.
pub const DOT_TICK_INTERVAL_MS: f32 = 1000.0;

/// Extra distance a restricted targeting policy searches beyond its reach.
pub const TARGET_SEARCH_PADDING: f32 = 16.0;

/// Projectiles are discarded after this many seconds in flight.
pub const PROJECTILE_LIFETIME: f32 = 3.0;

/// Default collision radius of a projectile.
pub const PROJECTILE_RADIUS: f32 = 4.0;

// ============================================================================
// World
// ============================================================================

/// Longest step a single tick simulates (milliseconds). Longer frames are
/// clamped.
pub const MAX_TICK_MS: f32 = 250.0;

/// Default edge length of a pathfinding grid cell.
pub const PATH_CELL_SIZE: f32 = 32.0;

/// Default map extent when a scenario does not give one.
pub const DEFAULT_MAP_HALF_WIDTH: f32 = 480.0;
pub const DEFAULT_MAP_HALF_HEIGHT: f32 = 320.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repath_cooldowns_shrink_with_distance() {
        assert!(REPATH_COOLDOWN_FAR > REPATH_COOLDOWN_MID);
        assert!(REPATH_COOLDOWN_MID > REPATH_COOLDOWN_NEAR);
        assert!(REPATH_COOLDOWN_NEAR > REPATH_COOLDOWN_GOAL);
        assert!(REPATH_FAR_DISTANCE > REPATH_MID_DISTANCE);
    }

    #[test]
    fn test_fractions_are_valid() {
        assert!(MIN_ARRIVAL_SPEED_FRACTION > 0.0 && MIN_ARRIVAL_SPEED_FRACTION <= 1.0);
        assert!(DOT_ARMOR_FACTOR >= 0.0 && DOT_ARMOR_FACTOR <= 1.0);
        assert!(SEPARATION_STRENGTH > 0.0 && SEPARATION_STRENGTH <= 1.0);
    }
}
