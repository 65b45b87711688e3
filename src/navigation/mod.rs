//! Navigation Controller
//!
//! Per-entity steering: seek, brake, obstacle avoidance, waypoint following
//! and facing. Each navigating entity moves through a small state machine:
//!
//! - `Idle` / `Wandering`: no target; wander around the spawn point or brake
//! - `Seeking`: target set but out of attack range; follow waypoints or seek
//! - `InRange`: close enough to attack; brake and face the target
//!
//! The controller only produces a bounded steering force and a facing angle.
//! Integration is left to the [`MovementIntegrator`](crate::physics::MovementIntegrator).

pub mod obstacles;
pub mod pathfinding;

use bevy::prelude::*;
use std::collections::{HashMap, VecDeque};

use crate::constants::*;
use crate::entity::EntityId;
use crate::rng::GameRng;
use obstacles::{ObstacleProvider, PassabilityTag};
use pathfinding::{PathRequest, PathfindingService};

pub use obstacles::{Obstacle, ObstacleField};
pub use pathfinding::{DirectPathfinder, GridPathfinder, PathResult};

/// Where a navigating entity is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavPhase {
    #[default]
    Idle,
    Wandering,
    Seeking,
    InRange,
}

/// What an entity is currently heading for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavTarget {
    pub id: EntityId,
    pub position: Vec2,
    pub radius: f32,
}

/// Per-tick description of the entity being steered.
#[derive(Debug, Clone, Copy)]
pub struct NavAgent {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub mass: f32,
    pub max_speed: f32,
    /// Attack reach beyond both bodies' radii
    pub reach: f32,
    /// Current facing in radians
    pub facing: f32,
    pub spawn: Vec2,
    pub passability: PassabilityTag,
    pub wanders: bool,
    pub uses_pathfinding: bool,
}

/// Result of one steering step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringOutput {
    pub force: Vec2,
    pub desired_velocity: Vec2,
    pub facing: f32,
    pub phase: NavPhase,
    /// Within base attack range of the current target
    pub in_attack_range: bool,
}

/// Seeking state, created on first target acquisition.
#[derive(Debug, Clone)]
pub struct NavigationState {
    pub target: NavTarget,
    pub waypoints: VecDeque<Vec2>,
    /// Set while the entity sits inside its attack range
    pub goal_reached: bool,
    /// Whether the last path returned by the pathfinder reached the goal
    pub path_complete: bool,
    pub repath_timer: f32,
    /// Target position when the current path was requested
    pub path_target_position: Option<Vec2>,
    pub last_position: Vec2,
    pub stuck_timer: f32,
    /// Number of path requests issued so far
    pub path_requests: u32,
}

impl NavigationState {
    fn new(target: NavTarget, position: Vec2) -> Self {
        Self {
            target,
            waypoints: VecDeque::new(),
            goal_reached: false,
            path_complete: false,
            repath_timer: 0.0,
            path_target_position: None,
            last_position: position,
            stuck_timer: 0.0,
            path_requests: 0,
        }
    }

    fn reset_path(&mut self) {
        self.waypoints.clear();
        self.path_target_position = None;
        self.path_complete = false;
        self.repath_timer = 0.0;
    }
}

#[derive(Debug, Clone, Copy)]
struct WanderState {
    destination: Vec2,
    timer: f32,
}

/// Shared dependencies of a steering step.
pub struct NavContext<'a> {
    pub obstacles: &'a mut dyn ObstacleProvider,
    pub pathfinder: &'a mut dyn PathfindingService,
    pub rng: &'a mut GameRng,
    pub bounds: Rect,
}

/// Base attack range: reach plus both radii.
pub fn attack_range(reach: f32, own_radius: f32, target_radius: f32) -> f32 {
    reach.max(0.0) + own_radius.max(0.0) + target_radius.max(0.0)
}

/// Largest steering force an entity can apply.
pub fn max_steering_force(move_speed: f32, mass: f32) -> f32 {
    move_speed.max(0.0) * STEERING_FORCE_FACTOR * mass.max(0.0)
}

/// Extra distance inside which waypoint pathing stops, so fast-turning
/// entities switch to direct seeking before they overshoot.
/// The turn time estimate is `max_speed / max_force`.
pub fn maneuver_margin(max_speed: f32, max_force: f32) -> f32 {
    if max_force <= 0.0 {
        return 0.0;
    }
    let turn_time = max_speed / max_force;
    max_speed * turn_time * 0.5
}

/// How long to wait before asking for a fresh path.
pub fn repath_cooldown(distance: f32, goal_reached: bool) -> f32 {
    if goal_reached {
        REPATH_COOLDOWN_GOAL
    } else if distance > REPATH_FAR_DISTANCE {
        REPATH_COOLDOWN_FAR
    } else if distance > REPATH_MID_DISTANCE {
        REPATH_COOLDOWN_MID
    } else {
        REPATH_COOLDOWN_NEAR
    }
}

/// Rotate `current` towards `desired` by at most `max_step` radians.
pub fn rotate_towards(current: f32, desired: f32, max_step: f32) -> f32 {
    let tau = std::f32::consts::TAU;
    let mut delta = (desired - current).rem_euclid(tau);
    if delta > std::f32::consts::PI {
        delta -= tau;
    }
    if delta.abs() <= max_step {
        desired
    } else {
        current + delta.signum() * max_step
    }
}

fn heading_angle(direction: Vec2) -> Option<f32> {
    let dir = direction.try_normalize()?;
    Some(dir.y.atan2(dir.x))
}

/// Owns the navigation state of every steering entity.
#[derive(Debug, Default)]
pub struct NavigationController {
    states: HashMap<EntityId, NavigationState>,
    wander: HashMap<EntityId, WanderState>,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: EntityId) -> Option<&NavigationState> {
        self.states.get(&id)
    }

    /// Current wander destination, if the entity is wandering.
    pub fn wander_destination(&self, id: EntityId) -> Option<Vec2> {
        self.wander.get(&id).map(|w| w.destination)
    }

    /// Number of entities currently holding seeking state.
    pub fn seeking_count(&self) -> usize {
        self.states.len()
    }

    /// Forget everything about an entity.
    pub fn remove(&mut self, id: EntityId) {
        self.states.remove(&id);
        self.wander.remove(&id);
    }

    /// Compute the steering force and facing for one entity this tick.
    pub fn steer(
        &mut self,
        agent: &NavAgent,
        target: Option<NavTarget>,
        dt: f32,
        ctx: &mut NavContext<'_>,
    ) -> SteeringOutput {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let max_force = max_steering_force(agent.max_speed, agent.mass);

        let (desired, phase, in_range) = match target {
            None => {
                self.states.remove(&agent.id);
                self.wander_velocity(agent, dt, ctx)
            }
            Some(target) => {
                self.wander.remove(&agent.id);
                self.seek_velocity(agent, target, dt, max_force, ctx)
            }
        };

        let force = (desired - agent.velocity).clamp_length_max(max_force);
        let facing = self.facing(agent, target, in_range, dt);

        SteeringOutput {
            force,
            desired_velocity: desired,
            facing,
            phase,
            in_attack_range: in_range,
        }
    }

    fn wander_velocity(&mut self, agent: &NavAgent, dt: f32, ctx: &mut NavContext<'_>) -> (Vec2, NavPhase, bool) {
        if !agent.wanders || agent.max_speed <= 0.0 {
            self.wander.remove(&agent.id);
            return (Vec2::ZERO, NavPhase::Idle, false);
        }

        let arrive_distance = agent.radius.max(4.0);
        let needs_new = match self.wander.get_mut(&agent.id) {
            Some(state) => {
                state.timer += dt;
                state.timer > WANDER_TIMEOUT
                    || state.destination.distance(agent.position) <= arrive_distance
            }
            None => true,
        };
        if needs_new {
            let angle = ctx.rng.random_angle();
            let distance = ctx.rng.random_range(0.0, WANDER_RADIUS);
            let point = agent.spawn + Vec2::from_angle(angle) * distance;
            let destination = point.clamp(ctx.bounds.min, ctx.bounds.max);
            self.wander.insert(agent.id, WanderState { destination, timer: 0.0 });
        }

        let Some(state) = self.wander.get(&agent.id) else {
            return (Vec2::ZERO, NavPhase::Idle, false);
        };
        let to_destination = state.destination - agent.position;
        let desired = to_destination.normalize_or_zero() * agent.max_speed * 0.5;
        let push = avoidance_push(agent, desired, None, ctx.obstacles);
        (
            (desired + push).clamp_length_max(agent.max_speed),
            NavPhase::Wandering,
            false,
        )
    }

    fn seek_velocity(
        &mut self,
        agent: &NavAgent,
        target: NavTarget,
        dt: f32,
        max_force: f32,
        ctx: &mut NavContext<'_>,
    ) -> (Vec2, NavPhase, bool) {
        let state = self
            .states
            .entry(agent.id)
            .or_insert_with(|| NavigationState::new(target, agent.position));
        if state.target.id != target.id {
            state.reset_path();
            state.goal_reached = false;
        }
        state.target = target;

        let base_range = attack_range(agent.reach, agent.radius, target.radius);
        let pathing_range = base_range + maneuver_margin(agent.max_speed, max_force);
        let distance = agent.position.distance(target.position);

        // Stuck detection: no net displacement over the window
        state.stuck_timer += dt;
        if agent.position.distance(state.last_position) > STUCK_DISTANCE {
            state.last_position = agent.position;
            state.stuck_timer = 0.0;
        }

        if distance <= base_range {
            state.goal_reached = true;
            state.waypoints.clear();
            state.stuck_timer = 0.0;
            state.last_position = agent.position;
            return (Vec2::ZERO, NavPhase::InRange, true);
        }

        state.repath_timer -= dt;
        if distance <= pathing_range || !agent.uses_pathfinding {
            state.waypoints.clear();
        } else {
            let half_cell = ctx.pathfinder.cell_size() * 0.5;
            let never_requested = state.path_target_position.is_none();
            let target_moved = state
                .path_target_position
                .map(|p| p.distance(target.position) > half_cell)
                .unwrap_or(false);
            let cooldown_elapsed = state.repath_timer <= 0.0;
            let stuck = state.stuck_timer > STUCK_TIME;

            if never_requested || target_moved || cooldown_elapsed || stuck {
                let result = ctx.pathfinder.find_path_to_target(&PathRequest {
                    start: agent.position,
                    target: target.position,
                    target_radius: target.radius,
                    entity_radius: agent.radius,
                    passability: agent.passability,
                });
                if stuck {
                    debug!("{} stuck for {:.2}s, repathing", agent.id, state.stuck_timer);
                }
                state.waypoints = result.waypoints.into_iter().collect();
                state.path_complete = result.goal_reached;
                state.path_target_position = Some(target.position);
                state.repath_timer = repath_cooldown(distance, state.goal_reached);
                state.stuck_timer = 0.0;
                state.last_position = agent.position;
                state.path_requests += 1;
            }
            state.goal_reached = false;

            let arrive = agent.radius.max(half_cell);
            while let Some(next) = state.waypoints.front() {
                if next.distance(agent.position) <= arrive {
                    state.waypoints.pop_front();
                } else {
                    break;
                }
            }
        }

        // Partial or exhausted paths fall back to seeking the target directly
        let steer_point = state.waypoints.front().copied().unwrap_or(target.position);
        let remaining = (distance - base_range).max(0.0);
        let slow_radius = (agent.max_speed * 0.5).max(base_range).max(1.0);
        let ramp = (remaining / slow_radius).clamp(MIN_ARRIVAL_SPEED_FRACTION, 1.0);
        let desired = (steer_point - agent.position).normalize_or_zero() * agent.max_speed * ramp;

        let push = avoidance_push(agent, desired, Some(target.id), ctx.obstacles);
        (
            (desired + push).clamp_length_max(agent.max_speed),
            NavPhase::Seeking,
            false,
        )
    }

    fn facing(&self, agent: &NavAgent, target: Option<NavTarget>, in_range: bool, dt: f32) -> f32 {
        let speed = agent.velocity.length();
        let to_target = target.and_then(|t| heading_angle(t.position - agent.position));

        let desired = if in_range {
            to_target
        } else if speed > FACING_SPEED_THRESHOLD {
            heading_angle(agent.velocity)
        } else {
            to_target
        }
        .unwrap_or(agent.facing);

        if speed < FACING_SPEED_THRESHOLD {
            rotate_towards(agent.facing, desired, STATIONARY_TURN_RATE * dt)
        } else {
            desired
        }
    }
}

/// Push away from blocking obstacles ahead of the desired heading, scaled by
/// how deep the obstacle sits inside the avoidance radius.
fn avoidance_push(
    agent: &NavAgent,
    desired: Vec2,
    ignore: Option<EntityId>,
    obstacles: &mut dyn ObstacleProvider,
) -> Vec2 {
    let Some(heading) = desired.try_normalize() else {
        return Vec2::ZERO;
    };
    let look = agent.radius.max(1.0) * AVOIDANCE_RADIUS_FACTOR;
    let mut push = Vec2::ZERO;

    obstacles.for_each_obstacle_near(agent.position, look, &mut |obstacle| {
        if Some(obstacle.id) == ignore || obstacle.passable_for(agent.passability) {
            return;
        }
        let offset = obstacle.position - agent.position;
        if offset.dot(heading) <= 0.0 {
            return;
        }
        let penetration = look + obstacle.radius - offset.length();
        if penetration <= 0.0 {
            return;
        }
        let away = (-offset).try_normalize().unwrap_or(heading.perp());
        // Slide sideways rather than stalling head-on
        let lateral = away - heading * away.dot(heading);
        let side = lateral.try_normalize().unwrap_or(heading.perp());
        let direction = (away + side).normalize_or_zero();
        push += direction * (penetration / look).min(1.0) * agent.max_speed;
    });

    push
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_towards_wraps_short_way() {
        let pi = std::f32::consts::PI;
        let result = rotate_towards(pi - 0.1, -pi + 0.1, 0.05);
        // Moving the short way crosses +pi
        assert!(result > pi - 0.1);
    }

    #[test]
    fn test_rotate_towards_snaps_within_step() {
        assert_eq!(rotate_towards(0.0, 0.2, 0.5), 0.2);
    }

    #[test]
    fn test_repath_cooldown_bands() {
        assert_eq!(repath_cooldown(400.0, false), REPATH_COOLDOWN_FAR);
        assert_eq!(repath_cooldown(200.0, false), REPATH_COOLDOWN_MID);
        assert_eq!(repath_cooldown(50.0, false), REPATH_COOLDOWN_NEAR);
        assert_eq!(repath_cooldown(400.0, true), REPATH_COOLDOWN_GOAL);
    }

    #[test]
    fn test_maneuver_margin_scales_with_speed() {
        let slow = maneuver_margin(20.0, max_steering_force(20.0, 1.0));
        let fast = maneuver_margin(80.0, max_steering_force(80.0, 1.0));
        assert!(fast > slow);
        assert_eq!(maneuver_margin(50.0, 0.0), 0.0);
    }

    #[test]
    fn test_maneuver_margin_turn_time_is_speed_over_force() {
        // turn time 100 / 50 = 2s, margin 100 * 2 / 2
        assert!((maneuver_margin(100.0, 50.0) - 100.0).abs() < 1e-4);
        // heavier bodies get more force, so a shorter margin
        let light = maneuver_margin(40.0, max_steering_force(40.0, 1.0));
        let heavy = maneuver_margin(40.0, max_steering_force(40.0, 4.0));
        assert!(heavy < light);
    }

    #[test]
    fn test_attack_range_sums_radii() {
        assert_eq!(attack_range(10.0, 5.0, 3.0), 18.0);
        assert_eq!(attack_range(-1.0, 5.0, 3.0), 8.0);
    }
}
