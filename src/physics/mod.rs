//! Movement Integrator
//!
//! Per-entity point-mass bodies: one steering force per tick, a velocity,
//! and any number of decaying knockback impulses. No rotation, no contacts.
//!
//! Impulse decay is tracked as a fraction of each impulse's lifetime, so the
//! velocity removed over an impulse's life equals the impulse itself no
//! matter how the elapsed time is sliced into steps. Decay ignores the rest
//! of the velocity; only the share the speed clamp already cut is skipped.

use bevy::prelude::*;
use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::constants::DEFAULT_MASS;

/// Handle of a body owned by the [`MovementIntegrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub u32);

/// A velocity kick that fades linearly to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impulse {
    /// Velocity added when the impulse was applied
    pub velocity: Vec2,
    /// Seconds of the impulse's life already consumed
    pub elapsed: f32,
    /// Total lifetime in seconds
    pub duration: f32,
    /// Part of the impulse still present in the body's velocity
    live: Vec2,
}

impl Impulse {
    fn remaining(&self) -> f32 {
        (self.duration - self.elapsed).max(0.0)
    }

    /// Part of the impulse still present in the body's velocity. Shrinks
    /// with the decay and whenever the speed clamp cuts the velocity.
    pub fn residual(&self) -> Vec2 {
        self.live
    }
}

/// Point-mass physics body.
#[derive(Debug, Clone)]
pub struct MovementBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    pub max_speed: f32,
    force: Vec2,
    impulses: SmallVec<[Impulse; 4]>,
}

impl MovementBody {
    /// Force accumulated for the next step.
    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn impulses(&self) -> &[Impulse] {
        &self.impulses
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    fn integrate(&mut self, dt: f32) {
        let acceleration = self.force / self.mass;
        self.velocity += acceleration * dt;

        for impulse in self.impulses.iter_mut() {
            let slice = dt.min(impulse.remaining());
            impulse.elapsed += slice;
            // The last slice takes whatever is left, so the total removed
            // never drifts from the impulse
            let decay = if impulse.remaining() <= 0.0 {
                impulse.live
            } else {
                (impulse.velocity * (slice / impulse.duration)).clamp_length_max(impulse.live.length())
            };
            self.velocity -= decay;
            impulse.live -= decay;
        }
        self.impulses.retain(|impulse| impulse.remaining() > 0.0);

        let speed = self.velocity.length();
        if speed > self.max_speed {
            // The clamp scales every contribution alike; what it cut off
            // is no longer there to decay
            let kept = if speed > 0.0 { self.max_speed / speed } else { 0.0 };
            self.velocity *= kept;
            for impulse in self.impulses.iter_mut() {
                impulse.live *= kept;
            }
        }
        self.position += self.velocity * dt;
        self.force = Vec2::ZERO;
    }
}

/// Owns every movement body in the simulation.
#[derive(Debug, Default, Clone)]
pub struct MovementIntegrator {
    bodies: BTreeMap<BodyId, MovementBody>,
    next_id: u32,
}

impl MovementIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Create a body at rest. Returns its handle.
    ///
    /// Invalid mass falls back to [`DEFAULT_MASS`]; invalid max speed to 0.
    pub fn create_body(&mut self, position: Vec2, mass: f32, max_speed: f32) -> BodyId {
        let mass = if mass.is_finite() && mass > 0.0 {
            mass
        } else {
            warn!("Invalid body mass {}, using {}", mass, DEFAULT_MASS);
            DEFAULT_MASS
        };
        let max_speed = if max_speed.is_finite() && max_speed > 0.0 {
            max_speed
        } else {
            0.0
        };
        let position = if position.is_finite() { position } else { Vec2::ZERO };

        let id = BodyId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            id,
            MovementBody {
                position,
                velocity: Vec2::ZERO,
                mass,
                max_speed,
                force: Vec2::ZERO,
                impulses: SmallVec::new(),
            },
        );
        id
    }

    pub fn remove_body(&mut self, id: BodyId) -> Option<MovementBody> {
        self.bodies.remove(&id)
    }

    pub fn body(&self, id: BodyId) -> Option<&MovementBody> {
        self.bodies.get(&id)
    }

    pub fn position(&self, id: BodyId) -> Option<Vec2> {
        self.bodies.get(&id).map(|body| body.position)
    }

    pub fn velocity(&self, id: BodyId) -> Option<Vec2> {
        self.bodies.get(&id).map(|body| body.velocity)
    }

    /// Teleport a body. Non-finite positions are ignored.
    pub fn set_position(&mut self, id: BodyId, position: Vec2) -> bool {
        if !position.is_finite() {
            return false;
        }
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.position = position;
                true
            }
            None => false,
        }
    }

    /// Change a body's speed cap (e.g. when a slow wears off).
    pub fn set_max_speed(&mut self, id: BodyId, max_speed: f32) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) if max_speed.is_finite() => {
                body.max_speed = max_speed.max(0.0);
                true
            }
            _ => false,
        }
    }

    /// Set the steering force for the next step. Non-finite forces are ignored.
    pub fn set_force(&mut self, id: BodyId, force: Vec2) -> bool {
        if !force.is_finite() {
            return false;
        }
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.force = force;
                true
            }
            None => false,
        }
    }

    /// Add `velocity` immediately and fade it out over `duration` seconds.
    ///
    /// A non-positive or non-finite duration is treated as a one-off velocity
    /// change with nothing to decay.
    pub fn apply_impulse(&mut self, id: BodyId, velocity: Vec2, duration: f32) -> bool {
        if !velocity.is_finite() {
            return false;
        }
        let Some(body) = self.bodies.get_mut(&id) else {
            return false;
        };
        body.velocity += velocity;
        if duration.is_finite() && duration > 0.0 && velocity != Vec2::ZERO {
            body.impulses.push(Impulse {
                velocity,
                elapsed: 0.0,
                duration,
                live: velocity,
            });
        }
        true
    }

    /// Advance every body by `dt` seconds.
    ///
    /// A non-finite or non-positive step only clears the pending forces.
    pub fn update(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            for body in self.bodies.values_mut() {
                body.force = Vec2::ZERO;
            }
            return;
        }
        for body in self.bodies.values_mut() {
            body.integrate(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn test_invalid_mass_uses_default() {
        let mut integrator = MovementIntegrator::new();
        let id = integrator.create_body(Vec2::ZERO, -3.0, 10.0);
        assert_eq!(integrator.body(id).map(|b| b.mass), Some(DEFAULT_MASS));
    }

    #[test]
    fn test_force_is_cleared_after_update() {
        let mut integrator = MovementIntegrator::new();
        let id = integrator.create_body(Vec2::ZERO, 1.0, 100.0);
        integrator.set_force(id, Vec2::new(10.0, 0.0));
        integrator.update(0.1);
        assert_eq!(integrator.body(id).map(|b| b.force()), Some(Vec2::ZERO));
    }

    #[test]
    fn test_bad_dt_only_resets_force() {
        let mut integrator = MovementIntegrator::new();
        let id = integrator.create_body(Vec2::new(1.0, 2.0), 1.0, 100.0);
        integrator.set_force(id, Vec2::new(10.0, 0.0));
        integrator.update(f32::NAN);
        integrator.update(-1.0);
        let body = integrator.body(id).cloned();
        assert!(body.is_some());
        if let Some(body) = body {
            assert_eq!(body.position, Vec2::new(1.0, 2.0));
            assert_eq!(body.velocity, Vec2::ZERO);
            assert_eq!(body.force(), Vec2::ZERO);
        }
    }

    #[test]
    fn test_speed_clamped_to_max() {
        let mut integrator = MovementIntegrator::new();
        let id = integrator.create_body(Vec2::ZERO, 1.0, 5.0);
        integrator.set_force(id, Vec2::new(1000.0, 0.0));
        integrator.update(1.0);
        let speed = integrator.velocity(id).map(|v| v.length()).unwrap_or_default();
        assert!((speed - 5.0).abs() < EPS);
    }

    #[test]
    fn test_impulse_never_reverses_clamped_body() {
        let mut integrator = MovementIntegrator::new();
        let id = integrator.create_body(Vec2::ZERO, 1.0, 50.0);
        integrator.apply_impulse(id, Vec2::new(200.0, 0.0), 0.5);
        for _ in 0..60 {
            integrator.update(1.0 / 60.0);
            let vx = integrator.velocity(id).map(|v| v.x).unwrap_or_default();
            assert!(vx >= -EPS, "velocity reversed: {}", vx);
        }
        assert!(integrator.body(id).map(|b| b.impulses().is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_impulse_decays_against_opposing_motion() {
        let mut integrator = MovementIntegrator::new();
        let id = integrator.create_body(Vec2::ZERO, 1.0, 100.0);
        integrator.set_force(id, Vec2::new(-400.0, 0.0));
        integrator.update(0.1);
        integrator.apply_impulse(id, Vec2::new(10.0, 0.0), 1.0);
        assert!((integrator.velocity(id).unwrap().x + 30.0).abs() < EPS);

        for _ in 0..10 {
            integrator.update(0.1);
        }
        let velocity = integrator.velocity(id).unwrap();
        assert!((velocity.x + 40.0).abs() < 1e-3, "impulse left behind: {:?}", velocity);
    }

    #[test]
    fn test_clamped_share_is_not_decayed_twice() {
        let mut integrator = MovementIntegrator::new();
        let id = integrator.create_body(Vec2::ZERO, 1.0, 50.0);
        integrator.apply_impulse(id, Vec2::new(200.0, 0.0), 1.0);
        integrator.update(0.01);
        let live = integrator.body(id).map(|b| b.impulses()[0].residual()).unwrap();
        assert!(live.length() <= 50.0 + EPS);
        assert!(live.x > 0.0);
    }

    #[test]
    fn test_missing_body_is_noop() {
        let mut integrator = MovementIntegrator::new();
        assert!(!integrator.set_force(BodyId(9), Vec2::ONE));
        assert!(!integrator.apply_impulse(BodyId(9), Vec2::ONE, 1.0));
        assert_eq!(integrator.position(BodyId(9)), None);
    }
}
