//! Shared random source
//!
//! Weighted spawn selection, damage variance and wander destinations all draw
//! from one seeded generator so a run can be replayed from its seed.

use rand::prelude::*;
use rand::rngs::StdRng;

/// Seeded random number generator for deterministic simulation.
///
/// When a seed is provided (e.g., via a scenario file), the same seed will
/// always produce the same outcome. Without a seed, uses system entropy.
pub struct GameRng {
    rng: StdRng,
    /// The seed used to initialize this RNG (if deterministic)
    pub seed: Option<u64>,
}

impl GameRng {
    /// Create a new GameRng with a specific seed for deterministic behavior
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create a new GameRng with random entropy (non-deterministic)
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Generate a random f32 in the range [0.0, 1.0)
    pub fn random_f32(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Generate a random f32 in the given range
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        min + self.random_f32() * (max - min)
    }

    /// Random angle in radians, [0, TAU)
    pub fn random_angle(&mut self) -> f32 {
        self.random_f32() * std::f32::consts::TAU
    }

    /// Pick an index by weight. Non-positive and non-finite weights never win.
    /// Returns `None` when no weight is usable.
    pub fn weighted_index(&mut self, weights: &[f32]) -> Option<usize> {
        let usable = |w: f32| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let total: f32 = weights.iter().copied().map(usable).sum();
        if total <= 0.0 {
            return None;
        }

        let mut roll = self.random_f32() * total;
        let mut last_usable = None;
        for (index, weight) in weights.iter().copied().map(usable).enumerate() {
            if weight <= 0.0 {
                continue;
            }
            if roll < weight {
                return Some(index);
            }
            roll -= weight;
            last_usable = Some(index);
        }
        // Float rounding can leave a sliver past the final bucket
        last_usable
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
