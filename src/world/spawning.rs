//! Hostile waves
//!
//! Each wave starts at a fixed time and spawns `count` hostiles, one every
//! `interval_secs`, picking the unit type by weight from the shared seeded
//! random source. Hostiles enter from a random edge of the map.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rng::GameRng;

fn default_level() -> u32 {
    1
}

/// One weighted entry of a wave's spawn table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedSpawn {
    pub type_id: String,
    #[serde(default = "default_level")]
    pub level: u32,
    /// Relative weight; zero or negative never spawns
    pub weight: f32,
}

/// A scheduled group of hostiles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub start_secs: f32,
    pub count: u32,
    /// Seconds between spawns; zero spawns the whole wave at once
    #[serde(default)]
    pub interval_secs: f32,
    pub spawns: Vec<WeightedSpawn>,
}

/// A hostile the spawner wants in the world.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnRequest {
    pub type_id: String,
    pub level: u32,
    pub position: Vec2,
}

/// Output of one spawner update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WaveTick {
    /// Indices of waves that started during this update
    pub started: Vec<usize>,
    pub spawns: Vec<SpawnRequest>,
}

#[derive(Clone, Debug)]
struct WaveProgress {
    wave: Wave,
    started: bool,
    spawned: u32,
    next_spawn_secs: f32,
}

/// Drives every wave of a scenario.
#[derive(Clone, Debug, Default)]
pub struct WaveSpawner {
    waves: Vec<WaveProgress>,
}

/// Random point on one of the four edges of `bounds`.
pub fn edge_point(rng: &mut GameRng, bounds: Rect) -> Vec2 {
    let along = rng.random_f32();
    let edge = rng.random_f32();
    let x = bounds.min.x + bounds.width() * along;
    let y = bounds.min.y + bounds.height() * along;
    if edge < 0.25 {
        Vec2::new(x, bounds.min.y)
    } else if edge < 0.5 {
        Vec2::new(x, bounds.max.y)
    } else if edge < 0.75 {
        Vec2::new(bounds.min.x, y)
    } else {
        Vec2::new(bounds.max.x, y)
    }
}

impl WaveSpawner {
    pub fn new(waves: Vec<Wave>) -> Self {
        let mut spawner = Self::default();
        for wave in waves {
            spawner.add_wave(wave);
        }
        spawner
    }

    pub fn add_wave(&mut self, wave: Wave) {
        let start = if wave.start_secs.is_finite() {
            wave.start_secs.max(0.0)
        } else {
            warn!("Wave with non-finite start time starts immediately");
            0.0
        };
        self.waves.push(WaveProgress {
            next_spawn_secs: start,
            wave: Wave {
                start_secs: start,
                ..wave
            },
            started: false,
            spawned: 0,
        });
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// True once every wave has spawned everything it can.
    pub fn is_exhausted(&self) -> bool {
        self.waves.iter().all(|progress| progress.spawned >= progress.wave.count)
    }

    /// Spawns due by `elapsed_secs`.
    ///
    /// A wave whose spawn table has no usable weight is exhausted on start
    /// without spawning.
    pub fn update(&mut self, elapsed_secs: f32, rng: &mut GameRng, bounds: Rect) -> WaveTick {
        let mut tick = WaveTick::default();

        for (index, progress) in self.waves.iter_mut().enumerate() {
            if elapsed_secs < progress.wave.start_secs || progress.spawned >= progress.wave.count {
                continue;
            }
            if !progress.started {
                progress.started = true;
                tick.started.push(index);
            }

            let weights: Vec<f32> = progress.wave.spawns.iter().map(|s| s.weight).collect();
            while progress.spawned < progress.wave.count && elapsed_secs >= progress.next_spawn_secs {
                let Some(choice) = rng.weighted_index(&weights) else {
                    warn!("Wave {} has no spawnable entries", index);
                    progress.spawned = progress.wave.count;
                    break;
                };
                let entry = &progress.wave.spawns[choice];
                tick.spawns.push(SpawnRequest {
                    type_id: entry.type_id.clone(),
                    level: entry.level,
                    position: edge_point(rng, bounds),
                });
                progress.spawned += 1;
                let interval = progress.wave.interval_secs;
                if interval.is_finite() && interval > 0.0 {
                    progress.next_spawn_secs += interval;
                }
            }
        }

        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Rect {
        Rect::new(-100.0, -50.0, 100.0, 50.0)
    }

    fn wave(start: f32, count: u32, interval: f32) -> Wave {
        Wave {
            start_secs: start,
            count,
            interval_secs: interval,
            spawns: vec![
                WeightedSpawn {
                    type_id: "grunt".to_string(),
                    level: 1,
                    weight: 3.0,
                },
                WeightedSpawn {
                    type_id: "never".to_string(),
                    level: 1,
                    weight: 0.0,
                },
            ],
        }
    }

    #[test]
    fn test_wave_waits_for_start() {
        let mut rng = GameRng::from_seed(1);
        let mut spawner = WaveSpawner::new(vec![wave(2.0, 3, 0.0)]);
        assert!(spawner.update(1.0, &mut rng, bounds()).spawns.is_empty());

        let tick = spawner.update(2.0, &mut rng, bounds());
        assert_eq!(tick.started, vec![0]);
        assert_eq!(tick.spawns.len(), 3);
        assert!(spawner.is_exhausted());
    }

    #[test]
    fn test_interval_spacing() {
        let mut rng = GameRng::from_seed(1);
        let mut spawner = WaveSpawner::new(vec![wave(0.0, 3, 1.0)]);
        assert_eq!(spawner.update(0.0, &mut rng, bounds()).spawns.len(), 1);
        assert_eq!(spawner.update(0.5, &mut rng, bounds()).spawns.len(), 0);
        assert_eq!(spawner.update(2.0, &mut rng, bounds()).spawns.len(), 2);
        assert!(spawner.is_exhausted());
    }

    #[test]
    fn test_zero_weight_never_chosen() {
        let mut rng = GameRng::from_seed(9);
        let mut spawner = WaveSpawner::new(vec![wave(0.0, 50, 0.0)]);
        let tick = spawner.update(0.0, &mut rng, bounds());
        assert!(tick.spawns.iter().all(|s| s.type_id == "grunt"));
    }

    #[test]
    fn test_spawns_on_edges() {
        let mut rng = GameRng::from_seed(3);
        for _ in 0..100 {
            let p = edge_point(&mut rng, bounds());
            let on_x_edge = p.x == -100.0 || p.x == 100.0;
            let on_y_edge = p.y == -50.0 || p.y == 50.0;
            assert!(on_x_edge || on_y_edge);
            assert!(bounds().contains(p));
        }
    }

    #[test]
    fn test_unusable_table_exhausts_wave() {
        let mut rng = GameRng::from_seed(3);
        let mut broken = wave(0.0, 5, 0.0);
        broken.spawns.retain(|s| s.weight <= 0.0);
        let mut spawner = WaveSpawner::new(vec![broken]);
        assert!(spawner.update(0.0, &mut rng, bounds()).spawns.is_empty());
        assert!(spawner.is_exhausted());
    }
}
