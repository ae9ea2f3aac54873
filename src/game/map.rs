//! Procedural arena generation

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::math::Vec3;
use super::physics::{GROUND_HEIGHT, PLAYER_RADIUS};

/// Tries per spawn point to land outside every obstacle footprint
const SPAWN_PLACEMENT_ATTEMPTS: usize = 8;

/// Arena generation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    /// Side length of the square arena, centred at the origin
    pub size: f32,
    /// Inclusive lower bound on the obstacle count
    pub min_obstacles: usize,
    /// Inclusive upper bound on the obstacle count
    pub max_obstacles: usize,
    /// Number of spawn points
    pub spawn_points: usize,
    /// Width/depth range of an obstacle
    pub footprint_range: (f32, f32),
    /// Height range of an obstacle
    pub height_range: (f32, f32),
    /// Height of a spawned player's centre above the floor
    pub spawn_height: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            size: 50.0,
            min_obstacles: 10,
            max_obstacles: 20,
            spawn_points: 5,
            footprint_range: (1.0, 5.0),
            height_range: (1.0, 6.0),
            spawn_height: GROUND_HEIGHT,
        }
    }
}

/// Box dimensions of an obstacle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSize {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
}

/// Static axis-aligned box. `position` is the box centre; the bottom face sits on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub position: Vec3,
    pub size: ObstacleSize,
}

impl Obstacle {
    fn half_extents(&self) -> Vec3 {
        Vec3::new(self.size.width, self.size.height, self.size.depth) * 0.5
    }

    /// Minimum corner
    pub fn min(&self) -> Vec3 {
        self.position - self.half_extents()
    }

    /// Maximum corner
    pub fn max(&self) -> Vec3 {
        self.position + self.half_extents()
    }

    /// Whether a circle on the floor plane overlaps this box's footprint
    fn footprint_overlaps(&self, point: Vec3, radius: f32) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x + radius > min.x
            && point.x - radius < max.x
            && point.z + radius > min.z
            && point.z - radius < max.z
    }
}

/// Arena geometry. Never mutated after generation; a new map replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMap {
    pub size: f32,
    pub obstacles: Vec<Obstacle>,
    pub spawn_points: Vec<Vec3>,
}

impl GameMap {
    /// Half the side length: the arena spans `[-half, half]` on X and Z
    pub fn half_extent(&self) -> f32 {
        self.size / 2.0
    }

    /// Uniformly random spawn point, or the arena centre if the map has none
    pub fn random_spawn_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        if self.spawn_points.is_empty() {
            return Vec3::new(0.0, GROUND_HEIGHT, 0.0);
        }
        self.spawn_points[rng.gen_range(0..self.spawn_points.len())]
    }

    #[cfg(test)]
    pub(crate) fn is_spawn_point(&self, point: Vec3) -> bool {
        self.spawn_points.iter().any(|p| *p == point)
    }
}

/// Builds fresh arenas from a [`MapConfig`]
#[derive(Debug, Clone, Default)]
pub struct MapGenerator {
    config: MapConfig,
}

impl MapGenerator {
    pub fn new(config: MapConfig) -> Self {
        Self { config }
    }

    /// Generate a new arena. Pure construction apart from the RNG.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> GameMap {
        let cfg = &self.config;
        let half = cfg.size / 2.0;

        let count = if cfg.max_obstacles > cfg.min_obstacles {
            rng.gen_range(cfg.min_obstacles..=cfg.max_obstacles)
        } else {
            cfg.min_obstacles
        };

        let obstacles: Vec<Obstacle> = (0..count)
            .map(|_| {
                let width = sample(rng, cfg.footprint_range).min(cfg.size);
                let depth = sample(rng, cfg.footprint_range).min(cfg.size);
                let height = sample(rng, cfg.height_range);
                let x = sample(rng, (-half + width / 2.0, half - width / 2.0));
                let z = sample(rng, (-half + depth / 2.0, half - depth / 2.0));
                Obstacle {
                    position: Vec3::new(x, height / 2.0, z),
                    size: ObstacleSize {
                        width,
                        height,
                        depth,
                    },
                }
            })
            .collect();

        let spawn_limit = (half - PLAYER_RADIUS).max(0.0);
        let spawn_points = (0..cfg.spawn_points)
            .map(|_| {
                let mut candidate = Vec3::ZERO;
                for _ in 0..SPAWN_PLACEMENT_ATTEMPTS {
                    candidate = Vec3::new(
                        sample(rng, (-spawn_limit, spawn_limit)),
                        cfg.spawn_height,
                        sample(rng, (-spawn_limit, spawn_limit)),
                    );
                    if !obstacles
                        .iter()
                        .any(|o| o.footprint_overlaps(candidate, PLAYER_RADIUS))
                    {
                        break;
                    }
                }
                candidate
            })
            .collect();

        GameMap {
            size: cfg.size,
            obstacles,
            spawn_points,
        }
    }
}

/// Uniform sample from `[lo, hi)`, collapsing to `lo` for an empty range
fn sample<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f32, f32)) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}
