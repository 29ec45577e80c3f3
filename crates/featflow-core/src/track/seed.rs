use crate::img::PyramidLevel;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

pub mod fast_seed;
pub use fast_seed::{FastDetectorConfig, FastDetectorType, FastSeeder, FastSeederConfig};

pub mod shi_tom_seed;
pub use shi_tom_seed::{ShiTomasiGridConfig, ShiTomasiSeeder};

pub mod utils;

use super::config::DetectorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureGridConfig {
    pub cell_size: usize,
    pub max_features: usize,
    pub response_threshold: f32,
    pub per_cell_cap: usize,
    pub nms_radius_px: f32,
    pub window_radius: usize,
}

impl Default for FeatureGridConfig {
    fn default() -> Self {
        Self {
            cell_size: 24,
            max_features: 1000,
            response_threshold: 10.0,
            per_cell_cap: 100,
            nms_radius_px: 0.0,
            window_radius: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSeed {
    pub px_uv: Vector2<f32>,
    pub score: f32,
}

/// Corner detector over a single pyramid level. Seeds come back sorted by descending score.
pub trait FeatureSeeder {
    fn seed(&self, level: &PyramidLevel) -> Vec<FeatureSeed>;
}

/// The detector owned by the tracker.
#[derive(Debug, Clone)]
pub enum Detector {
    Fast(FastSeeder),
    ShiTomasi(ShiTomasiSeeder),
}

impl Detector {
    pub fn from_config(config: &DetectorConfig) -> Self {
        match config {
            DetectorConfig::Fast(cfg) => Self::Fast(FastSeeder::new(*cfg)),
            DetectorConfig::ShiTomasi(cfg) => Self::ShiTomasi(ShiTomasiSeeder::new(*cfg)),
        }
    }
}

impl FeatureSeeder for Detector {
    fn seed(&self, level: &PyramidLevel) -> Vec<FeatureSeed> {
        match self {
            Self::Fast(seeder) => seeder.seed(level),
            Self::ShiTomasi(seeder) => seeder.seed(level),
        }
    }
}

/// Descending-score order; NaN scores compare equal so the sort stays total.
pub(crate) fn sort_by_score(seeds: &mut [FeatureSeed]) {
    seeds.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
