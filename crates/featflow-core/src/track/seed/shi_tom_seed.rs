use crate::img::PyramidLevel;
use crate::track::seed::utils::radius_nms;
use crate::track::seed::{FeatureSeed, FeatureSeeder, sort_by_score};
use log::debug;
use nalgebra::Vector2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiTomasiGridConfig {
    pub cell_size: usize,
    pub max_features: usize,
    pub response_threshold: f32,
    pub per_cell_cap: usize,
    pub nms_radius_px: f32,
    pub window_radius: usize,
}

impl Default for ShiTomasiGridConfig {
    fn default() -> Self {
        Self {
            cell_size: 24,
            max_features: 500,
            response_threshold: 10.0,
            per_cell_cap: 5,
            nms_radius_px: 0.0,
            window_radius: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShiTomasiSeeder {
    config: ShiTomasiGridConfig,
}

impl ShiTomasiSeeder {
    pub fn new(config: ShiTomasiGridConfig) -> Self {
        Self { config }
    }

    /// Minimum eigenvalue of the 3x3 structure tensor
    ///
    /// ```text
    /// M = [ixx  ixy]   where  ixx = ∑Iₓ²,  iyy = ∑Iᵧ²,  ixy = ∑IₓIᵧ
    ///     [ixy  iyy]
    /// ```
    ///
    /// λ_min = (trace - √(trace² - 4·det)) / 2 is large only when the
    /// gradients are strong in two independent directions.
    #[inline]
    fn shi_tomasi_response(level: &PyramidLevel, x: u32, y: u32) -> f32 {
        let (width, height) = level.image.dimensions();
        if x < 1 || y < 1 || x + 1 >= width || y + 1 >= height {
            return 0.0;
        }

        let mut ixx = 0.0f32;
        let mut iyy = 0.0f32;
        let mut ixy = 0.0f32;
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                let (gx, gy) = level.gradient(nx, ny);
                ixx += gx * gx;
                iyy += gy * gy;
                ixy += gx * gy;
            }
        }

        let trace = ixx + iyy;
        let det = ixx * iyy - ixy * ixy;
        let discriminant = trace * trace - 4.0 * det;

        if discriminant < 0.0 {
            return 0.0;
        }

        0.5 * (trace - discriminant.sqrt())
    }
}

impl FeatureSeeder for ShiTomasiSeeder {
    fn seed(&self, level: &PyramidLevel) -> Vec<FeatureSeed> {
        let width = level.image.width() as usize;
        let height = level.image.height() as usize;

        let cell = self.config.cell_size.max(4);
        let per_cell_cap = self.config.per_cell_cap.max(1);
        let max_features = self.config.max_features.max(per_cell_cap);
        let thr = self.config.response_threshold.max(0.0);
        let nms_radius = self.config.nms_radius_px.max(0.0);
        let r = self.config.window_radius.max(1);

        if width <= 2 * r || height <= 2 * r {
            return Vec::new();
        }
        let x_lo = r;
        let x_hi = width - r;
        let y_lo = r;
        let y_hi = height - r;

        let cells_x = (x_hi - x_lo).div_ceil(cell);
        let cells_y = (y_hi - y_lo).div_ceil(cell);

        // Rows of cells run in parallel; each row keeps a small sorted top-K per cell.
        let mut seeds: Vec<FeatureSeed> = (0..cells_y)
            .into_par_iter()
            .flat_map_iter(|cy| {
                let mut row_seeds: Vec<FeatureSeed> = Vec::with_capacity(cells_x * per_cell_cap);

                let y_min = y_lo + cy * cell;
                let y_max = (y_min + cell).min(y_hi);

                for cx in 0..cells_x {
                    let x_min = x_lo + cx * cell;
                    let x_max = (x_min + cell).min(x_hi);

                    let mut best: Vec<(f32, Vector2<f32>)> = Vec::with_capacity(per_cell_cap + 1);

                    for y in y_min..y_max {
                        for x in x_min..x_max {
                            let score = Self::shi_tomasi_response(level, x as u32, y as u32);
                            if score < thr {
                                continue;
                            }

                            let i = best
                                .iter()
                                .position(|(s, _)| *s <= score)
                                .unwrap_or(best.len());
                            best.insert(i, (score, Vector2::new(x as f32, y as f32)));
                            if best.len() > per_cell_cap {
                                best.pop();
                            }
                        }
                    }

                    row_seeds.extend(best.into_iter().map(|(score, px_uv)| FeatureSeed {
                        px_uv,
                        score,
                    }));
                }

                row_seeds
            })
            .collect();

        if seeds.is_empty() {
            debug!(
                "Seeding features in {}x{} (oct {}, cell {}, per_cell {}) → 0",
                width, height, level.octave, cell, per_cell_cap
            );
            return seeds;
        }

        sort_by_score(&mut seeds);
        if nms_radius > 0.0 {
            seeds = radius_nms(seeds, nms_radius, max_features);
        }
        seeds.truncate(max_features);

        debug!(
            "Seeding features in {}x{} (oct {}, cell {}, K {}, NMS {:.1}px) → {} (max {})",
            width,
            height,
            level.octave,
            cell,
            per_cell_cap,
            nms_radius,
            seeds.len(),
            max_features
        );
        seeds
    }
}
