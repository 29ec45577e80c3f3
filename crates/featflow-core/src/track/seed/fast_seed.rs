use super::{FeatureGridConfig, FeatureSeed, FeatureSeeder, sort_by_score};
use crate::{img::PyramidLevel, track::seed::utils::radius_nms};
use log::{debug, trace};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

const BASE_CIRCLE_OFFSETS: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastDetectorType {
    Type5_8,
    Type7_12,
    Type9_16,
}

impl FastDetectorType {
    #[inline]
    fn contiguous_arc_length(self) -> usize {
        match self {
            Self::Type5_8 => 5,
            Self::Type7_12 => 7,
            Self::Type9_16 => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastDetectorConfig {
    pub intensity_threshold: f32,
    pub nonmax_suppression: bool,
    pub detector_type: FastDetectorType,
    pub circle_radius: usize,
}

impl Default for FastDetectorConfig {
    fn default() -> Self {
        Self {
            intensity_threshold: 20.0,
            nonmax_suppression: true,
            detector_type: FastDetectorType::Type9_16,
            circle_radius: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastSeederConfig {
    pub grid: FeatureGridConfig,
    pub detector: FastDetectorConfig,
}

#[derive(Debug, Clone)]
pub struct FastSeeder {
    config: FastSeederConfig,
    circle_offsets: [(isize, isize); 16],
    arc_length: usize,
}

impl FastSeeder {
    pub fn new(config: FastSeederConfig) -> Self {
        let mut detector = config.detector;
        detector.intensity_threshold = detector.intensity_threshold.max(0.0);
        detector.circle_radius = detector.circle_radius.max(2);

        let arc_length = detector.detector_type.contiguous_arc_length();
        let circle_offsets = compute_circle_offsets(detector.circle_radius);

        trace!(
            "FAST seeder config: threshold {:.1}, nonmax {}, radius {}, arc length {}",
            detector.intensity_threshold,
            detector.nonmax_suppression,
            detector.circle_radius,
            arc_length
        );

        Self {
            config: FastSeederConfig {
                grid: config.grid,
                detector,
            },
            circle_offsets,
            arc_length,
        }
    }
}

impl FeatureSeeder for FastSeeder {
    fn seed(&self, level: &PyramidLevel) -> Vec<FeatureSeed> {
        let width = level.image.width() as usize;
        let height = level.image.height() as usize;
        let grid_cfg = self.config.grid;
        let detector_cfg = self.config.detector;

        let cell = grid_cfg.cell_size.max(4);
        let per_cell_cap = grid_cfg.per_cell_cap.max(1);
        let max_features = grid_cfg.max_features.max(per_cell_cap);
        let response_threshold = grid_cfg.response_threshold.max(0.0);
        let nms_radius = grid_cfg.nms_radius_px.max(0.0);
        let border = detector_cfg.circle_radius.max(grid_cfg.window_radius.max(1));

        if width <= border * 2 || height <= border * 2 {
            return Vec::new();
        }

        let x_lo = border;
        let x_hi = width - border;
        let y_lo = border;
        let y_hi = height - border;

        let cells_x = (x_hi - x_lo).div_ceil(cell);
        let cells_y = (y_hi - y_lo).div_ceil(cell);

        let mut score_map = vec![0.0f32; width * height];
        let mut candidates: Vec<Candidate> = Vec::new();

        for y in y_lo..y_hi {
            for x in x_lo..x_hi {
                if let Some(score) = fast_corner_score(
                    level,
                    x,
                    y,
                    &self.circle_offsets,
                    detector_cfg.intensity_threshold,
                    self.arc_length,
                ) {
                    score_map[y * width + x] = score;
                    candidates.push(Candidate { x, y, score });
                }
            }
        }

        trace!(
            "FAST detected {} raw corners above threshold {:.1}",
            candidates.len(),
            detector_cfg.intensity_threshold
        );

        if candidates.is_empty() {
            debug!(
                "FAST seeding in {}x{} (oct {}) → 0 (raw)",
                width, height, level.octave
            );
            return Vec::new();
        }

        let candidates = if detector_cfg.nonmax_suppression {
            apply_nonmax_suppression(&candidates, &score_map, width, height)
        } else {
            candidates
        };

        let mut buckets: Vec<Vec<FeatureSeed>> =
            vec![Vec::with_capacity(per_cell_cap); cells_x * cells_y];

        for candidate in candidates {
            if candidate.score < response_threshold {
                continue;
            }

            let cx = (candidate.x - x_lo) / cell;
            let cy = (candidate.y - y_lo) / cell;
            let bucket = &mut buckets[cy * cells_x + cx];
            insert_sorted(
                bucket,
                FeatureSeed {
                    px_uv: Vector2::new(candidate.x as f32, candidate.y as f32),
                    score: candidate.score,
                },
            );

            if bucket.len() > per_cell_cap {
                bucket.pop();
            }
        }

        let mut seeds: Vec<FeatureSeed> = buckets.into_iter().flatten().collect();
        sort_by_score(&mut seeds);

        let mut seeds = if nms_radius > 0.0 {
            radius_nms(seeds, nms_radius, max_features)
        } else {
            seeds
        };
        seeds.truncate(max_features);

        debug!(
            "FAST seeding in {}x{} (oct {}, cell {}, K {}, NMS {:.1}px) → {} (max {})",
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

#[derive(Debug, Clone)]
struct Candidate {
    x: usize,
    y: usize,
    score: f32,
}

fn compute_circle_offsets(radius: usize) -> [(isize, isize); 16] {
    if radius == 3 {
        return BASE_CIRCLE_OFFSETS;
    }

    let scale = radius as f32 / 3.0;
    let mut offsets = [(0isize, 0isize); 16];
    for (i, &(x, y)) in BASE_CIRCLE_OFFSETS.iter().enumerate() {
        offsets[i] = (
            (x as f32 * scale).round() as isize,
            (y as f32 * scale).round() as isize,
        );
    }
    offsets
}

fn ring_sample(level: &PyramidLevel, x: usize, y: usize, offset: (isize, isize)) -> f32 {
    let sx = (x as isize + offset.0) as u32;
    let sy = (y as isize + offset.1) as u32;
    level.intensity(sx, sy)
}

fn fast_corner_score(
    level: &PyramidLevel,
    x: usize,
    y: usize,
    offsets: &[(isize, isize); 16],
    threshold: f32,
    arc_length: usize,
) -> Option<f32> {
    let center = level.intensity(x as u32, y as u32);
    let high = center + threshold;
    let low = center - threshold;

    // Compass test: a 9/16 arc must cover at least 2 of the 4 compass points,
    // shorter arcs at least 1.
    let needed = if arc_length >= 9 { 2 } else { 1 };
    let mut brighter = 0;
    let mut darker = 0;
    for &idx in &[0usize, 4, 8, 12] {
        let sample = ring_sample(level, x, y, offsets[idx]);
        if sample > high {
            brighter += 1;
        } else if sample < low {
            darker += 1;
        }
    }
    if brighter < needed && darker < needed {
        return None;
    }

    let mut circle_vals = [0.0f32; 16];
    for (i, &offset) in offsets.iter().enumerate() {
        circle_vals[i] = ring_sample(level, x, y, offset);
    }

    // Ring is unrolled twice so arcs crossing index 0 are seen contiguously.
    let mut classes = [0i8; 32];
    for i in 0..16 {
        let val = circle_vals[i];
        classes[i] = if val > high {
            1
        } else if val < low {
            -1
        } else {
            0
        };
        classes[i + 16] = classes[i];
    }

    let mut idx = 0usize;
    let mut best: Option<f32> = None;
    while idx < classes.len() {
        let class = classes[idx];
        if class == 0 {
            idx += 1;
            continue;
        }
        let mut len = 0usize;
        let mut sum = 0.0f32;
        while idx + len < classes.len() && classes[idx + len] == class && len < 16 {
            let value = circle_vals[(idx + len) % 16];
            sum += if class > 0 { value - center } else { center - value };
            len += 1;
        }
        if len >= arc_length {
            best = Some(best.map_or(sum, |b: f32| b.max(sum)));
        }
        idx += len;
    }
    best
}

fn apply_nonmax_suppression(
    candidates: &[Candidate],
    score_map: &[f32],
    width: usize,
    height: usize,
) -> Vec<Candidate> {
    candidates
        .iter()
        .filter(|candidate| {
            let (x, y) = (candidate.x, candidate.y);
            let x_min = x.saturating_sub(1);
            let x_max = (x + 1).min(width - 1);
            let y_min = y.saturating_sub(1);
            let y_max = (y + 1).min(height - 1);
            (y_min..=y_max).all(|ny| {
                (x_min..=x_max)
                    .all(|nx| (nx == x && ny == y) || score_map[ny * width + nx] <= candidate.score)
            })
        })
        .cloned()
        .collect()
}

fn insert_sorted(bucket: &mut Vec<FeatureSeed>, seed: FeatureSeed) {
    let insert_pos = bucket
        .iter()
        .position(|existing| existing.score <= seed.score)
        .unwrap_or(bucket.len());
    bucket.insert(insert_pos, seed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::build_pyramid;
    use image::{GrayImage, Luma};

    fn bright_square() -> GrayImage {
        GrayImage::from_fn(40, 40, |x, y| {
            let inside = (12..28).contains(&x) && (12..28).contains(&y);
            Luma([if inside { 230 } else { 30 }])
        })
    }

    #[test]
    fn fast_seeder_detects_square_corners() {
        let pyramid = build_pyramid(&bright_square(), 1);
        let seeder = FastSeeder::new(FastSeederConfig::default());

        let seeds = seeder.seed(pyramid.base());
        assert!(!seeds.is_empty(), "expected FAST seeder to find corners");
        assert!(seeds.iter().all(|s| s.score >= 10.0));
        for (cx, cy) in [(12.0, 12.0), (27.0, 12.0), (12.0, 27.0), (27.0, 27.0)] {
            assert!(
                seeds
                    .iter()
                    .any(|s| (s.px_uv.x - cx).abs() <= 2.5 && (s.px_uv.y - cy).abs() <= 2.5),
                "no corner near ({cx}, {cy}): {seeds:?}"
            );
        }
        assert!(
            seeds
                .windows(2)
                .all(|pair| pair[0].score >= pair[1].score)
        );
    }

    #[test]
    fn flat_image_yields_nothing() {
        let flat = GrayImage::from_pixel(32, 32, Luma([128]));
        let pyramid = build_pyramid(&flat, 1);
        let seeder = FastSeeder::new(FastSeederConfig::default());
        assert!(seeder.seed(pyramid.base()).is_empty());
    }
}
