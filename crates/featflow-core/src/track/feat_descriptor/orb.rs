use std::sync::OnceLock;

use nalgebra::Vector2;

use super::{DESCRIPTOR_BYTES, Descriptor, FeatDescriptorExtractor};
use crate::img::PyramidLevel;
use crate::img::image_utils::bilinear_sample_luma;

const ORB_POINTS: usize = DESCRIPTOR_BYTES * 8;
const DEFAULT_PATCH_RADIUS: usize = 15; // 31x31 patch

/// Oriented FAST and Rotated BRIEF (ORB) descriptor extractor.
///
/// Each descriptor encodes 256 binary intensity tests drawn from a 31×31 patch
/// around the feature. Test pairs are rotated by the keypoint's
/// intensity-centroid angle before comparison, then packed into 32 bytes
/// matched by Hamming distance.
#[derive(Debug, Clone)]
pub struct OrbDescriptor {
    patch_radius: usize,
}

impl OrbDescriptor {
    pub fn new() -> Self {
        Self {
            patch_radius: DEFAULT_PATCH_RADIUS,
        }
    }

    /// Angle of the intensity centroid, in radians.
    pub fn orientation(&self, level: &PyramidLevel, px_uv: Vector2<f32>) -> f32 {
        compute_orientation(level, px_uv.x, px_uv.y, self.patch_radius as f32)
    }
}

impl Default for OrbDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatDescriptorExtractor for OrbDescriptor {
    fn describe(&self, level: &PyramidLevel, px_uv: Vector2<f32>) -> Descriptor {
        let angle = self.orientation(level, px_uv);
        build_descriptor(
            level,
            px_uv.x,
            px_uv.y,
            angle,
            self.patch_radius as f32,
            pattern_cache(),
        )
    }
}

#[derive(Clone, Copy)]
struct PatternPair {
    p1: (f32, f32),
    p2: (f32, f32),
}

/// Canonical sampling pattern, generated once for the default radius and
/// scaled at sampling time for other radii.
fn pattern_cache() -> &'static [PatternPair] {
    static CACHE: OnceLock<Vec<PatternPair>> = OnceLock::new();
    CACHE
        .get_or_init(|| generate_pattern(ORB_POINTS, DEFAULT_PATCH_RADIUS as f32))
        .as_slice()
}

fn generate_pattern(count: usize, radius: f32) -> Vec<PatternPair> {
    let mut rng = XorShift64::new(0xDEAD_BEEF_CAFE_BABE);
    let radius_sq = radius * radius;
    (0..count)
        .map(|_| PatternPair {
            p1: random_point(&mut rng, radius, radius_sq),
            p2: random_point(&mut rng, radius, radius_sq),
        })
        .collect()
}

fn random_point(rng: &mut XorShift64, radius: f32, radius_sq: f32) -> (f32, f32) {
    loop {
        let x = (rng.next_f32() * 2.0 - 1.0) * radius;
        let y = (rng.next_f32() * 2.0 - 1.0) * radius;
        if x * x + y * y <= radius_sq {
            return (x, y);
        }
    }
}

fn compute_orientation(level: &PyramidLevel, cx: f32, cy: f32, radius: f32) -> f32 {
    let radius = radius.round() as isize;
    let radius_sq = radius * radius;
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius_sq {
                continue;
            }
            let intensity = bilinear_sample_luma(&level.image, cx + dx as f32, cy + dy as f32);
            m10 += dx as f32 * intensity;
            m01 += dy as f32 * intensity;
        }
    }

    if m10.abs() < f32::EPSILON && m01.abs() < f32::EPSILON {
        0.0
    } else {
        m01.atan2(m10)
    }
}

fn build_descriptor(
    level: &PyramidLevel,
    cx: f32,
    cy: f32,
    angle: f32,
    patch_radius: f32,
    pattern: &[PatternPair],
) -> Descriptor {
    let (sin_theta, cos_theta) = angle.sin_cos();
    let scale = patch_radius / DEFAULT_PATCH_RADIUS as f32;

    let mut bytes = [0u8; DESCRIPTOR_BYTES];
    for (i, pair) in pattern.iter().enumerate() {
        let (x1, y1) = rotate_point(pair.p1, cos_theta, sin_theta, scale, cx, cy);
        let (x2, y2) = rotate_point(pair.p2, cos_theta, sin_theta, scale, cx, cy);

        let v1 = bilinear_sample_luma(&level.image, x1, y1);
        let v2 = bilinear_sample_luma(&level.image, x2, y2);

        if v1 < v2 {
            bytes[i / 8] |= 1 << (i & 7);
        }
    }
    Descriptor(bytes)
}

fn rotate_point(
    (px, py): (f32, f32),
    cos_theta: f32,
    sin_theta: f32,
    scale: f32,
    cx: f32,
    cy: f32,
) -> (f32, f32) {
    let px = px * scale;
    let py = py * scale;
    (
        cos_theta * px - sin_theta * py + cx,
        sin_theta * px + cos_theta * py + cy,
    )
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 7;
        x ^= x >> 9;
        x ^= x << 8;
        self.state = x;
        x
    }

    fn next_f32(&mut self) -> f32 {
        let bits = self.next_u64() >> 40;
        (bits as f32) / (1u64 << 24) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::build_pyramid;
    use image::{GrayImage, Luma};

    fn textured(offset_x: u32, offset_y: u32) -> GrayImage {
        GrayImage::from_fn(96, 96, |x, y| {
            let u = x.wrapping_sub(offset_x) as f32;
            let v = y.wrapping_sub(offset_y) as f32;
            Luma([(128.0 + 60.0 * (u * 0.31).sin() + 50.0 * (v * 0.23 + u * 0.05).cos()) as u8])
        })
    }

    #[test]
    fn same_patch_gives_same_descriptor_after_translation() {
        let orb = OrbDescriptor::new();
        let a = build_pyramid(&textured(0, 0), 1);
        let b = build_pyramid(&textured(5, 3), 1);

        let da = orb.describe(a.base(), Vector2::new(40.0, 40.0));
        let db = orb.describe(b.base(), Vector2::new(45.0, 43.0));
        assert_eq!(da.hamming(&db), 0);

        let elsewhere = orb.describe(a.base(), Vector2::new(60.0, 52.0));
        assert!(da.hamming(&elsewhere) > 20);
    }

    #[test]
    fn pattern_is_deterministic() {
        let first = pattern_cache();
        let regenerated = generate_pattern(ORB_POINTS, DEFAULT_PATCH_RADIUS as f32);
        assert_eq!(first.len(), ORB_POINTS);
        assert!(
            first
                .iter()
                .zip(regenerated.iter())
                .all(|(a, b)| a.p1 == b.p1 && a.p2 == b.p2)
        );
    }
}
