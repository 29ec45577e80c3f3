use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::track::seed::{FastSeederConfig, ShiTomasiGridConfig};

/// Pyramidal Lucas-Kanade parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LkParams {
    /// Side of the square integration window, in pixels.
    pub win_size: usize,
    /// Index of the coarsest pyramid level; the pyramid holds `max_level + 1` levels.
    pub max_level: usize,
    pub max_iter: usize,
    /// Convergence tolerance on the per-iteration update, in pixels.
    pub eps: f32,
}

impl Default for LkParams {
    fn default() -> Self {
        Self {
            win_size: 15,
            max_level: 3,
            max_iter: 30,
            eps: 0.01,
        }
    }
}

/// Farneback dense optical flow parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarnebackParams {
    pub num_levels: usize,
    /// Ratio between consecutive pyramid levels, in (0, 1).
    pub pyr_scale: f32,
    /// Side of the averaging window used by the displacement solve.
    pub win_size: usize,
    pub num_iter: usize,
    /// Side of the neighbourhood used for polynomial expansion (5 or 7 typical).
    pub poly_n: usize,
    pub poly_sigma: f32,
    /// Seed each solve with the flow field from the previous frame.
    pub use_initial_flow: bool,
    /// Gaussian instead of box weighting in the displacement solve.
    pub gaussian_window: bool,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            num_levels: 3,
            pyr_scale: 0.5,
            win_size: 15,
            num_iter: 3,
            poly_n: 5,
            poly_sigma: 1.1,
            use_initial_flow: false,
            gaussian_window: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpticalFlowConfig {
    LucasKanade(LkParams),
    Farneback(FarnebackParams),
}

impl Default for OpticalFlowConfig {
    fn default() -> Self {
        Self::LucasKanade(LkParams::default())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorConfig {
    Fast(FastSeederConfig),
    ShiTomasi(ShiTomasiGridConfig),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::Fast(FastSeederConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub optical_flow: OpticalFlowConfig,
    pub detector: DetectorConfig,
    /// Detection is triggered once the active count drops below this.
    pub num_features_min: usize,
    pub num_features_max: usize,
    /// Side of the exclusion box stamped around every feature.
    pub mask_size: u32,
    /// Border band, in pixels, where no feature may be detected.
    pub margin: u32,
    /// Pyramidal LK tracks moving further than this are dropped.
    pub max_pixel_displacement: f32,
    pub extract_descriptor: bool,
    pub match_dropped_tracks: bool,
    /// Hamming distance a recovered match must stay strictly below.
    pub descriptor_distance_thresh: u32,
    /// Frames an unrecovered dropped track stays in the recovery pool after the frame that lost it.
    pub dropped_track_ttl: u64,
    /// Apply `max_pixel_displacement` to the dense backend as well.
    pub dense_displacement_veto: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            optical_flow: OpticalFlowConfig::default(),
            detector: DetectorConfig::default(),
            num_features_min: 40,
            num_features_max: 80,
            mask_size: 15,
            margin: 8,
            max_pixel_displacement: 64.0,
            extract_descriptor: true,
            match_dropped_tracks: true,
            descriptor_distance_thresh: 40,
            dropped_track_ttl: 0,
            dense_displacement_veto: false,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        match &self.optical_flow {
            OpticalFlowConfig::LucasKanade(lk) => {
                if lk.win_size < 3 {
                    return invalid(format!("lk win_size must be at least 3, got {}", lk.win_size));
                }
                if lk.max_iter == 0 {
                    return invalid("lk max_iter must be positive".to_string());
                }
                if !(lk.eps > 0.0) {
                    return invalid(format!("lk eps must be positive, got {}", lk.eps));
                }
            }
            OpticalFlowConfig::Farneback(fb) => {
                if fb.num_levels == 0 {
                    return invalid("farneback num_levels must be positive".to_string());
                }
                if !(fb.pyr_scale > 0.0 && fb.pyr_scale < 1.0) {
                    return invalid(format!(
                        "farneback pyr_scale must lie in (0, 1), got {}",
                        fb.pyr_scale
                    ));
                }
                if fb.win_size == 0 || fb.num_iter == 0 {
                    return invalid("farneback win_size and num_iter must be positive".to_string());
                }
                if fb.poly_n < 3 || !(fb.poly_sigma > 0.0) {
                    return invalid(format!(
                        "farneback poly_n must be at least 3 and poly_sigma positive, got {} / {}",
                        fb.poly_n, fb.poly_sigma
                    ));
                }
            }
        }

        if self.num_features_max == 0 {
            return invalid("num_features_max must be positive".to_string());
        }
        if self.num_features_min > self.num_features_max {
            return invalid(format!(
                "num_features_min ({}) exceeds num_features_max ({})",
                self.num_features_min, self.num_features_max
            ));
        }
        if self.mask_size == 0 {
            return invalid("mask_size must be positive".to_string());
        }
        if !(self.max_pixel_displacement > 0.0) {
            return invalid(format!(
                "max_pixel_displacement must be positive, got {}",
                self.max_pixel_displacement
            ));
        }
        Ok(())
    }
}

fn invalid(message: String) -> Result<()> {
    Err(TrackerError::InvalidConfig(message))
}
