use featflow_core::track::{Tracker, TrackerConfig, UpdateStats};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_cross_mut;
use nalgebra::{DMatrix, DVector, Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::messages::Timestamp;

const TRACKED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const RECOVERED_COLOR: Rgb<u8> = Rgb([255, 200, 0]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }
}

/// In-state landmarks handed to a map publisher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapSnapshot {
    pub ids: Vec<u64>,
    pub positions: Vec<Vector3<f64>>,
    pub covariances: Vec<Matrix3<f64>>,
}

impl MapSnapshot {
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn truncate(&mut self, max: usize) {
        self.ids.truncate(max);
        self.positions.truncate(max);
        self.covariances.truncate(max);
    }
}

/// Full filter state plus the accelerometer and gyro calibration blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct FullState {
    pub state: DVector<f64>,
    pub ca: Matrix3<f64>,
    pub cg: Matrix3<f64>,
}

/// The state estimator driven by the dispatch loop.
pub trait Estimator {
    fn visual_meas(&mut self, ts: Timestamp, image: &GrayImage) -> Result<(), EngineError>;
    fn inertial_meas(&mut self, ts: Timestamp, gyro: Vector3<f64>, accel: Vector3<f64>);
    fn pose(&self) -> Pose;
    fn pose_covariance(&self) -> DMatrix<f64>;
    /// At most `max` landmarks currently in the state.
    fn instate_landmarks(&self, max: usize) -> MapSnapshot;
    fn full_state(&self) -> FullState;
    fn canvas(&self) -> Option<&RgbImage>;
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Gyro noise density, rad/s/√Hz.
    pub gyro_noise: f64,
    /// Render the tracked features over each frame.
    pub canvas: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            gyro_noise: 1.7e-4,
            canvas: true,
        }
    }
}

/// Tracking-only estimator: runs the feature tracker on frames and
/// dead-reckons attitude from the gyro. It keeps no 3-D landmarks.
#[derive(Debug)]
pub struct FrontendEstimator {
    config: EstimatorConfig,
    tracker: Tracker,
    rotation: UnitQuaternion<f64>,
    covariance: DMatrix<f64>,
    last_inertial_ts: Option<Timestamp>,
    last_stats: Option<UpdateStats>,
    canvas: Option<RgbImage>,
}

impl FrontendEstimator {
    pub fn new(tracker_config: TrackerConfig, config: EstimatorConfig) -> Result<Self, EngineError> {
        Ok(Self::with_tracker(Tracker::new(tracker_config)?, config))
    }

    pub fn with_tracker(tracker: Tracker, config: EstimatorConfig) -> Self {
        Self {
            config,
            tracker,
            rotation: UnitQuaternion::identity(),
            covariance: DMatrix::zeros(6, 6),
            last_inertial_ts: None,
            last_stats: None,
            canvas: None,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn last_stats(&self) -> Option<&UpdateStats> {
        self.last_stats.as_ref()
    }

    fn render(&mut self, image: &GrayImage) {
        let mut canvas = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        for feature in self.tracker.features() {
            let px = feature.px_uv();
            let color = if feature.recoveries > 0 {
                RECOVERED_COLOR
            } else {
                TRACKED_COLOR
            };
            draw_cross_mut(&mut canvas, color, px.x.round() as i32, px.y.round() as i32);
        }
        self.canvas = Some(canvas);
    }
}

impl Estimator for FrontendEstimator {
    fn visual_meas(&mut self, ts: Timestamp, image: &GrayImage) -> Result<(), EngineError> {
        let stats = self.tracker.update(image)?;
        trace!(ts, active = self.tracker.features().len(), "frame tracked");
        if !stats.destroyed.is_empty() {
            debug!(ts, count = stats.destroyed.len(), "tracks retired");
        }
        self.last_stats = Some(stats);
        if self.config.canvas {
            self.render(image);
        }
        Ok(())
    }

    fn inertial_meas(&mut self, ts: Timestamp, gyro: Vector3<f64>, _accel: Vector3<f64>) {
        if let Some(prev) = self.last_inertial_ts {
            let dt = ts - prev;
            if dt > 0.0 {
                self.rotation *= UnitQuaternion::from_scaled_axis(gyro * dt);
                let growth = self.config.gyro_noise * self.config.gyro_noise * dt;
                for i in 0..3 {
                    self.covariance[(i, i)] += growth;
                }
            }
        }
        self.last_inertial_ts = Some(ts);
    }

    fn pose(&self) -> Pose {
        Pose {
            rotation: self.rotation,
            translation: Vector3::zeros(),
        }
    }

    fn pose_covariance(&self) -> DMatrix<f64> {
        self.covariance.clone()
    }

    fn instate_landmarks(&self, _max: usize) -> MapSnapshot {
        MapSnapshot::default()
    }

    fn full_state(&self) -> FullState {
        let q = self.rotation.quaternion();
        FullState {
            state: DVector::from_vec(vec![q.w, q.i, q.j, q.k, 0.0, 0.0, 0.0]),
            ca: Matrix3::identity(),
            cg: Matrix3::identity(),
        }
    }

    fn canvas(&self) -> Option<&RgbImage> {
        self.canvas.as_ref()
    }

    fn reset(&mut self) {
        self.tracker.reset();
        self.rotation = UnitQuaternion::identity();
        self.covariance = DMatrix::zeros(6, 6);
        self.last_inertial_ts = None;
        self.last_stats = None;
        self.canvas = None;
    }
}
