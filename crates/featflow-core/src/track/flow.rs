use nalgebra::Vector2;
use rayon::prelude::*;
use tracing::debug_span;

use crate::error::Result;
use crate::img::{Pyramid, build_pyramid};
use crate::track::config::{OpticalFlowConfig, TrackerConfig};
use crate::track::farneback::{FarnebackFlow, FlowField};
use crate::track::feature::Feature;
use crate::track::health::TrackOutcome;
use crate::track::lk::LKTracker;

use image::GrayImage;

/// Where one active feature landed in the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Propagation {
    pub previous: Vector2<f32>,
    pub propagated: Vector2<f32>,
    pub outcome: TrackOutcome,
}

/// Frame-to-frame propagation state, tagged by backend.
#[derive(Debug, Clone)]
pub enum FlowBackend {
    PyramidalLk {
        tracker: LKTracker,
        prev_pyramid: Option<Pyramid>,
    },
    Dense {
        flow: FarnebackFlow,
        /// Single-level pyramid of the previous frame.
        prev_image: Option<Pyramid>,
        /// Allocated on the first propagation.
        field: Option<FlowField>,
    },
}

impl FlowBackend {
    pub fn from_config(config: &OpticalFlowConfig) -> Result<Self> {
        Ok(match config {
            OpticalFlowConfig::LucasKanade(params) => Self::PyramidalLk {
                tracker: LKTracker::new(*params),
                prev_pyramid: None,
            },
            OpticalFlowConfig::Farneback(params) => Self::Dense {
                flow: FarnebackFlow::new(*params)?,
                prev_image: None,
                field: None,
            },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PyramidalLk { .. } => "pyramidal_lk",
            Self::Dense { .. } => "dense",
        }
    }

    /// Builds the pyramid this backend propagates over.
    pub fn build_frame(&self, image: &GrayImage) -> Pyramid {
        match self {
            Self::PyramidalLk { tracker, .. } => build_pyramid(image, tracker.params().max_level + 1),
            Self::Dense { .. } => build_pyramid(image, 1),
        }
    }

    /// Displacement limit applied to kept tracks, if any.
    pub fn displacement_limit(&self, config: &TrackerConfig) -> Option<f32> {
        match self {
            Self::PyramidalLk { .. } => Some(config.max_pixel_displacement),
            Self::Dense { .. } if config.dense_displacement_veto => Some(config.max_pixel_displacement),
            Self::Dense { .. } => None,
        }
    }

    pub fn previous(&self) -> Option<&Pyramid> {
        match self {
            Self::PyramidalLk { prev_pyramid, .. } => prev_pyramid.as_ref(),
            Self::Dense { prev_image, .. } => prev_image.as_ref(),
        }
    }

    /// Makes `frame` the reference for the next propagation.
    pub fn advance(&mut self, frame: Pyramid) {
        match self {
            Self::PyramidalLk { prev_pyramid, .. } => *prev_pyramid = Some(frame),
            Self::Dense { prev_image, .. } => *prev_image = Some(frame),
        }
    }

    /// Forgets the reference frame and any cached flow.
    pub fn clear(&mut self) {
        match self {
            Self::PyramidalLk { prev_pyramid, .. } => *prev_pyramid = None,
            Self::Dense {
                prev_image, field, ..
            } => {
                *prev_image = None;
                *field = None;
            }
        }
    }

    /// Propagates every feature from the reference frame into `frame`.
    ///
    /// The result is index-aligned with `features`. Without a reference frame
    /// every feature is reported as diverged.
    pub fn propagate(&mut self, features: &[Feature], frame: &Pyramid) -> Vec<Propagation> {
        let _span = debug_span!("propagate", backend = self.name(), features = features.len()).entered();

        match self {
            Self::PyramidalLk {
                tracker,
                prev_pyramid,
            } => {
                let Some(prev) = prev_pyramid.as_ref() else {
                    return diverged(features);
                };
                features
                    .par_iter()
                    .map(|feature| {
                        let obs = tracker.track(prev, frame, feature.px_uv());
                        Propagation {
                            previous: feature.px_uv(),
                            propagated: obs.refined_px_uv,
                            outcome: obs.outcome,
                        }
                    })
                    .collect()
            }
            Self::Dense {
                flow,
                prev_image,
                field,
            } => {
                let Some(prev) = prev_image.as_ref() else {
                    return diverged(features);
                };
                let curr = &frame.base().image;
                let (width, height) = curr.dimensions();
                let field = field.get_or_insert_with(|| FlowField::zeros(width as usize, height as usize));
                flow.compute(&prev.base().image, curr, field);

                features
                    .iter()
                    .map(|feature| {
                        let previous = feature.px_uv();
                        let propagated = previous + field.sample(previous.x, previous.y);
                        let inside = propagated.x >= 0.0
                            && propagated.y >= 0.0
                            && propagated.x <= width as f32 - 1.0
                            && propagated.y <= height as f32 - 1.0;
                        Propagation {
                            previous,
                            propagated,
                            outcome: if inside {
                                TrackOutcome::Converged
                            } else {
                                TrackOutcome::OutOfBounds
                            },
                        }
                    })
                    .collect()
            }
        }
    }
}

fn diverged(features: &[Feature]) -> Vec<Propagation> {
    features
        .iter()
        .map(|feature| Propagation {
            previous: feature.px_uv(),
            propagated: feature.px_uv(),
            outcome: TrackOutcome::Diverged,
        })
        .collect()
}
