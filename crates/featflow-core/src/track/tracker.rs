use image::GrayImage;
use tracing::{debug, debug_span, trace};

use crate::error::{Result, TrackerError};
use crate::img::Pyramid;
use crate::track::config::TrackerConfig;
use crate::track::feat_descriptor::{Descriptor, FeatDescriptorExtractor, OrbDescriptor};
use crate::track::feat_matcher::HammingFeatMatcher;
use crate::track::feature::{DroppedFeature, Feature, FeatureId, IdAllocator};
use crate::track::flow::FlowBackend;
use crate::track::health::TrackHealth;
use crate::track::mask::Mask;
use crate::track::seed::{Detector, FeatureSeeder};

/// Per-frame bookkeeping returned by [`Tracker::update`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateStats {
    pub frame: u64,
    /// Active features that survived propagation.
    pub tracked: usize,
    /// Features moved to the recovery pool this frame.
    pub dropped: usize,
    /// Detections that took over a dropped identity.
    pub recovered: usize,
    /// Detections given a fresh identity.
    pub created: usize,
    /// Identities retired for good at the end of this frame.
    pub destroyed: Vec<FeatureId>,
}

/// Maintains the live set of 2-D feature tracks across an image stream.
///
/// Each [`update`](Self::update) propagates the active features with the
/// configured flow backend, drops the ones that fail, and replenishes the
/// set with masked detections. A detection whose descriptor matches a
/// recently dropped feature inherits that feature's identity.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    backend: FlowBackend,
    detector: Detector,
    extractor: OrbDescriptor,
    matcher: HammingFeatMatcher,
    mask: Option<Mask>,
    dimensions: Option<(u32, u32)>,
    active: Vec<Feature>,
    dropped: Vec<DroppedFeature>,
    ids: IdAllocator,
    frame_index: u64,
    poisoned: bool,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let backend = FlowBackend::from_config(&config.optical_flow)?;
        let detector = Detector::from_config(&config.detector);
        let matcher = HammingFeatMatcher::new(config.descriptor_distance_thresh);
        debug!(backend = backend.name(), "tracker created");
        Ok(Self {
            config,
            backend,
            detector,
            extractor: OrbDescriptor::new(),
            matcher,
            mask: None,
            dimensions: None,
            active: Vec::new(),
            dropped: Vec::new(),
            ids: IdAllocator::new(),
            frame_index: 0,
            poisoned: false,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Active features after the last update.
    pub fn features(&self) -> &[Feature] {
        &self.active
    }

    /// Number of features waiting in the recovery pool.
    pub fn dropped_len(&self) -> usize {
        self.dropped.len()
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.dimensions.is_some()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Frames processed successfully so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn ids_issued(&self) -> u64 {
        self.ids.issued()
    }

    /// Drops all features and propagation state; the next update initializes
    /// again. Identifiers keep counting from where they were.
    pub fn reset(&mut self) {
        debug!(
            active = self.active.len(),
            dropped = self.dropped.len(),
            "tracker reset"
        );
        self.active.clear();
        self.dropped.clear();
        self.backend.clear();
        self.mask = None;
        self.dimensions = None;
        self.poisoned = false;
    }

    pub fn update(&mut self, image: &GrayImage) -> Result<UpdateStats> {
        if self.poisoned {
            return Err(TrackerError::Poisoned);
        }
        let frame = self.frame_index;
        let _span = debug_span!("tracker_update", frame).entered();

        let stats = match self.dimensions {
            None => self.initialize(image, frame),
            Some(expected) => {
                let actual = image.dimensions();
                if actual != expected {
                    self.poisoned = true;
                    return Err(TrackerError::DimensionMismatch { expected, actual });
                }
                Ok(self.track(image, frame))
            }
        }?;

        self.frame_index += 1;
        debug!(
            tracked = stats.tracked,
            dropped = stats.dropped,
            recovered = stats.recovered,
            created = stats.created,
            destroyed = stats.destroyed.len(),
            active = self.active.len(),
            "frame processed"
        );
        Ok(stats)
    }

    fn initialize(&mut self, image: &GrayImage, frame: u64) -> Result<UpdateStats> {
        let (width, height) = image.dimensions();
        let margin = self.config.margin;
        let Some(mut mask) = Mask::new(width, height, margin) else {
            self.poisoned = true;
            return Err(TrackerError::ImageTooSmall {
                width,
                height,
                margin,
            });
        };
        mask.reset();
        self.mask = Some(mask);
        self.dimensions = Some((width, height));

        let pyramid = self.backend.build_frame(image);
        let mut stats = UpdateStats {
            frame,
            ..UpdateStats::default()
        };
        self.detect(&pyramid, self.config.num_features_max, frame, &mut stats);
        self.backend.advance(pyramid);
        Ok(stats)
    }

    fn track(&mut self, image: &GrayImage, frame: u64) -> UpdateStats {
        let mut stats = UpdateStats {
            frame,
            ..UpdateStats::default()
        };
        let pyramid = self.backend.build_frame(image);
        let propagations = self.backend.propagate(&self.active, &pyramid);
        let limit = self.backend.displacement_limit(&self.config);
        let refresh = self.config.extract_descriptor && self.config.match_dropped_tracks;

        let previous = std::mem::take(&mut self.active);
        for (mut feature, propagation) in previous.into_iter().zip(propagations) {
            let health = TrackHealth::evaluate(
                propagation.previous,
                propagation.propagated,
                propagation.outcome,
                limit,
            );
            match health.drop_reason {
                None => {
                    feature.advance(propagation.propagated, frame);
                    self.active.push(feature);
                    stats.tracked += 1;
                }
                Some(reason) => {
                    trace!(
                        id = %feature.id(),
                        ?reason,
                        displacement = health.displacement,
                        "feature dropped"
                    );
                    if refresh {
                        if let Some(prev) = self.backend.previous() {
                            let descriptor = self.extractor.describe(prev.base(), propagation.previous);
                            feature.set_descriptor(Some(descriptor));
                        }
                    }
                    self.dropped.push(DroppedFeature {
                        feature,
                        dropped_frame: frame,
                    });
                    stats.dropped += 1;
                }
            }
        }

        if let Some(mask) = self.mask.as_mut() {
            mask.reset();
            for feature in &self.active {
                let px = feature.px_uv();
                mask.mask_out(px.x, px.y, self.config.mask_size);
            }
        }

        if self.active.len() < self.config.num_features_min {
            let count = self.config.num_features_max - self.active.len();
            self.detect(&pyramid, count, frame, &mut stats);
        }

        self.backend.advance(pyramid);
        stats.destroyed = self.expire_dropped(frame);
        stats
    }

    /// Accepts up to `count` unmasked detections from the base level, reusing
    /// dropped identities where the descriptor matches.
    fn detect(&mut self, pyramid: &Pyramid, count: usize, frame: u64, stats: &mut UpdateStats) {
        let _span = debug_span!("detect", count).entered();
        let Some(mut mask) = self.mask.take() else {
            return;
        };

        let base = pyramid.base();
        let seeds = self.detector.seed(base);
        let candidates = seeds.len();
        let mut accepted = 0usize;

        for seed in seeds {
            if accepted >= count {
                break;
            }
            let px = seed.px_uv;
            if !mask.is_valid(px.x, px.y) {
                continue;
            }

            let descriptor = self
                .config
                .extract_descriptor
                .then(|| self.extractor.describe(base, px));

            let recovered = match descriptor.as_ref() {
                Some(descriptor) if self.config.match_dropped_tracks => {
                    self.find_match_in_dropped_tracks(descriptor)
                }
                _ => None,
            };

            match (recovered, descriptor) {
                (Some(mut feature), Some(descriptor)) => {
                    trace!(id = %feature.id(), x = px.x, y = px.y, "identity recovered");
                    feature.recover(px, descriptor, frame);
                    self.active.push(feature);
                    stats.recovered += 1;
                }
                (_, descriptor) => {
                    let id = self.ids.allocate();
                    self.active.push(Feature::new(id, px, descriptor, frame));
                    stats.created += 1;
                }
            }

            mask.mask_out(px.x, px.y, self.config.mask_size);
            accepted += 1;
        }

        trace!(candidates, accepted, "detection pass");
        self.mask = Some(mask);
    }

    /// Removes and returns the pooled feature closest to `descriptor`, if it
    /// lies strictly under the distance threshold.
    fn find_match_in_dropped_tracks(&mut self, descriptor: &Descriptor) -> Option<Feature> {
        let train = self.dropped.iter().map(|d| d.feature.descriptor());
        let best = self.matcher.best_match(descriptor, train)?;
        Some(self.dropped.remove(best.train_idx).feature)
    }

    fn expire_dropped(&mut self, frame: u64) -> Vec<FeatureId> {
        let ttl = self.config.dropped_track_ttl;
        let mut destroyed = Vec::new();
        self.dropped.retain(|entry| {
            let keep = frame - entry.dropped_frame < ttl;
            if !keep {
                destroyed.push(entry.feature.id());
            }
            keep
        });
        destroyed
    }
}
