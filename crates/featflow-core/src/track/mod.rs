pub mod config;
pub mod farneback;
pub mod feat_descriptor;
pub mod feat_matcher;
pub mod feature;
pub mod flow;
pub mod health;
pub mod lk;
pub mod mask;
pub mod seed;
pub mod tracker;

pub use config::{DetectorConfig, FarnebackParams, LkParams, OpticalFlowConfig, TrackerConfig};
pub use farneback::{FarnebackFlow, FlowField};
pub use feat_descriptor::{Descriptor, FeatDescriptorExtractor, OrbDescriptor};
pub use feat_matcher::{HammingFeatMatcher, Match};
pub use feature::{Feature, FeatureId};
pub use flow::{FlowBackend, Propagation};
pub use health::{DropReason, TrackHealth, TrackOutcome};
pub use lk::{LKTracker, TrackObservation};
pub use mask::Mask;
pub use seed::{Detector, FeatureGridConfig, FeatureSeed, FeatureSeeder};
pub use tracker::{Tracker, UpdateStats};
