pub mod json;

pub use json::{JsonLinesPosePublisher, PoseRecord};
