use thiserror::Error;

/// Failures surfaced by [`crate::track::Tracker`].
///
/// Per-feature tracking losses are not errors; they show up in
/// [`crate::track::UpdateStats`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("Invalid tracker configuration: {0}")]
    InvalidConfig(String),

    #[error("Image {width}x{height} leaves no interior region with a {margin}px margin")]
    ImageTooSmall { width: u32, height: u32, margin: u32 },

    #[error("Image dimensions changed from {expected:?} to {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Tracker rejected an earlier frame and must be reset before further updates")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, TrackerError>;
