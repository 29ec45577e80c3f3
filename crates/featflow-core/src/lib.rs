pub mod error;
pub mod img;
pub mod track;

pub use error::TrackerError;
