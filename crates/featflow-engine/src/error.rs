use featflow_core::TrackerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Estimator halted after a frame contract violation; send a reset first")]
    Halted,

    #[error("Message channel disconnected")]
    Disconnected,

    #[error("Dispatch worker panicked")]
    WorkerPanicked,
}
