pub mod error;
pub mod estimator;
pub mod messages;
pub mod optimizer;
pub mod process;
pub mod publisher;
pub mod queue;

pub use error::EngineError;
pub use estimator::{Estimator, EstimatorConfig, FrontendEstimator, FullState, MapSnapshot, Pose};
pub use messages::{ControlCommand, EstimatorMessage, InertialMeas, MessageKind, Timestamp, VisualMeas};
pub use optimizer::{NullOptimizer, Optimizer, OptimizerConfig, OptimizerWorker};
pub use process::{
    DrainReport, EstimatorProcess, Flow, ProcessConfig, ProcessWorker, Publishers, WorkerExit,
    spawn_process,
};
pub use publisher::{
    CanvasPublisher, ChannelPublisher, FullStatePublisher, MapPublisher, Output, PosePublisher,
    PublishError, channel_publisher,
};
pub use queue::MessageQueue;
