pub mod errors;
pub mod imu;
pub mod output;
pub mod replay;
pub mod sequence;
pub mod types;

pub use errors::{CliError, Result};
pub use replay::{Replay, ReplaySummary};
pub use types::ReplayConfig;
