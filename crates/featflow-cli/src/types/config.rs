use std::path::Path;

use featflow_core::track::TrackerConfig;
use featflow_engine::{EstimatorConfig, OptimizerConfig, ProcessConfig};
use serde::{Deserialize, Serialize};

use crate::errors::{CliError, Result};

/// Configuration for a replay run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Frame rate used to timestamp the image sequence
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Maximum number of frames to replay
    #[serde(default)]
    pub max_frames: Option<usize>,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    /// Run a background optimizer on this cadence
    #[serde(default)]
    pub optimizer: Option<OptimizerConfig>,
    /// Capacity of the message channel feeding the dispatch worker
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_channel_capacity() -> usize {
    16
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            max_frames: None,
            tracker: TrackerConfig::default(),
            estimator: EstimatorConfig::default(),
            process: ProcessConfig::default(),
            optimizer: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ReplayConfig {
    /// Loads a YAML (`.yaml`/`.yml`) or JSON file and validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: ReplayConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        config.validate()?;
        log::info!("Loaded replay config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate > 0.0) {
            return Err(CliError::InvalidConfig(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.channel_capacity == 0 {
            return Err(CliError::InvalidConfig(
                "channel_capacity must be positive".to_string(),
            ));
        }
        self.tracker
            .validate()
            .map_err(|e| CliError::InvalidConfig(e.to_string()))
    }
}
