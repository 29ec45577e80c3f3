use featflow_engine::EngineError;
use thiserror::Error;

/// Errors that can occur while replaying a recorded sequence
#[derive(Debug, Error)]
pub enum CliError {
    #[error("IMU file format error at line {line}: {message}")]
    ImuFormat { line: usize, message: String },

    #[error("IMU file not found: {0}")]
    ImuFileNotFound(String),

    #[error("No frames found in {0}")]
    EmptySequence(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
