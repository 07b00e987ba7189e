//! Error types for sightline-eye

use sightline_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Core(inner) => inner,
            VisionError::Config(msg) => CoreError::Configuration(msg),
            VisionError::Calibration(msg) => CoreError::Geometry(msg),
            other => CoreError::Configuration(format!("Vision error: {}", other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
