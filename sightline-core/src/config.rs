//! Detector configuration

use crate::error::{Error, Result};
use crate::types::Quad;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Camera/world correspondence used to build the ground-plane mapper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Calibration rectangle as seen by the camera, in pixels
    pub camera: Quad,
    /// The same rectangle on the floor, in world units relative to the robot
    pub world: Quad,
}

/// Configuration for one detector instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Instance name, used in log spans
    pub name: String,
    /// Camera image width in pixels
    pub image_width: u32,
    /// Camera image height in pixels
    pub image_height: u32,
    /// Number of pre-allocated frame buffers the vision task rotates through
    pub num_image_buffers: usize,
    /// Delay between processing cycles in msec (0 = back-to-back)
    pub processing_interval_ms: u64,
    /// Optional ground-plane calibration; absent means geometry-only targets
    pub calibration: Option<CalibrationConfig>,
    /// Log every target returned from a target query
    pub trace_targets: bool,
    /// Periodically log processing performance
    pub perf_report: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            name: "detector".to_string(),
            image_width: 640,
            image_height: 480,
            num_image_buffers: 2,
            processing_interval_ms: 0,
            calibration: None,
            trace_targets: false,
            perf_report: false,
        }
    }
}

impl DetectorConfig {
    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }

    /// Load configuration from a JSON or TOML string, validating the result
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config = match serde_json::from_str::<DetectorConfig>(content) {
            Ok(config) => config,
            Err(_) => toml::from_str::<DetectorConfig>(content)
                .map_err(|e| Error::Deserialization(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("name must not be empty".to_string()));
        }

        if self.image_width == 0 || self.image_height == 0 {
            return Err(Error::Configuration("Image size must be non-zero".to_string()));
        }

        if self.image_width > 7680 || self.image_height > 4320 {
            return Err(Error::Configuration("Image size too large (max 8K)".to_string()));
        }

        if self.num_image_buffers == 0 || self.num_image_buffers > 16 {
            return Err(Error::Configuration(
                "num_image_buffers must be between 1 and 16".to_string(),
            ));
        }

        if let Some(calibration) = &self.calibration {
            if !calibration.camera.is_finite() || !calibration.world.is_finite() {
                return Err(Error::Configuration(
                    "Calibration corners must be finite".to_string(),
                ));
            }
        }

        Ok(())
    }
}
