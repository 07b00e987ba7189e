//! sightline-core: shared types for the sightline vision workspace
//!
//! Pixel/world geometry primitives, the workspace error type, and the
//! detector configuration that the vision crate is built from.

pub mod types;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use types::{Point, Quad, Rect};
pub use config::{CalibrationConfig, DetectorConfig};
