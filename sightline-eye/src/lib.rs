//! sightline-eye: object detection orchestration for robot control loops
//!
//! A [`Detector`] holds at most one active detection [`Pipeline`], lets a
//! [`Scheduler`] (normally a [`VisionTask`]) run it on incoming frames, and
//! turns the latest detections into [`TargetInfo`]s for the control loop.
//! When the camera is calibrated against the floor, targets are also
//! localized on the ground plane through a [`HomographyMapper`].

pub mod detector;
pub mod error;
pub mod homography;
pub mod object;
pub mod pipeline;
pub mod processor;
pub mod target;
pub mod task;

pub use detector::{Detector, TargetComparator, TargetFilter};
pub use error::{Result, VisionError};
pub use homography::HomographyMapper;
pub use object::{detections_from, DetectedObject, Detections, ObjectGeometry};
pub use pipeline::{shared, Frame, Pipeline, SharedPipeline};
pub use processor::{
    draw_detections, FrameProcessor, ProcessedFrame, VideoSource, VisionProcessor,
};
pub use target::{
    by_area_descending, by_bearing_abs_ascending, by_distance_ascending, GroundLocation,
    TargetInfo,
};
pub use task::{Scheduler, VisionTask};

pub use sightline_core::{CalibrationConfig, DetectorConfig, Point, Quad, Rect};
