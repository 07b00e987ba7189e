//! Detector construction from configuration files

use sightline_core::{DetectorConfig, Point};
use sightline_eye::{Detector, Detections, ObjectGeometry, Rect, Scheduler};
use std::io::Write;
use std::time::Duration;

struct Blob(Rect);

impl ObjectGeometry for Blob {
    fn rect(&self) -> Rect {
        self.0
    }
}

/// Scheduler that never runs anything.
struct Idle;

impl Scheduler<Blob> for Idle {
    fn set_task_enabled(&self, _enabled: bool) {}

    fn is_task_enabled(&self) -> bool {
        false
    }

    fn set_processing_interval(&self, _interval: Duration) {}

    fn processing_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn set_video_out_enabled(&self, _step: Option<usize>, _annotate: bool) {}

    fn set_perf_report_enabled(&self, _enabled: bool) {}

    fn detected_objects(&self) -> Option<Detections<Blob>> {
        None
    }
}

const FRONT_CAMERA: &str = r#"
name = "front"
image_width = 100
image_height = 100
processing_interval_ms = 20
trace_targets = true

[calibration.camera]
top_left = { x = 40.0, y = 50.0 }
top_right = { x = 60.0, y = 50.0 }
bottom_left = { x = 0.0, y = 100.0 }
bottom_right = { x = 100.0, y = 100.0 }

[calibration.world]
top_left = { x = -10.0, y = 40.0 }
top_right = { x = 10.0, y = 40.0 }
bottom_left = { x = -10.0, y = 10.0 }
bottom_right = { x = 10.0, y = 10.0 }
"#;

#[test]
fn test_detector_from_toml_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(FRONT_CAMERA.as_bytes())?;

    let config = DetectorConfig::from_file(file.path())?;
    assert_eq!(config.name, "front");
    assert_eq!(config.processing_interval(), Duration::from_millis(20));
    assert_eq!(config.num_image_buffers, 2);

    let detector = Detector::<Blob>::new(config, |_| Ok(Idle))?;
    let mapper = detector.homography_mapper().expect("calibrated");
    let mapped = mapper.map_point(Point::new(100.0, 100.0)).expect("below horizon");
    assert!(mapped.distance_to(&Point::new(10.0, 10.0)) < 1e-6);
    assert!(detector.get_targets(None, None, 0.0, 0.0).is_empty());
    Ok(())
}

#[test]
fn test_json_and_toml_agree() -> anyhow::Result<()> {
    let from_toml = DetectorConfig::from_str(FRONT_CAMERA)?;
    let json = serde_json::to_string(&from_toml)?;
    let from_json = DetectorConfig::from_str(&json)?;
    assert_eq!(from_toml, from_json);
    assert!(from_json.trace_targets);
    Ok(())
}

#[test]
fn test_uncalibrated_detector() -> anyhow::Result<()> {
    let config = DetectorConfig::from_str(r#"{"name": "rear"}"#)?;
    assert_eq!(config.image_width, 640);
    let detector = Detector::<Blob>::new(config, |_| Ok(Idle))?;
    assert!(detector.homography_mapper().is_none());
    assert_eq!(detector.to_string(), "rear");
    Ok(())
}

#[test]
fn test_bad_files_rejected() {
    assert!(DetectorConfig::from_str("image_width = \"wide\"").is_err());
    assert!(DetectorConfig::from_str("num_image_buffers = 0").is_err());
    assert!(DetectorConfig::from_file("/nonexistent/sightline.toml").is_err());
}
