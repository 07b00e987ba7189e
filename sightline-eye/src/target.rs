//! Target info returned to the control loop

use crate::error::{Result, VisionError};
use crate::homography::HomographyMapper;
use crate::object::DetectedObject;
use sightline_core::{Point, Rect};
use std::cmp::Ordering;
use std::fmt;

/// Where a target sits on the floor relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundLocation {
    /// Offset on the ground plane in world units (x right, y forward)
    pub offset: Point,
    /// Bearing in degrees, 0 straight ahead, positive to the right
    pub bearing: f64,
    /// Planar distance from the camera in world units
    pub distance: f64,
}

impl GroundLocation {
    fn from_offset(offset: Point) -> Self {
        Self {
            offset,
            bearing: offset.x.atan2(offset.y).to_degrees(),
            distance: offset.x.hypot(offset.y),
        }
    }
}

/// A detected object plus whatever localization could be derived for it.
pub struct TargetInfo<O> {
    pub detected: DetectedObject<O>,
    pub rect: Rect,
    pub area: f64,
    /// Rect centre minus image centre, in pixels
    pub distance_from_image_center: Point,
    /// Present only when a ground-plane mapper is configured
    pub location: Option<GroundLocation>,
}

impl<O> TargetInfo<O> {
    /// Geometry-only target, used when no mapper is configured.
    pub fn new(detected: DetectedObject<O>, image_width: u32, image_height: u32) -> Self {
        let rect = detected.rect();
        let center = rect.center();
        Self {
            rect,
            area: detected.area(),
            distance_from_image_center: Point::new(
                center.x - image_width as f64 / 2.0,
                center.y - image_height as f64 / 2.0,
            ),
            location: None,
            detected,
        }
    }

    /// Target localized on the ground plane.
    ///
    /// The bottom centre of the rect is mapped through `mapper`. An object
    /// whose reference point sits `object_height_offset` above the floor
    /// maps to a spot behind its real position along the camera ray, so the
    /// offset is scaled by `(camera_height - object_height_offset) /
    /// camera_height`. A negative offset (reference point below the floor
    /// plane) scales it outward. Zero leaves the mapped point as is.
    pub fn localized(
        detected: DetectedObject<O>,
        image_width: u32,
        image_height: u32,
        mapper: &HomographyMapper,
        object_height_offset: f64,
        camera_height: f64,
    ) -> Result<Self> {
        let mut target = Self::new(detected, image_width, image_height);
        let mut offset = mapper.map_point(target.rect.bottom_center()).ok_or_else(|| {
            VisionError::Processing(format!(
                "target {} is at or above the horizon",
                target.rect
            ))
        })?;

        if object_height_offset != 0.0 {
            if !(object_height_offset.is_finite()
                && camera_height.is_finite()
                && camera_height > 0.0
                && camera_height > object_height_offset)
            {
                return Err(VisionError::Processing(format!(
                    "object height offset {} needs a positive camera height above it, got {}",
                    object_height_offset, camera_height
                )));
            }
            let scale = (camera_height - object_height_offset) / camera_height;
            offset = Point::new(offset.x * scale, offset.y * scale);
        }

        target.location = Some(GroundLocation::from_offset(offset));
        Ok(target)
    }
}

impl<O> Clone for TargetInfo<O> {
    fn clone(&self) -> Self {
        Self {
            detected: self.detected.clone(),
            rect: self.rect,
            area: self.area,
            distance_from_image_center: self.distance_from_image_center,
            location: self.location,
        }
    }
}

impl<O> fmt::Debug for TargetInfo<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetInfo")
            .field("rect", &self.rect)
            .field("area", &self.area)
            .field("distance_from_image_center", &self.distance_from_image_center)
            .field("location", &self.location)
            .finish()
    }
}

impl<O> fmt::Display for TargetInfo<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect={},area={:.1},fromCenter={}",
            self.rect, self.area, self.distance_from_image_center
        )?;
        if let Some(location) = &self.location {
            write!(
                f,
                ",groundOffset={},bearing={:.1},distance={:.3}",
                location.offset, location.bearing, location.distance
            )?;
        }
        Ok(())
    }
}

/// Largest area first.
pub fn by_area_descending<O>(a: &TargetInfo<O>, b: &TargetInfo<O>) -> Ordering {
    b.area.total_cmp(&a.area)
}

/// Nearest first; targets without a ground location sort last.
pub fn by_distance_ascending<O>(a: &TargetInfo<O>, b: &TargetInfo<O>) -> Ordering {
    let da = a.location.map_or(f64::INFINITY, |l| l.distance);
    let db = b.location.map_or(f64::INFINITY, |l| l.distance);
    da.total_cmp(&db)
}

/// Most nearly straight ahead first; unlocalized targets fall back to their
/// horizontal pixel offset from the image centre.
pub fn by_bearing_abs_ascending<O>(a: &TargetInfo<O>, b: &TargetInfo<O>) -> Ordering {
    fn key<O>(t: &TargetInfo<O>) -> f64 {
        t.location
            .map_or(t.distance_from_image_center.x.abs(), |l| l.bearing.abs())
    }
    key(a).total_cmp(&key(b))
}
