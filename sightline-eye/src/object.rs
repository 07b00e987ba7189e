//! Detected object contract

use sightline_core::Rect;
use std::fmt;
use std::sync::Arc;

/// Minimal shape contract every detection payload must satisfy.
pub trait ObjectGeometry {
    /// Bounding rectangle of the object in image pixels
    fn rect(&self) -> Rect;

    /// Area of the object in square pixels. Defaults to the rect area;
    /// contour based payloads report their real area instead.
    fn area(&self) -> f64 {
        self.rect().area()
    }
}

/// One detection: the algorithm specific payload plus the geometry derived
/// from it when the detection was produced.
pub struct DetectedObject<O> {
    object: Arc<O>,
    rect: Rect,
    area: f64,
}

/// One frame worth of detections, published as a unit.
pub type Detections<O> = Arc<[DetectedObject<O>]>;

impl<O: ObjectGeometry> DetectedObject<O> {
    pub fn new(object: O) -> Self {
        let rect = object.rect();
        let area = object.area();
        // Negative and NaN areas from a misbehaving payload collapse to zero.
        let area = if area.is_finite() && area > 0.0 { area } else { 0.0 };
        Self {
            object: Arc::new(object),
            rect,
            area,
        }
    }
}

impl<O> DetectedObject<O> {
    /// The algorithm specific payload
    pub fn object(&self) -> &O {
        &self.object
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn area(&self) -> f64 {
        self.area
    }
}

impl<O> Clone for DetectedObject<O> {
    fn clone(&self) -> Self {
        Self {
            object: Arc::clone(&self.object),
            rect: self.rect,
            area: self.area,
        }
    }
}

impl<O> ObjectGeometry for DetectedObject<O> {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn area(&self) -> f64 {
        self.area
    }
}

impl<O> fmt::Debug for DetectedObject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectedObject")
            .field("rect", &self.rect)
            .field("area", &self.area)
            .finish()
    }
}

impl<O> fmt::Display for DetectedObject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rect={},area={:.1}", self.rect, self.area)
    }
}

/// Collect payloads into a frame snapshot.
pub fn detections_from<O, I>(objects: I) -> Detections<O>
where
    O: ObjectGeometry,
    I: IntoIterator<Item = O>,
{
    objects.into_iter().map(DetectedObject::new).collect()
}
