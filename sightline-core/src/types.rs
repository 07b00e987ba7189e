use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle in image pixels. `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Midpoint of the bottom edge, where an object standing on the floor
    /// touches the ground in the image.
    pub fn bottom_center(&self) -> Point {
        Point::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}, {}x{}}}", self.x, self.y, self.width, self.height)
    }
}

/// 2D point. Used for both image pixels and world (ground-plane) units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Four corners of a (possibly perspective-distorted) rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl Quad {
    pub fn new(top_left: Point, top_right: Point, bottom_left: Point, bottom_right: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        }
    }

    /// Corners in TL, TR, BL, BR order.
    pub fn corners(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_left, self.bottom_right]
    }

    pub fn is_finite(&self) -> bool {
        self.corners().iter().all(Point::is_finite)
    }

    /// Shoelace area of the TL → TR → BR → BL polygon.
    pub fn area(&self) -> f64 {
        let ring = [self.top_left, self.top_right, self.bottom_right, self.bottom_left];
        let twice: f64 = (0..4)
            .map(|i| {
                let a = ring[i];
                let b = ring[(i + 1) % 4];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_geometry() {
        let rect = Rect::new(10, 20, 40, 30);
        assert_eq!(rect.area(), 1200.0);
        assert_eq!(rect.center(), Point::new(30.0, 35.0));
        assert_eq!(rect.bottom_center(), Point::new(30.0, 50.0));
        assert!(!rect.is_empty());
        assert!(Rect::new(0, 0, 0, 5).is_empty());
    }

    #[test]
    fn test_rect_display() {
        assert_eq!(Rect::new(1, 2, 3, 4).to_string(), "{1, 2, 3x4}");
    }

    #[test]
    fn test_quad_area() {
        let quad = Quad::new(
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(0.0, 3.0),
            Point::new(4.0, 3.0),
        );
        assert!((quad.area() - 12.0).abs() < 1e-12);
        assert!(quad.is_finite());
    }

    #[test]
    fn test_quad_non_finite() {
        let mut quad = Quad::default();
        quad.bottom_right.x = f64::NAN;
        assert!(!quad.is_finite());
    }
}
