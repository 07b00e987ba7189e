//! Image-to-ground homography mapping.
//!
//! Solves the planar projective transform taking the four corners of a
//! calibration rectangle as seen by the camera onto the same rectangle
//! measured on the floor. Both point sets are Hartley-normalized before the
//! 8×8 DLT system is solved, which keeps the system well conditioned when
//! pixel coordinates are in the hundreds and world units are not.

use crate::error::{Result, VisionError};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use sightline_core::{CalibrationConfig, Point, Quad};

/// Relative tolerance for collinearity and vanishing denominators.
const EPS: f64 = 1e-9;

/// Immutable image → world planar transform.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyMapper {
    matrix: Matrix3<f64>,
    /// Sign of the homogeneous scale on the camera side of the horizon.
    visible_sign: f64,
}

impl HomographyMapper {
    /// Build the mapper from a camera quad and its world counterpart.
    ///
    /// Fails when either quad is degenerate: non-finite corners, repeated
    /// corners, or three corners on one line.
    pub fn new(camera: &Quad, world: &Quad) -> Result<Self> {
        check_quad("camera", camera)?;
        check_quad("world", world)?;

        let src = camera.corners();
        let dst = world.corners();
        let (t_src, src_n) = normalize_points(&src);
        let (t_dst, dst_n) = normalize_points(&dst);

        // h33 is fixed to 1, leaving eight unknowns and two rows per corner:
        //   [x y 1 0 0 0 -ux -uy] h = u
        //   [0 0 0 x y 1 -vx -vy] h = v
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for i in 0..4 {
            let (x, y) = (src_n[i].x, src_n[i].y);
            let (u, v) = (dst_n[i].x, dst_n[i].y);
            let r = 2 * i;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -u * x;
            a[(r, 7)] = -u * y;
            b[r] = u;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -v * x;
            a[(r + 1, 7)] = -v * y;
            b[r + 1] = v;
        }

        let h = a
            .lu()
            .solve(&b)
            .ok_or_else(|| VisionError::Calibration("calibration system is singular".to_string()))?;

        let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let t_dst_inv = t_dst
            .try_inverse()
            .ok_or_else(|| VisionError::Calibration("world normalization not invertible".to_string()))?;
        let mut matrix = t_dst_inv * h_norm * t_src;

        let scale = matrix[(2, 2)];
        if scale.abs() > EPS {
            matrix /= scale;
        }

        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(VisionError::Calibration("homography is not finite".to_string()));
        }

        let centroid = centroid(&src);
        let w = (matrix * Vector3::new(centroid.x, centroid.y, 1.0))[2];
        let visible_sign = if w < 0.0 { -1.0 } else { 1.0 };

        Ok(Self {
            matrix,
            visible_sign,
        })
    }

    pub fn from_calibration(calibration: &CalibrationConfig) -> Result<Self> {
        Self::new(&calibration.camera, &calibration.world)
    }

    /// Map an image point onto the ground plane.
    ///
    /// Returns `None` for points on or above the horizon, which have no
    /// ground-plane counterpart in front of the camera.
    pub fn map_point(&self, point: Point) -> Option<Point> {
        let p = self.matrix * Vector3::new(point.x, point.y, 1.0);
        let w = p[2] * self.visible_sign;
        let magnitude = p[0].abs().max(p[1].abs()).max(1.0);
        if !w.is_finite() || w <= EPS * magnitude {
            return None;
        }
        let mapped = Point::new(p[0] / p[2], p[1] / p[2]);
        mapped.is_finite().then_some(mapped)
    }

    /// The 3×3 transform, normalized so that h33 = 1 when possible.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }
}

fn check_quad(label: &str, quad: &Quad) -> Result<()> {
    if !quad.is_finite() {
        return Err(VisionError::Calibration(format!(
            "{} rectangle has non-finite corners",
            label
        )));
    }

    let pts = quad.corners();
    for skip in 0..4 {
        let tri: Vec<Point> = (0..4).filter(|&i| i != skip).map(|i| pts[i]).collect();
        let (a, b, c) = (tri[0], tri[1], tri[2]);
        let ab = (b.x - a.x, b.y - a.y);
        let ac = (c.x - a.x, c.y - a.y);
        let cross = ab.0 * ac.1 - ab.1 * ac.0;
        let scale = ab.0.hypot(ab.1) * ac.0.hypot(ac.1);
        if cross.abs() <= EPS * scale || scale == 0.0 {
            return Err(VisionError::Calibration(format!(
                "{} rectangle is degenerate (repeated or collinear corners)",
                label
            )));
        }
    }
    Ok(())
}

fn centroid(pts: &[Point; 4]) -> Point {
    Point::new(
        pts.iter().map(|p| p.x).sum::<f64>() / 4.0,
        pts.iter().map(|p| p.y).sum::<f64>() / 4.0,
    )
}

/// Translate the centroid to the origin and scale so the mean distance from
/// it is sqrt(2).
fn normalize_points(pts: &[Point; 4]) -> (Matrix3<f64>, [Point; 4]) {
    let c = centroid(pts);
    let mean_dist = pts.iter().map(|p| p.distance_to(&c)).sum::<f64>() / 4.0;
    let s = if mean_dist > 0.0 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0);
    let normalized = pts.map(|p| Point::new(s * (p.x - c.x), s * (p.y - c.y)));
    (t, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(pts: [(f64, f64); 4]) -> Quad {
        Quad::new(
            Point::new(pts[0].0, pts[0].1),
            Point::new(pts[1].0, pts[1].1),
            Point::new(pts[2].0, pts[2].1),
            Point::new(pts[3].0, pts[3].1),
        )
    }

    fn assert_close(a: Point, b: Point) {
        assert!(
            a.distance_to(&b) < 1e-6,
            "expected {} to be close to {}",
            a,
            b
        );
    }

    /// Floor rectangle seen in perspective: its far edge is narrower.
    fn trapezoid_mapper() -> HomographyMapper {
        let camera = quad([(40.0, 50.0), (60.0, 50.0), (0.0, 100.0), (100.0, 100.0)]);
        let world = quad([(-10.0, 40.0), (10.0, 40.0), (-10.0, 10.0), (10.0, 10.0)]);
        HomographyMapper::new(&camera, &world).unwrap()
    }

    #[test]
    fn test_identity_calibration() {
        let q = quad([(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]);
        let mapper = HomographyMapper::new(&q, &q).unwrap();
        assert_close(mapper.map_point(Point::new(3.0, 7.0)).unwrap(), Point::new(3.0, 7.0));
        assert!((mapper.matrix() - Matrix3::identity()).norm() < 1e-9);
    }

    #[test]
    fn test_affine_scale_and_offset() {
        let camera = quad([(0.0, 0.0), (640.0, 0.0), (0.0, 480.0), (640.0, 480.0)]);
        let world = quad([(-32.0, 48.0), (32.0, 48.0), (-32.0, 0.0), (32.0, 0.0)]);
        let mapper = HomographyMapper::new(&camera, &world).unwrap();
        assert_close(mapper.map_point(Point::new(320.0, 240.0)).unwrap(), Point::new(0.0, 24.0));
        assert_close(mapper.map_point(Point::new(160.0, 480.0)).unwrap(), Point::new(-16.0, 0.0));
    }

    #[test]
    fn test_corners_reproduce_world() {
        let camera = quad([(40.0, 50.0), (60.0, 50.0), (0.0, 100.0), (100.0, 100.0)]);
        let world = quad([(-10.0, 40.0), (10.0, 40.0), (-10.0, 10.0), (10.0, 10.0)]);
        let mapper = trapezoid_mapper();
        for (c, w) in camera.corners().iter().zip(world.corners().iter()) {
            assert_close(mapper.map_point(*c).unwrap(), *w);
        }
    }

    #[test]
    fn test_perspective_is_not_linear() {
        let mapper = trapezoid_mapper();
        // Halfway up the image trapezoid is well past halfway across the floor.
        let mid = mapper.map_point(Point::new(50.0, 75.0)).unwrap();
        assert!(mid.x.abs() < 1e-9);
        assert!(mid.y > 10.0 && mid.y < 25.0, "got {}", mid);
    }

    #[test]
    fn test_horizon_maps_to_none() {
        let mapper = trapezoid_mapper();
        // Trapezoid sides meet at y = 37.5, the image of the horizon.
        assert!(mapper.map_point(Point::new(50.0, 37.5)).is_none());
        assert!(mapper.map_point(Point::new(50.0, 10.0)).is_none());
        assert!(mapper.map_point(Point::new(50.0, 40.0)).is_some());
    }

    #[test]
    fn test_collinear_corners_rejected() {
        let camera = quad([(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let world = quad([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let err = HomographyMapper::new(&camera, &world).unwrap_err();
        assert!(matches!(err, VisionError::Calibration(_)));
    }

    #[test]
    fn test_repeated_corner_rejected() {
        let camera = quad([(0.0, 0.0), (0.0, 0.0), (0.0, 10.0), (10.0, 10.0)]);
        let world = quad([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        assert!(HomographyMapper::new(&camera, &world).is_err());
    }

    #[test]
    fn test_degenerate_world_rejected() {
        let camera = quad([(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]);
        let world = Quad::default();
        assert!(HomographyMapper::new(&camera, &world).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let camera = quad([(0.0, 0.0), (10.0, 0.0), (0.0, f64::NAN), (10.0, 10.0)]);
        let world = quad([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        assert!(HomographyMapper::new(&camera, &world).is_err());
    }

    #[test]
    fn test_from_calibration() {
        let calibration = CalibrationConfig {
            camera: quad([(0.0, 0.0), (2.0, 0.0), (0.0, 2.0), (2.0, 2.0)]),
            world: quad([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]),
        };
        let mapper = HomographyMapper::from_calibration(&calibration).unwrap();
        assert_close(mapper.map_point(Point::new(1.0, 1.0)).unwrap(), Point::new(0.5, 0.5));
    }
}
