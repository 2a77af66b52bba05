//! 2D geometry primitives shared across the planning stack.
//!
//! Coordinate convention (ROS REP-103): X forward, Y left, angles in
//! radians, CCW positive from +X.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Normalize angle to [-π, π]
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// A point in the 2D plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Distance from the origin.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Z component of the cross product of `a` and `b`.
#[inline]
pub fn cross(a: Point2D, b: Point2D) -> f64 {
    a.x * b.y - a.y * b.x
}

/// A planar pose: position plus heading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Map a point expressed in this pose's frame into the parent frame.
    pub fn transform_point(&self, p: Point2D) -> Point2D {
        let (sin, cos) = self.theta.sin_cos();
        Point2D::new(
            self.x + p.x * cos - p.y * sin,
            self.y + p.x * sin + p.y * cos,
        )
    }

    /// The pose that undoes this one: `inverse().transform_point` maps
    /// parent-frame points into this pose's frame.
    pub fn inverse(&self) -> Pose2D {
        let (sin, cos) = self.theta.sin_cos();
        Pose2D::new(
            -(self.x * cos + self.y * sin),
            self.x * sin - self.y * cos,
            normalize_angle(-self.theta),
        )
    }

    /// Compose with a pose expressed in this pose's frame.
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let p = self.transform_point(other.position());
        Pose2D::new(p.x, p.y, normalize_angle(self.theta + other.theta))
    }
}

/// A differential-drive velocity command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity2D {
    /// Linear velocity (m/s), forward positive
    pub linear: f64,
    /// Angular velocity (rad/s), CCW positive
    pub angular: f64,
}

impl Velocity2D {
    pub const ZERO: Self = Self {
        linear: 0.0,
        angular: 0.0,
    };

    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// Test whether `p` lies strictly inside triangle `(a, b, c)`.
///
/// The point is inside when the cross products of each edge with the
/// vector to `p` share a common strict sign; points on an edge are
/// reported as outside.
pub fn point_in_triangle(p: Point2D, a: Point2D, b: Point2D, c: Point2D) -> bool {
    let d1 = cross(
        Point2D::new(b.x - a.x, b.y - a.y),
        Point2D::new(p.x - a.x, p.y - a.y),
    );
    let d2 = cross(
        Point2D::new(c.x - b.x, c.y - b.y),
        Point2D::new(p.x - b.x, p.y - b.y),
    );
    let d3 = cross(
        Point2D::new(a.x - c.x, a.y - c.y),
        Point2D::new(p.x - c.x, p.y - c.y),
    );
    (d1 > 0.0 && d2 > 0.0 && d3 > 0.0) || (d1 < 0.0 && d2 < 0.0 && d3 < 0.0)
}

/// Distance from `p` to the infinite line through `a` and `b`.
///
/// Falls back to the point distance when `a` and `b` coincide.
pub fn point_to_line_distance(p: Point2D, a: Point2D, b: Point2D) -> f64 {
    let len = a.distance(&b);
    if len < f64::EPSILON {
        return p.distance(&a);
    }
    let num = cross(
        Point2D::new(b.x - a.x, b.y - a.y),
        Point2D::new(p.x - a.x, p.y - a.y),
    );
    num.abs() / len
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_normalize_angle_wraps() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-3.0 * PI) + PI).abs() < 1e-12);
        assert!((normalize_angle(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_transform_round_trip() {
        let pose = Pose2D::new(1.3, -2.7, 0.9);
        let p = Point2D::new(0.4, 0.8);

        let moved = pose.transform_point(p);
        let back = pose.inverse().transform_point(moved);

        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let pose = Pose2D::new(-0.5, 2.0, 1.7);
        let ident = pose.compose(&pose.inverse());

        assert!(ident.x.abs() < 1e-9);
        assert!(ident.y.abs() < 1e-9);
        assert!(ident.theta.abs() < 1e-9);
    }

    #[test]
    fn test_transform_rotates_ccw() {
        let pose = Pose2D::new(0.0, 0.0, FRAC_PI_2);
        let p = pose.transform_point(Point2D::new(1.0, 0.0));

        assert!(p.x.abs() < 1e-12);
        assert!((p.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_in_triangle() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(1.0, 0.0);
        let c = Point2D::new(0.0, 1.0);

        assert!(point_in_triangle(Point2D::new(0.2, 0.2), a, b, c));
        assert!(!point_in_triangle(Point2D::new(0.8, 0.8), a, b, c));
        // Winding order must not matter
        assert!(point_in_triangle(Point2D::new(0.2, 0.2), c, b, a));
    }

    #[test]
    fn test_point_to_line_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(5.0, 0.0);

        let d = point_to_line_distance(Point2D::new(2.5, 0.5), a, b);
        assert!((d - 0.5).abs() < 1e-12);

        // Beyond the segment endpoints the infinite line still applies
        let d = point_to_line_distance(Point2D::new(9.0, -1.0), a, b);
        assert!((d - 1.0).abs() < 1e-12);

        // Degenerate line collapses to point distance
        let d = point_to_line_distance(Point2D::new(3.0, 4.0), a, a);
        assert!((d - 5.0).abs() < 1e-12);
    }
}
