//! Robot footprint and collision kernel.
//!
//! Tests whether obstacle points fall inside the robot outline at a
//! candidate pose, and measures clearance for the obstacle cost term.

use std::f64::consts::TAU;

use crate::geometry::{Point2D, Pose2D, cross, point_in_triangle};

use super::trajectory::Trajectory;

/// Vertex count of the polygon standing in for a circular robot.
const DISK_VERTICES: usize = 20;

/// The robot outline in the body frame.
///
/// Either a configured polygon (vertices already padded outward on
/// receipt) or a disk stand-in approximated by a regular 20-gon for the
/// containment test.
#[derive(Clone, Debug)]
pub struct Footprint {
    vertices: Vec<Point2D>,
    /// Stand-in radius when no polygon was configured; clearance then
    /// uses the plain circle distance instead of the boundary intersection.
    disk_radius: Option<f64>,
}

impl Footprint {
    /// Footprint from a configured polygon. Vertices are body-frame and
    /// already padded.
    pub fn from_polygon(vertices: Vec<Point2D>) -> Self {
        Self {
            vertices,
            disk_radius: None,
        }
    }

    /// Disk stand-in of the given radius (robot radius plus pad).
    pub fn disk(radius: f64) -> Self {
        let vertices = (0..DISK_VERTICES)
            .map(|i| {
                let angle = TAU * i as f64 / DISK_VERTICES as f64;
                Point2D::new(radius * angle.cos(), radius * angle.sin())
            })
            .collect();
        Self {
            vertices,
            disk_radius: Some(radius),
        }
    }

    /// Vertices rigidly transformed to `pose`.
    pub fn at_pose(&self, pose: &Pose2D) -> Vec<Point2D> {
        self.vertices.iter().map(|&v| pose.transform_point(v)).collect()
    }

    /// Whether `point` lies inside the footprint placed at `pose`.
    ///
    /// The polygon is fanned into triangles from the pose position,
    /// which is taken as an interior reference point.
    pub fn contains(&self, pose: &Pose2D, point: Point2D) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        let center = pose.position();
        let moved = self.at_pose(pose);
        for i in 0..moved.len() {
            let a = moved[i];
            let b = moved[(i + 1) % moved.len()];
            if point_in_triangle(point, center, a, b) {
                return true;
            }
        }
        false
    }

    /// Distance from `point` to the footprint placed at `pose`.
    ///
    /// Zero when the point is inside. Otherwise the distance from the
    /// point to where the ray from the pose through the point exits the
    /// polygon boundary; in disk mode the plain circle distance.
    pub fn clearance(&self, pose: &Pose2D, point: Point2D) -> f64 {
        let center = pose.position();
        if let Some(radius) = self.disk_radius {
            return center.distance(&point) - radius;
        }
        if self.contains(pose, point) {
            return 0.0;
        }

        let moved = self.at_pose(pose);
        let reach = center.distance(&point);
        if reach < f64::EPSILON {
            return 0.0;
        }
        let dir = Point2D::new((point.x - center.x) / reach, (point.y - center.y) / reach);

        // Farthest boundary crossing along the ray is the exit point.
        let mut exit_t: Option<f64> = None;
        for i in 0..moved.len() {
            let a = moved[i];
            let b = moved[(i + 1) % moved.len()];
            if let Some(t) = ray_segment_intersection(center, dir, a, b) {
                exit_t = Some(exit_t.map_or(t, |best: f64| best.max(t)));
            }
        }

        match exit_t {
            Some(t) => (reach - t).max(0.0),
            // Degenerate outline; fall back to the center distance
            None => reach,
        }
    }

    /// Whether any obstacle point falls inside the footprint at any
    /// state of the rollout. The first containment decides.
    pub fn collides_along(&self, trajectory: &Trajectory, obstacles: &[Point2D]) -> bool {
        trajectory
            .states
            .iter()
            .any(|state| obstacles.iter().any(|&p| self.contains(&state.pose, p)))
    }
}

/// Parameter `t ≥ 0` where the ray `origin + t·dir` crosses segment
/// `[a, b]`, if it does.
fn ray_segment_intersection(origin: Point2D, dir: Point2D, a: Point2D, b: Point2D) -> Option<f64> {
    let edge = Point2D::new(b.x - a.x, b.y - a.y);
    let denom = cross(dir, edge);
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let to_a = Point2D::new(a.x - origin.x, a.y - origin.y);
    let t = cross(to_a, edge) / denom;
    let s = cross(to_a, dir) / denom;
    if t >= 0.0 && (0.0..=1.0).contains(&s) {
        Some(t)
    } else {
        None
    }
}
