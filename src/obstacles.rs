//! Sensor snapshots and obstacle extraction.
//!
//! Converts either a 1D range scan or a local occupancy grid into a flat
//! list of obstacle points in the robot body frame. The list is rebuilt
//! every control tick and must not outlive the tick that produced it.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::geometry::Point2D;

/// Occupancy value marking a blocked cell (0 = free, -1 = unknown).
pub const OCCUPIED: i8 = 100;

/// A 1D radial range snapshot from a scanning rangefinder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaserScan {
    /// Bearing of the first beam (rad)
    pub angle_min: f64,
    /// Bearing step between consecutive beams (rad)
    pub angle_increment: f64,
    /// Minimum valid range (m)
    pub range_min: f64,
    /// Maximum valid range (m)
    pub range_max: f64,
    /// One range per beam (m)
    pub ranges: Vec<f64>,
}

/// A local occupancy grid.
///
/// The grid is interpreted as body-centered: `origin` is the body-frame
/// coordinate of cell (0, 0), and points extracted from it are body-frame
/// points. Callers that hold a world-frame grid must rebase it before
/// handing it to the extractor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalMap {
    pub width: u32,
    pub height: u32,
    /// Cell edge length (m)
    pub resolution: f64,
    /// Body-frame coordinate of cell (0, 0)
    pub origin: Point2D,
    /// Row-major cell values
    pub cells: Vec<i8>,
}

impl LocalMap {
    /// Create a grid with every cell set to `value`.
    pub fn filled(width: u32, height: u32, resolution: f64, origin: Point2D, value: i8) -> Self {
        Self {
            width,
            height,
            resolution,
            origin,
            cells: vec![value; (width * height) as usize],
        }
    }

    /// Cell value, or `None` outside the grid.
    pub fn cell(&self, x: i32, y: i32) -> Option<i8> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        self.cells.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn set_cell(&mut self, x: i32, y: i32, value: i8) {
        if x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32 {
            self.cells[y as usize * self.width as usize + x as usize] = value;
        }
    }

    pub fn is_occupied(&self, x: i32, y: i32) -> bool {
        self.cell(x, y) == Some(OCCUPIED)
    }

    /// Grid cell containing a body-frame point. May be out of bounds.
    pub fn point_to_cell(&self, p: Point2D) -> (i32, i32) {
        (
            ((p.x - self.origin.x) / self.resolution).floor() as i32,
            ((p.y - self.origin.y) / self.resolution).floor() as i32,
        )
    }

    /// Body-frame center of a grid cell.
    pub fn cell_to_point(&self, x: i32, y: i32) -> Point2D {
        Point2D::new(
            self.origin.x + (x as f64 + 0.5) * self.resolution,
            self.origin.y + (y as f64 + 0.5) * self.resolution,
        )
    }

    /// Length of the map diagonal (m); radial marches stop beyond it.
    pub fn diagonal(&self) -> f64 {
        (self.width as f64 * self.resolution).hypot(self.height as f64 * self.resolution)
    }
}

/// Rebuilds the per-tick obstacle point list.
pub struct ObstacleExtractor {
    /// Angular subsampling resolution (rad)
    angle_res: f64,
}

impl ObstacleExtractor {
    pub fn new(angle_res: f64) -> Self {
        Self { angle_res }
    }

    /// Extract obstacle points from a range scan.
    ///
    /// Beams are subsampled at the configured angular resolution; beams
    /// outside `[range_min, range_max]` are dropped.
    pub fn from_scan(&self, scan: &LaserScan) -> Vec<Point2D> {
        if scan.angle_increment <= 0.0 {
            return Vec::new();
        }
        let step = ((self.angle_res / scan.angle_increment).round() as usize).max(1);

        let mut points = Vec::with_capacity(scan.ranges.len() / step + 1);
        for (i, &r) in scan.ranges.iter().enumerate().step_by(step) {
            if r < scan.range_min || r > scan.range_max {
                continue;
            }
            let bearing = scan.angle_min + i as f64 * scan.angle_increment;
            points.push(Point2D::new(r * bearing.cos(), r * bearing.sin()));
        }
        points
    }

    /// Extract obstacle points from a local occupancy grid.
    ///
    /// Sweeps bearings over (-π, π] and marches each one radially outward
    /// in steps of the grid resolution until the first occupied cell or
    /// the map diagonal, yielding at most one point per bearing. The
    /// result approximates a virtual scan taken at the body origin.
    pub fn from_map(&self, map: &LocalMap) -> Vec<Point2D> {
        if map.resolution <= 0.0 || map.width == 0 || map.height == 0 {
            return Vec::new();
        }
        let max_range = map.diagonal();
        let mut points = Vec::new();

        let mut bearing = -PI + self.angle_res;
        while bearing <= PI + 1e-12 {
            let (sin, cos) = bearing.sin_cos();
            let mut range = map.resolution;
            while range <= max_range {
                let p = Point2D::new(range * cos, range * sin);
                let (cx, cy) = map.point_to_cell(p);
                if map.is_occupied(cx, cy) {
                    points.push(p);
                    break;
                }
                range += map.resolution;
            }
            bearing += self.angle_res;
        }
        points
    }
}
