//! Plain point types shared between the detection state and the wire.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A position in camera pixel coordinates (x right, y down).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

/// A position in robot millimeter coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl RobotPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// True when both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<PixelPoint> for Point2<f64> {
    fn from(p: PixelPoint) -> Self {
        Point2::new(p.x, p.y)
    }
}

impl From<Point2<f64>> for PixelPoint {
    fn from(p: Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<RobotPoint> for Point2<f64> {
    fn from(p: RobotPoint) -> Self {
        Point2::new(p.x, p.y)
    }
}

impl From<Point2<f64>> for RobotPoint {
    fn from(p: Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }
}
