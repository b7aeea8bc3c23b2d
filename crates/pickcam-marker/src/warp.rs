//! Perspective mapping from the unit square onto an image quad.

use nalgebra::{Matrix3, Point2, Vector3};

/// Projective map taking `(u, v)` in `[0,1]^2` to image coordinates.
///
/// Built from four corners ordered TL, TR, BR, BL via the classic
/// square-to-quad construction, which avoids a general 8x8 solve for this
/// fixed source geometry.
#[derive(Clone, Copy, Debug)]
pub struct QuadMap {
    m: Matrix3<f64>,
}

impl QuadMap {
    pub fn from_corners(corners: &[Point2<f32>; 4]) -> Option<Self> {
        let p: Vec<(f64, f64)> = corners.iter().map(|q| (q.x as f64, q.y as f64)).collect();
        let (p0, p1, p2, p3) = (p[0], p[1], p[2], p[3]);

        let sx = p0.0 - p1.0 + p2.0 - p3.0;
        let sy = p0.1 - p1.1 + p2.1 - p3.1;

        let d1 = (p1.0 - p2.0, p1.1 - p2.1);
        let d2 = (p3.0 - p2.0, p3.1 - p2.1);
        let den = d1.0 * d2.1 - d2.0 * d1.1;
        if den.abs() < 1e-9 {
            return None;
        }

        let g = (sx * d2.1 - d2.0 * sy) / den;
        let h = (d1.0 * sy - sx * d1.1) / den;

        let a = p1.0 - p0.0 + g * p1.0;
        let b = p3.0 - p0.0 + h * p3.0;
        let c = p0.0;
        let d = p1.1 - p0.1 + g * p1.1;
        let e = p3.1 - p0.1 + h * p3.1;
        let f = p0.1;

        Some(Self {
            m: Matrix3::new(a, b, c, d, e, f, g, h, 1.0),
        })
    }

    #[inline]
    pub fn apply(&self, u: f64, v: f64) -> Point2<f32> {
        let w = self.m * Vector3::new(u, v, 1.0);
        Point2::new((w[0] / w[2]) as f32, (w[1] / w[2]) as f32)
    }
}
