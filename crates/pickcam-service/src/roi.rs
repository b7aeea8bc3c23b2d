//! Operator-driven region-of-interest selection.
//!
//! The ROI starts as a drag rectangle and can be rotated in place once
//! confirmed. Rasterizing it yields the mask that gates both detection
//! inputs, so everything outside the region is invisible to the marker and
//! color stages alike.

use nalgebra::Point2;
use pickcam_core::{fill_polygon, Mask, PixelPoint};

/// Degrees added or removed per rotation nudge.
pub const ROI_ROTATE_STEP: f64 = 5.0;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum RoiSelection {
    /// No region; detection sees the full frame.
    #[default]
    Idle,
    /// A drag in progress. Not yet applied to detection.
    Selecting { start: PixelPoint, end: PixelPoint },
    /// An applied region. `angle_deg` is normalized to `[0, 360)`.
    Confirmed {
        start: PixelPoint,
        end: PixelPoint,
        angle_deg: f64,
    },
}

impl RoiSelection {
    /// Start a new drag. Ignored while a confirmed region is active; it has
    /// to be cleared first.
    pub fn begin(&mut self, at: PixelPoint) {
        if !matches!(self, Self::Confirmed { .. }) {
            *self = Self::Selecting { start: at, end: at };
        }
    }

    /// Move the free corner of an in-progress drag.
    pub fn drag(&mut self, to: PixelPoint) {
        if let Self::Selecting { end, .. } = self {
            *end = to;
        }
    }

    /// Apply the dragged rectangle. A confirm without a drag is a no-op.
    pub fn confirm(&mut self) {
        if let Self::Selecting { start, end } = *self {
            *self = Self::Confirmed {
                start,
                end,
                angle_deg: 0.0,
            };
        }
    }

    /// Drop the region entirely, also resetting the angle.
    pub fn clear(&mut self) {
        *self = Self::Idle;
    }

    /// Rotate a confirmed region by `delta_deg`, wrapping into `[0, 360)`.
    /// Has no effect before confirmation.
    pub fn rotate(&mut self, delta_deg: f64) {
        if let Self::Confirmed { angle_deg, .. } = self {
            *angle_deg = (*angle_deg + delta_deg).rem_euclid(360.0);
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// Corner points of the confirmed region, rotated about its center.
    pub fn corners(&self) -> Option<[Point2<f32>; 4]> {
        let Self::Confirmed {
            start,
            end,
            angle_deg,
        } = *self
        else {
            return None;
        };

        let (x1, x2) = (start.x.min(end.x), start.x.max(end.x));
        let (y1, y2) = (start.y.min(end.y), start.y.max(end.y));
        let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
        let (hw, hh) = ((x2 - x1) / 2.0, (y2 - y1) / 2.0);
        let (sin, cos) = angle_deg.to_radians().sin_cos();

        let corner = |dx: f64, dy: f64| {
            Point2::new(
                (cx + dx * cos - dy * sin) as f32,
                (cy + dx * sin + dy * cos) as f32,
            )
        };
        Some([
            corner(-hw, -hh),
            corner(hw, -hh),
            corner(hw, hh),
            corner(-hw, hh),
        ])
    }

    /// Filled mask of the confirmed region, or `None` while no region is
    /// applied.
    pub fn rasterize(&self, width: usize, height: usize) -> Option<(Mask, [Point2<f32>; 4])> {
        let corners = self.corners()?;
        let mut mask = Mask::new(width, height);
        fill_polygon(&mut mask, &corners, true);
        Some((mask, corners))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> PixelPoint {
        PixelPoint::new(x, y)
    }

    #[test]
    fn drag_confirm_rotate_clear_cycle() {
        let mut roi = RoiSelection::default();
        assert!(!roi.is_confirmed());

        roi.begin(p(10.0, 10.0));
        roi.drag(p(30.0, 20.0));
        assert!(!roi.is_confirmed());

        roi.confirm();
        assert!(roi.is_confirmed());

        // A new drag must not disturb a confirmed region.
        roi.begin(p(0.0, 0.0));
        assert!(matches!(
            roi,
            RoiSelection::Confirmed { start, .. } if start == p(10.0, 10.0)
        ));

        roi.clear();
        assert_eq!(roi, RoiSelection::Idle);
    }

    #[test]
    fn rotation_wraps_and_requires_confirmation() {
        let mut roi = RoiSelection::default();
        roi.rotate(ROI_ROTATE_STEP);
        assert_eq!(roi, RoiSelection::Idle);

        roi.begin(p(0.0, 0.0));
        roi.drag(p(10.0, 10.0));
        roi.confirm();

        roi.rotate(-ROI_ROTATE_STEP);
        assert!(matches!(
            roi,
            RoiSelection::Confirmed { angle_deg, .. } if (angle_deg - 355.0).abs() < 1e-9
        ));
        roi.rotate(ROI_ROTATE_STEP);
        roi.rotate(ROI_ROTATE_STEP);
        assert!(matches!(
            roi,
            RoiSelection::Confirmed { angle_deg, .. } if (angle_deg - 5.0).abs() < 1e-9
        ));
    }

    #[test]
    fn axis_aligned_mask_covers_the_rectangle() {
        let mut roi = RoiSelection::default();
        roi.begin(p(30.0, 20.0));
        roi.drag(p(10.0, 10.0)); // reversed corners normalize
        roi.confirm();

        let (mask, _) = roi.rasterize(40, 30).unwrap();
        assert_eq!(mask.count(), 200);
        assert!(mask.get(15, 15));
        assert!(!mask.get(35, 15));
    }

    #[test]
    fn quarter_turn_swaps_the_extents() {
        let mut roi = RoiSelection::default();
        roi.begin(p(10.0, 10.0));
        roi.drag(p(30.0, 20.0));
        roi.confirm();
        for _ in 0..18 {
            roi.rotate(ROI_ROTATE_STEP);
        }

        let (mask, _) = roi.rasterize(40, 40).unwrap();
        // Same area, extents swapped around the center (20, 15).
        assert_eq!(mask.count(), 200);
        assert!(mask.get(20, 22));
        assert!(!mask.get(28, 15));
    }

    #[test]
    fn idle_and_selecting_have_no_mask() {
        let mut roi = RoiSelection::default();
        assert!(roi.rasterize(10, 10).is_none());
        roi.begin(p(1.0, 1.0));
        roi.drag(p(5.0, 5.0));
        assert!(roi.rasterize(10, 10).is_none());
    }
}
