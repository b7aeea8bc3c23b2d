//! Rectangular colored-object location.

use nalgebra::Point2;
use pickcam_core::{
    approx_polygon_closed, dilate3, draw_disc, draw_polyline_closed, erode3, fill_polygon,
    find_external_contours, polygon_area, polygon_centroid, polygon_perimeter, rgb_to_hsv,
    AffineTransform, Mask, PixelPoint, RgbFrame, RobotPoint,
};

use crate::{ColorCategory, LocatorParams};

/// One located colored object.
#[derive(Clone, Debug)]
pub struct ColorObject {
    pub category: ColorCategory,
    /// Mean RGB sampled under the object's contour.
    pub mean_rgb: [u8; 3],
    /// Contour centroid in pixels.
    pub center_px: PixelPoint,
    /// Mapped robot position; absent without a calibration, and absent when
    /// the mapped value is not finite.
    pub robot_pos: Option<RobotPoint>,
}

/// Per-category segmentation with a quadrilateral shape gate.
///
/// Blocks are rectangular; anything whose simplified contour is not a
/// 4-vertex polygon (balls, hands, cable loops) is dropped before it can be
/// offered to the robot.
pub struct ColorLocator {
    params: LocatorParams,
}

impl ColorLocator {
    pub fn new(params: LocatorParams) -> Self {
        Self { params }
    }

    pub fn with_defaults() -> Self {
        Self::new(LocatorParams::default())
    }

    pub fn params(&self) -> &LocatorParams {
        &self.params
    }

    /// Locate quadrilateral blobs of every known category.
    ///
    /// Detection reads only `frame`; `display`, when given, receives contour
    /// outlines and centroid dots as a pure rendering side effect.
    pub fn locate(
        &self,
        frame: &RgbFrame,
        mut display: Option<&mut RgbFrame>,
        transform: Option<&AffineTransform>,
    ) -> Vec<ColorObject> {
        let (w, h) = (frame.width, frame.height);

        let hsv: Vec<[u8; 3]> = frame
            .data
            .chunks_exact(3)
            .map(|px| rgb_to_hsv([px[0], px[1], px[2]]))
            .collect();

        let mut out = Vec::new();
        for category in ColorCategory::ALL {
            let mut mask = Mask::new(w, h);
            for (i, &hv) in hsv.iter().enumerate() {
                if category.matches(hv) {
                    mask.data[i] = 255;
                }
            }
            let mask = dilate3(
                &erode3(&mask, self.params.morph_iterations),
                self.params.morph_iterations,
            );

            for contour in find_external_contours(&mask) {
                if polygon_area(&contour) < self.params.min_contour_area {
                    continue;
                }

                let perimeter = polygon_perimeter(&contour);
                let poly = approx_polygon_closed(&contour, self.params.approx_eps_frac * perimeter);
                if poly.len() != 4 {
                    continue;
                }

                let Some(centroid) = polygon_centroid(&contour) else {
                    continue;
                };
                let center_px = PixelPoint::new(centroid.x, centroid.y);

                let robot_pos = transform.and_then(|t| {
                    let mapped: RobotPoint = t.apply(center_px.into()).into();
                    mapped.is_finite().then_some(mapped)
                });

                let mean_rgb = mean_under_contour(frame, &contour);

                if let Some(d) = display.as_deref_mut() {
                    draw_polyline_closed(d, &contour, category.draw_color(), 2);
                    draw_disc(
                        d,
                        centroid.x.round() as i32,
                        centroid.y.round() as i32,
                        3,
                        category.draw_color(),
                    );
                }

                out.push(ColorObject {
                    category,
                    mean_rgb,
                    center_px,
                    robot_pos,
                });
            }
        }

        log::debug!("color scan: {} object(s) accepted", out.len());
        out
    }
}

fn mean_under_contour(frame: &RgbFrame, contour: &[Point2<f32>]) -> [u8; 3] {
    let mut region = Mask::new(frame.width, frame.height);
    fill_polygon(&mut region, contour, true);

    let (mut x0, mut y0, mut x1, mut y1) = (f32::INFINITY, f32::INFINITY, 0.0f32, 0.0f32);
    for p in contour {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    let xa = x0.max(0.0) as usize;
    let ya = y0.max(0.0) as usize;
    let xb = (x1 as usize).min(frame.width.saturating_sub(1));
    let yb = (y1 as usize).min(frame.height.saturating_sub(1));

    let mut sum = [0u64; 3];
    let mut n = 0u64;
    for y in ya..=yb {
        for x in xa..=xb {
            if region.get(x, y) {
                let px = frame.get(x, y);
                sum[0] += px[0] as u64;
                sum[1] += px[1] as u64;
                sum[2] += px[2] as u64;
                n += 1;
            }
        }
    }

    if n == 0 {
        let p = contour[0];
        let x = (p.x.max(0.0) as usize).min(frame.width - 1);
        let y = (p.y.max(0.0) as usize).min(frame.height - 1);
        return frame.get(x, y);
    }
    [
        (sum[0] / n) as u8,
        (sum[1] / n) as u8,
        (sum[2] / n) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paint_rect(frame: &mut RgbFrame, x0: usize, y0: usize, w: usize, h: usize, rgb: [u8; 3]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                frame.set(x, y, rgb);
            }
        }
    }

    #[test]
    fn small_blobs_fall_below_the_area_gate() {
        let mut frame = RgbFrame::new(100, 100);
        paint_rect(&mut frame, 10, 10, 12, 12, [220, 30, 40]);

        let found = ColorLocator::with_defaults().locate(&frame, None, None);
        assert!(found.is_empty(), "12x12 is under the 400 px^2 gate");
    }

    #[test]
    fn mean_color_matches_the_paint() {
        let mut frame = RgbFrame::new(120, 120);
        paint_rect(&mut frame, 20, 20, 50, 40, [220, 30, 40]);

        let found = ColorLocator::with_defaults().locate(&frame, None, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, ColorCategory::Red);
        assert_eq!(found[0].mean_rgb, [220, 30, 40]);
        assert!(found[0].robot_pos.is_none());
    }
}
