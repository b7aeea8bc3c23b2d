//! Raster annotation primitives for display copies.
//!
//! These only ever touch a frame handed in for rendering; detection always
//! runs on the unannotated input.

use nalgebra::Point2;

use crate::RgbFrame;

pub type Rgb = [u8; 3];

#[inline]
fn put(frame: &mut RgbFrame, x: i32, y: i32, color: Rgb) {
    if x < 0 || y < 0 || x >= frame.width as i32 || y >= frame.height as i32 {
        return;
    }
    frame.set(x as usize, y as usize, color);
}

pub fn draw_disc(frame: &mut RgbFrame, cx: i32, cy: i32, radius: i32, color: Rgb) {
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                put(frame, cx + dx, cy + dy, color);
            }
        }
    }
}

pub fn draw_cross(frame: &mut RgbFrame, cx: i32, cy: i32, half: i32, color: Rgb) {
    for d in -half..=half {
        put(frame, cx + d, cy, color);
        put(frame, cx, cy + d, color);
    }
}

fn stamp(frame: &mut RgbFrame, x: i32, y: i32, color: Rgb, thickness: i32) {
    if thickness <= 1 {
        put(frame, x, y, color);
    } else {
        draw_disc(frame, x, y, thickness / 2, color);
    }
}

pub fn draw_line(
    frame: &mut RgbFrame,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    color: Rgb,
    thickness: i32,
) {
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        stamp(frame, x, y, color, thickness);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

pub fn draw_rect_outline(
    frame: &mut RgbFrame,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    color: Rgb,
    thickness: i32,
) {
    let (xa, xb) = (x0.min(x1), x0.max(x1));
    let (ya, yb) = (y0.min(y1), y0.max(y1));
    draw_line(frame, xa, ya, xb, ya, color, thickness);
    draw_line(frame, xb, ya, xb, yb, color, thickness);
    draw_line(frame, xb, yb, xa, yb, color, thickness);
    draw_line(frame, xa, yb, xa, ya, color, thickness);
}

pub fn draw_polyline_closed(frame: &mut RgbFrame, pts: &[Point2<f32>], color: Rgb, thickness: i32) {
    if pts.len() < 2 {
        return;
    }
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        draw_line(
            frame,
            a.x.round() as i32,
            a.y.round() as i32,
            b.x.round() as i32,
            b.y.round() as i32,
            color,
            thickness,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_outline_touches_corners_not_center() {
        let mut f = RgbFrame::new(16, 16);
        draw_rect_outline(&mut f, 2, 2, 12, 12, [255, 0, 0], 1);
        assert_eq!(f.get(2, 2), [255, 0, 0]);
        assert_eq!(f.get(12, 12), [255, 0, 0]);
        assert_eq!(f.get(7, 7), [0, 0, 0]);
    }

    #[test]
    fn drawing_clips_outside_the_frame() {
        let mut f = RgbFrame::new(8, 8);
        draw_disc(&mut f, -5, -5, 3, [0, 255, 0]);
        draw_line(&mut f, -10, 4, 20, 4, [0, 255, 0], 1);
        assert_eq!(f.get(0, 4), [0, 255, 0]);
        assert_eq!(f.get(7, 4), [0, 255, 0]);
    }

    #[test]
    fn cross_marks_both_axes() {
        let mut f = RgbFrame::new(9, 9);
        draw_cross(&mut f, 4, 4, 2, [0, 0, 255]);
        assert_eq!(f.get(2, 4), [0, 0, 255]);
        assert_eq!(f.get(4, 2), [0, 0, 255]);
        assert_eq!(f.get(2, 2), [0, 0, 0]);
    }
}
