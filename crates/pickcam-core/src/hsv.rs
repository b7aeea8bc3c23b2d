//! RGB/HSV conversion in OpenCV 8-bit units: H in [0,180), S and V in [0,255].
//!
//! The segmentation tables upstream of this service were tuned against those
//! units, so the conversion keeps them rather than the 0..360 convention.

use serde::{Deserialize, Serialize};

pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let r = rgb[0] as f32;
    let g = rgb[1] as f32;
    let b = rgb[2] as f32;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let h_deg = if delta <= 0.0 {
        0.0
    } else if max == r {
        let mut h = 60.0 * (g - b) / delta;
        if h < 0.0 {
            h += 360.0;
        }
        h
    } else if max == g {
        60.0 * (b - r) / delta + 120.0
    } else {
        60.0 * (r - g) / delta + 240.0
    };

    let h = (h_deg / 2.0).round() as i32 % 180;
    [h as u8, s.round() as u8, v.round() as u8]
}

pub fn hsv_to_rgb(hsv: [u8; 3]) -> [u8; 3] {
    let h_deg = hsv[0] as f32 * 2.0;
    let s = hsv[1] as f32 / 255.0;
    let v = hsv[2] as f32 / 255.0;

    let c = v * s;
    let hp = h_deg / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let m = v - c;
    [
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    ]
}

/// Inclusive HSV box, `lo[i] <= hsv[i] <= hi[i]` per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lo: [u8; 3],
    pub hi: [u8; 3],
}

impl HsvRange {
    pub const fn new(lo: [u8; 3], hi: [u8; 3]) -> Self {
        Self { lo, hi }
    }

    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        hsv[0] >= self.lo[0]
            && hsv[0] <= self.hi[0]
            && hsv[1] >= self.lo[1]
            && hsv[1] <= self.hi[1]
            && hsv[2] >= self.lo[2]
            && hsv[2] <= self.hi[2]
    }
}
