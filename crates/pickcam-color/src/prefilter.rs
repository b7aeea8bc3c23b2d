//! Saturation/overexposure gating ahead of analysis.
//!
//! Keeps pixels that fall in a known color range, carry enough saturation to
//! be a real block face, and are not blown-out white; then opens the mask and
//! drops small components. Everything else is zeroed so later stages only
//! ever see plausible block pixels.

use pickcam_core::{morph_open3, retain_min_area, rgb_to_hsv, HsvRange, Mask, RgbFrame};

use crate::ColorCategory;

/// Pixels below this saturation are treated as glare or background.
pub const S_DESATURATED_THRESHOLD: u8 = 130;
/// Overexposed-white box: saturation at most this...
pub const S_WHITE_MAX: u8 = 35;
/// ...and value at least this.
pub const V_WHITE_MIN: u8 = 253;
/// Minimum surviving component size in pixels.
pub const PREFILTER_MIN_AREA: usize = 800;

/// Null out everything that cannot be a colored block face.
pub fn prefilter(frame: &RgbFrame) -> RgbFrame {
    let (w, h) = (frame.width, frame.height);
    let white = HsvRange::new([0, 0, V_WHITE_MIN], [179, S_WHITE_MAX, 255]);

    let mut keep = Mask::new(w, h);
    for (i, px) in frame.data.chunks_exact(3).enumerate() {
        let hsv = rgb_to_hsv([px[0], px[1], px[2]]);

        let in_color = ColorCategory::ALL.iter().any(|c| c.matches(hsv));
        let saturated = hsv[1] >= S_DESATURATED_THRESHOLD;
        let overexposed = white.contains(hsv);
        if in_color && saturated && !overexposed {
            keep.data[i] = 255;
        }
    }

    let keep = retain_min_area(&morph_open3(&keep), PREFILTER_MIN_AREA);

    let mut out = RgbFrame::new(w, h);
    for (i, on) in keep.data.iter().enumerate() {
        if *on != 0 {
            out.data[i * 3..i * 3 + 3].copy_from_slice(&frame.data[i * 3..i * 3 + 3]);
        }
    }
    out
}
