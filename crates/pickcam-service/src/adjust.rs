//! Display-only image adjustments.
//!
//! Brightness, saturation, and sharpness tweak the operator's view of the
//! feed. They are applied to a copy on request; detection and the relay
//! always consume the unmodified capture frame.

use std::sync::atomic::{AtomicI32, Ordering};

use pickcam_core::{hsv_to_rgb, rgb_to_hsv, RgbFrame};

/// Units added or removed per keyboard nudge.
pub const ADJUST_STEP: i32 = 5;
/// Brightness range, in percent of full scale.
pub const BRIGHTNESS_LIMIT: i32 = 100;
/// Saturation and sharpness range, in percent.
pub const STRENGTH_LIMIT: i32 = 500;

const UNSHARP_SIGMA: f32 = 3.0;

/// Adjustment parameters, safe to poke from any thread.
#[derive(Default)]
pub struct ImageAdjust {
    brightness: AtomicI32,
    saturation: AtomicI32,
    sharpness: AtomicI32,
}

impl ImageAdjust {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn brightness(&self) -> i32 {
        self.brightness.load(Ordering::Relaxed)
    }

    pub fn saturation(&self) -> i32 {
        self.saturation.load(Ordering::Relaxed)
    }

    pub fn sharpness(&self) -> i32 {
        self.sharpness.load(Ordering::Relaxed)
    }

    /// Set brightness, clamped to `±BRIGHTNESS_LIMIT`. Returns the applied
    /// value.
    pub fn set_brightness(&self, value: i32) -> i32 {
        let v = value.clamp(-BRIGHTNESS_LIMIT, BRIGHTNESS_LIMIT);
        self.brightness.store(v, Ordering::Relaxed);
        v
    }

    /// Set saturation, clamped to `±STRENGTH_LIMIT`. Returns the applied
    /// value.
    pub fn set_saturation(&self, value: i32) -> i32 {
        let v = value.clamp(-STRENGTH_LIMIT, STRENGTH_LIMIT);
        self.saturation.store(v, Ordering::Relaxed);
        v
    }

    /// Set sharpness, clamped to `±STRENGTH_LIMIT`. Returns the applied
    /// value.
    pub fn set_sharpness(&self, value: i32) -> i32 {
        let v = value.clamp(-STRENGTH_LIMIT, STRENGTH_LIMIT);
        self.sharpness.store(v, Ordering::Relaxed);
        v
    }

    pub fn nudge_brightness(&self, delta: i32) -> i32 {
        self.set_brightness(self.brightness() + delta)
    }

    pub fn nudge_saturation(&self, delta: i32) -> i32 {
        self.set_saturation(self.saturation() + delta)
    }

    pub fn nudge_sharpness(&self, delta: i32) -> i32 {
        self.set_sharpness(self.sharpness() + delta)
    }

    /// Render an adjusted copy of `frame`. With all parameters at zero this
    /// is a plain clone.
    pub fn apply(&self, frame: &RgbFrame) -> RgbFrame {
        let brightness = self.brightness();
        let saturation = self.saturation();
        let sharpness = self.sharpness();

        let mut out = frame.clone();
        if brightness != 0 {
            // value/100 of full scale, matching a [0,1] additive offset.
            let offset = brightness * 255 / 100;
            for c in &mut out.data {
                *c = (i32::from(*c) + offset).clamp(0, 255) as u8;
            }
        }
        if saturation != 0 {
            let factor = 1.0 + saturation as f32 / 100.0;
            for px in out.data.chunks_exact_mut(3) {
                let mut hsv = rgb_to_hsv([px[0], px[1], px[2]]);
                hsv[1] = (f32::from(hsv[1]) * factor).clamp(0.0, 255.0) as u8;
                let rgb = hsv_to_rgb(hsv);
                px.copy_from_slice(&rgb);
            }
        }
        if sharpness != 0 {
            out = unsharp(&out, sharpness as f32 / 100.0);
        }
        out
    }
}

/// Unsharp masking: `out = (1 + k) * src - k * blur(src)`.
fn unsharp(frame: &RgbFrame, amount: f32) -> RgbFrame {
    let Some(img) = image::RgbImage::from_raw(
        frame.width as u32,
        frame.height as u32,
        frame.data.clone(),
    ) else {
        return frame.clone();
    };
    let blurred = image::imageops::blur(&img, UNSHARP_SIGMA);

    let mut out = frame.clone();
    for (dst, (src, blur)) in out
        .data
        .iter_mut()
        .zip(frame.data.iter().zip(blurred.as_raw().iter()))
    {
        let v = f32::from(*src) * (1.0 + amount) - f32::from(*blur) * amount;
        *dst = v.clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp_to_their_limits() {
        let adj = ImageAdjust::new();
        assert_eq!(adj.set_brightness(900), BRIGHTNESS_LIMIT);
        assert_eq!(adj.set_brightness(-900), -BRIGHTNESS_LIMIT);
        assert_eq!(adj.set_saturation(900), STRENGTH_LIMIT);
        assert_eq!(adj.set_sharpness(-900), -STRENGTH_LIMIT);
    }

    #[test]
    fn nudges_move_by_steps_and_saturate() {
        let adj = ImageAdjust::new();
        assert_eq!(adj.nudge_brightness(ADJUST_STEP), 5);
        assert_eq!(adj.nudge_brightness(ADJUST_STEP), 10);
        adj.set_brightness(BRIGHTNESS_LIMIT - 2);
        assert_eq!(adj.nudge_brightness(ADJUST_STEP), BRIGHTNESS_LIMIT);
        assert_eq!(adj.nudge_brightness(-ADJUST_STEP), BRIGHTNESS_LIMIT - 5);
    }

    #[test]
    fn zero_parameters_leave_the_frame_untouched() {
        let adj = ImageAdjust::new();
        let mut frame = RgbFrame::new(4, 4);
        frame.set(1, 1, [120, 60, 30]);
        assert_eq!(adj.apply(&frame), frame);
    }

    #[test]
    fn brightness_lifts_every_channel() {
        let adj = ImageAdjust::new();
        adj.set_brightness(20);
        let mut frame = RgbFrame::new(2, 2);
        frame.set(0, 0, [100, 100, 100]);
        frame.set(1, 1, [250, 250, 250]);
        let out = adj.apply(&frame);
        assert_eq!(out.get(0, 0), [151, 151, 151]);
        // Already near white clips instead of wrapping.
        assert_eq!(out.get(1, 1), [255, 255, 255]);
    }

    #[test]
    fn saturation_deepens_a_muted_color() {
        let adj = ImageAdjust::new();
        adj.set_saturation(100);
        let mut frame = RgbFrame::new(1, 1);
        frame.set(0, 0, [150, 100, 100]);
        let out = adj.apply(&frame);
        let before = rgb_to_hsv([150, 100, 100]);
        let after = rgb_to_hsv(out.get(0, 0));
        assert!(after[1] > before[1]);
    }
}
