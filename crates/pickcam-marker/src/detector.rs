//! Candidate quad search and marker decoding over a full frame.

use nalgebra::Point2;
use pickcam_core::{
    approx_polygon_closed, find_external_contours, otsu_threshold, polygon_perimeter,
    GrayImageView, Mask, PixelPoint,
};
use serde::{Deserialize, Serialize};

use crate::{Dictionary, Matcher, QuadMap};

const BORDER_BITS: usize = 1;
const MIN_SIDE_PX: f32 = 12.0;

fn default_min_perimeter_rate() -> f32 {
    0.01
}

fn default_approx_eps_frac() -> f32 {
    0.05
}

fn default_min_border_score() -> f32 {
    0.85
}

/// Tunables for candidate search and decoding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Minimum candidate perimeter relative to the larger image side.
    #[serde(default = "default_min_perimeter_rate")]
    pub min_perimeter_rate: f32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    #[serde(default = "default_approx_eps_frac")]
    pub approx_eps_frac: f32,
    /// Required black-border ratio after polarity normalization.
    #[serde(default = "default_min_border_score")]
    pub min_border_score: f32,
    /// Hamming budget override; the family default applies when absent.
    #[serde(default)]
    pub max_hamming: Option<u8>,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_perimeter_rate: default_min_perimeter_rate(),
            approx_eps_frac: default_approx_eps_frac(),
            min_border_score: default_min_border_score(),
            max_hamming: None,
        }
    }
}

/// One decoded marker.
#[derive(Clone, Debug)]
pub struct MarkerDetection {
    pub id: u32,
    /// Quad corners in image pixels, clockwise from the top-left-most.
    pub corners: [Point2<f32>; 4],
    /// Mean of the four corners.
    pub center: PixelPoint,
    /// Rotation `0..=3` of the family code observed in the frame.
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
    /// Whether polarity had to be flipped to satisfy the border.
    pub inverted: bool,
    /// Combined border and Hamming quality in `[0,1]`.
    pub score: f32,
}

/// Full-frame marker detector: global threshold, contour quads, perspective
/// bit sampling, family matching.
pub struct MarkerDetector {
    params: DetectorParams,
    matcher: Matcher,
}

impl MarkerDetector {
    pub fn new(dictionary: Dictionary, params: DetectorParams) -> Self {
        let budget = params.max_hamming.unwrap_or(dictionary.max_correction_bits);
        Self {
            matcher: Matcher::new(dictionary, budget),
            params,
        }
    }

    /// Detector over the built-in family with default tunables.
    pub fn with_default_family() -> Self {
        Self::new(crate::dict_4x4_50().clone(), DetectorParams::default())
    }

    pub fn dictionary(&self) -> &Dictionary {
        self.matcher.dictionary()
    }

    /// Find and decode every marker quad in the frame.
    pub fn detect(&self, gray: &GrayImageView<'_>) -> Vec<MarkerDetection> {
        let thr = otsu_threshold(gray.data);
        let dark = dark_mask(gray, thr);

        let min_perimeter = (self.params.min_perimeter_rate as f64
            * gray.width.max(gray.height) as f64)
            .max(4.0 * MIN_SIDE_PX as f64);

        let mut candidates = 0usize;
        let mut out = Vec::new();
        for contour in find_external_contours(&dark) {
            let perimeter = polygon_perimeter(&contour);
            if perimeter < min_perimeter {
                continue;
            }

            let poly =
                approx_polygon_closed(&contour, self.params.approx_eps_frac as f64 * perimeter);
            if poly.len() != 4 {
                continue;
            }
            let quad = [poly[0], poly[1], poly[2], poly[3]];
            if !is_convex(&quad) || min_side(&quad) < MIN_SIDE_PX {
                continue;
            }
            candidates += 1;

            let quad = order_from_top_left(quad);
            if let Some(det) = self.decode_quad(gray, quad) {
                out.push(det);
            }
        }

        log::debug!(
            "marker scan: {candidates} quad candidate(s), {} decoded",
            out.len()
        );
        dedup_by_id_keep_best(out)
    }

    fn decode_quad(
        &self,
        gray: &GrayImageView<'_>,
        corners: [Point2<f32>; 4],
    ) -> Option<MarkerDetection> {
        let dict = self.matcher.dictionary();
        let bits = dict.marker_size;
        let cells = bits + 2 * BORDER_BITS;

        let map = QuadMap::from_corners(&corners)?;
        let mut samples = Vec::with_capacity(cells * cells);
        for cy in 0..cells {
            for cx in 0..cells {
                let u = (cx as f64 + 0.5) / cells as f64;
                let v = (cy as f64 + 0.5) / cells as f64;
                let p = map.apply(u, v);
                samples.push(sample_mean_3x3(gray, p.x, p.y)?);
            }
        }

        let (code, border_score, inverted) = decode_cell_samples(
            &samples,
            cells,
            bits,
            BORDER_BITS,
            self.params.min_border_score,
        )?;
        let m = self.matcher.match_code(code)?;

        let total_bits = dict.bit_count().max(1) as f32;
        let score = (border_score * (1.0 - m.hamming as f32 / total_bits)).clamp(0.0, 1.0);

        let cx = corners.iter().map(|p| p.x as f64).sum::<f64>() / 4.0;
        let cy = corners.iter().map(|p| p.y as f64).sum::<f64>() / 4.0;

        Some(MarkerDetection {
            id: m.id,
            corners,
            center: PixelPoint::new(cx, cy),
            rotation: m.rotation,
            hamming: m.hamming,
            border_score,
            inverted,
            score,
        })
    }
}

fn dark_mask(gray: &GrayImageView<'_>, thr: u8) -> Mask {
    Mask {
        width: gray.width,
        height: gray.height,
        data: gray
            .data
            .iter()
            .map(|&v| if v < thr { 255 } else { 0 })
            .collect(),
    }
}

fn is_convex(q: &[Point2<f32>; 4]) -> bool {
    let mut sign = 0i32;
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        let c = q[(i + 2) % 4];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() < 1e-6 {
            continue;
        }
        let s = if cross > 0.0 { 1 } else { -1 };
        if sign == 0 {
            sign = s;
        } else if sign != s {
            return false;
        }
    }
    sign != 0
}

fn min_side(q: &[Point2<f32>; 4]) -> f32 {
    let mut best = f32::INFINITY;
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
        best = best.min(len);
    }
    best
}

// Contour tracing runs clockwise on screen, so the quad stays clockwise;
// rotate it to start at the corner nearest the image origin.
fn order_from_top_left(q: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
    let mut start = 0usize;
    let mut best = f32::INFINITY;
    for (i, p) in q.iter().enumerate() {
        let s = p.x + p.y;
        if s < best {
            best = s;
            start = i;
        }
    }
    [
        q[start],
        q[(start + 1) % 4],
        q[(start + 2) % 4],
        q[(start + 3) % 4],
    ]
}

fn decode_cell_samples(
    samples: &[u8],
    cells: usize,
    bits: usize,
    border: usize,
    min_border_score: f32,
) -> Option<(u64, f32, bool)> {
    if samples.len() != cells * cells {
        return None;
    }
    let thr = otsu_threshold(samples);

    let mut best: Option<(u64, f32, bool)> = None;
    for inverted in [false, true] {
        let mut border_ok = 0u32;
        let mut border_total = 0u32;
        let mut code = 0u64;

        for cy in 0..cells {
            for cx in 0..cells {
                let v = samples[cy * cells + cx];
                let mut is_black = v < thr;
                if inverted {
                    is_black = !is_black;
                }

                let on_border =
                    cx < border || cy < border || cx >= cells - border || cy >= cells - border;
                if on_border {
                    border_total += 1;
                    if is_black {
                        border_ok += 1;
                    }
                } else if is_black {
                    let bx = cx - border;
                    let by = cy - border;
                    code |= 1u64 << (by * bits + bx);
                }
            }
        }

        let border_score = border_ok as f32 / border_total.max(1) as f32;
        if border_score < min_border_score {
            continue;
        }
        if best.as_ref().map_or(true, |b| border_score > b.1) {
            best = Some((code, border_score, inverted));
        }
    }

    best
}

fn dedup_by_id_keep_best(mut dets: Vec<MarkerDetection>) -> Vec<MarkerDetection> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut seen = std::collections::HashSet::new();
    dets.retain(|d| seen.insert(d.id));
    dets
}

fn sample_mean_3x3(img: &GrayImageView<'_>, x: f32, y: f32) -> Option<u8> {
    let ix = x.floor() as i32;
    let iy = y.floor() as i32;
    if ix - 1 < 0 || iy - 1 < 0 || ix + 1 >= img.width as i32 || iy + 1 >= img.height as i32 {
        return None;
    }

    let mut sum = 0u32;
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            sum += img.data[(iy + dy) as usize * img.width + (ix + dx) as usize] as u32;
        }
    }
    Some((sum / 9) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict_4x4_50;
    use pickcam_core::GrayImage;

    fn render_marker(dict: &Dictionary, id: usize, cell_px: usize, margin: usize) -> GrayImage {
        let bits = dict.marker_size;
        let cells = bits + 2 * BORDER_BITS;
        let side = cells * cell_px;
        let dim = side + 2 * margin;
        let mut img = GrayImage {
            width: dim,
            height: dim,
            data: vec![255u8; dim * dim],
        };

        let code = dict.codes[id];
        for cy in 0..cells {
            for cx in 0..cells {
                let on_border = cx == 0 || cy == 0 || cx + 1 == cells || cy + 1 == cells;
                let is_black = if on_border {
                    true
                } else {
                    let bx = cx - BORDER_BITS;
                    let by = cy - BORDER_BITS;
                    (code >> (by * bits + bx)) & 1 == 1
                };
                if !is_black {
                    continue;
                }
                for yy in 0..cell_px {
                    for xx in 0..cell_px {
                        let x = margin + cx * cell_px + xx;
                        let y = margin + cy * cell_px + yy;
                        img.data[y * dim + x] = 0;
                    }
                }
            }
        }
        img
    }

    #[test]
    fn detects_rendered_marker_at_its_center() {
        let dict = dict_4x4_50();
        let img = render_marker(dict, 0, 10, 30);
        let dets = MarkerDetector::with_default_family().detect(&img.view());

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.id, 0);
        assert_eq!(d.hamming, 0);

        let expect = img.width as f64 / 2.0;
        assert!((d.center.x - expect).abs() < 2.0, "center.x {}", d.center.x);
        assert!((d.center.y - expect).abs() < 2.0, "center.y {}", d.center.y);
    }

    #[test]
    fn blank_frame_detects_nothing() {
        let img = GrayImage {
            width: 120,
            height: 120,
            data: vec![255u8; 120 * 120],
        };
        assert!(MarkerDetector::with_default_family()
            .detect(&img.view())
            .is_empty());
    }

    #[test]
    fn quarter_turn_is_reported_as_rotation() {
        let dict = dict_4x4_50();
        let img = render_marker(dict, 5, 10, 30);

        // (x, y) -> (h-1-y, x)
        let (w, h) = (img.width, img.height);
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                data[x * h + (h - 1 - y)] = img.data[y * w + x];
            }
        }
        let turned = GrayImage {
            width: h,
            height: w,
            data,
        };

        let dets = MarkerDetector::with_default_family().detect(&turned.view());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].id, 5);
        assert_ne!(dets[0].rotation, 0);
    }
}
