//! Binary masks, 3x3 morphology, and component filtering.

use nalgebra::Point2;

/// Binary raster; nonzero bytes are foreground.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height],
        }
    }

    pub fn filled(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![255u8; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        self.data[y * self.width + x] = if on { 255 } else { 0 };
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn and_assign(&mut self, other: &Mask) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            if b == 0 {
                *a = 0;
            }
        }
    }

    pub fn or_assign(&mut self, other: &Mask) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            if b != 0 {
                *a = 255;
            }
        }
    }

    pub fn invert(&mut self) {
        for v in &mut self.data {
            *v = if *v == 0 { 255 } else { 0 };
        }
    }
}

fn erode3_once(src: &Mask) -> Mask {
    let (w, h) = (src.width, src.height);
    let mut out = Mask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut keep = src.get(x, y);
            if !keep {
                continue;
            }
            'kernel: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        keep = false;
                        break 'kernel;
                    }
                    if !src.get(nx as usize, ny as usize) {
                        keep = false;
                        break 'kernel;
                    }
                }
            }
            if keep {
                out.set(x, y, true);
            }
        }
    }
    out
}

fn dilate3_once(src: &Mask) -> Mask {
    let (w, h) = (src.width, src.height);
    let mut out = Mask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut hit = false;
            'kernel: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    if src.get(nx as usize, ny as usize) {
                        hit = true;
                        break 'kernel;
                    }
                }
            }
            if hit {
                out.set(x, y, true);
            }
        }
    }
    out
}

/// Erode with a full 3x3 kernel; out-of-bounds counts as background.
pub fn erode3(src: &Mask, iterations: usize) -> Mask {
    let mut m = src.clone();
    for _ in 0..iterations {
        m = erode3_once(&m);
    }
    m
}

/// Dilate with a full 3x3 kernel.
pub fn dilate3(src: &Mask, iterations: usize) -> Mask {
    let mut m = src.clone();
    for _ in 0..iterations {
        m = dilate3_once(&m);
    }
    m
}

/// Morphological opening (erode then dilate, one iteration each).
pub fn morph_open3(src: &Mask) -> Mask {
    dilate3_once(&erode3_once(src))
}

pub(crate) struct Components {
    /// Per-pixel label, 0 = background, components numbered from 1.
    pub labels: Vec<u32>,
    /// Pixel count per component, index = label - 1.
    pub areas: Vec<usize>,
}

/// Label 8-connected foreground components with an explicit stack.
pub(crate) fn connected_components(mask: &Mask) -> Components {
    let (w, h) = (mask.width, mask.height);
    let mut labels = vec![0u32; w * h];
    let mut areas = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for start in 0..w * h {
        if mask.data[start] == 0 || labels[start] != 0 {
            continue;
        }
        let label = areas.len() as u32 + 1;
        let mut area = 0usize;
        labels[start] = label;
        stack.push(start);

        while let Some(i) = stack.pop() {
            area += 1;
            let x = (i % w) as i32;
            let y = (i / w) as i32;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let j = ny as usize * w + nx as usize;
                    if mask.data[j] != 0 && labels[j] == 0 {
                        labels[j] = label;
                        stack.push(j);
                    }
                }
            }
        }
        areas.push(area);
    }

    Components { labels, areas }
}

/// Keep only 8-connected components with at least `min_area` pixels.
pub fn retain_min_area(mask: &Mask, min_area: usize) -> Mask {
    let comps = connected_components(mask);
    let mut out = Mask::new(mask.width, mask.height);
    for (i, &label) in comps.labels.iter().enumerate() {
        if label != 0 && comps.areas[(label - 1) as usize] >= min_area {
            out.data[i] = 255;
        }
    }
    out
}

/// Rasterize a closed polygon into the mask, even-odd rule at pixel centers.
pub fn fill_polygon(mask: &mut Mask, pts: &[Point2<f32>], on: bool) {
    if pts.len() < 3 {
        return;
    }

    let mut y_min = f32::INFINITY;
    let mut y_max = f32::NEG_INFINITY;
    for p in pts {
        y_min = y_min.min(p.y);
        y_max = y_max.max(p.y);
    }
    let y0 = y_min.floor().max(0.0) as usize;
    let y1 = (y_max.ceil() as i64).min(mask.height as i64 - 1);
    if y1 < 0 {
        return;
    }

    let mut xs: Vec<f32> = Vec::new();
    for y in y0..=y1 as usize {
        let yc = y as f32 + 0.5;
        xs.clear();
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            if (a.y <= yc && b.y > yc) || (b.y <= yc && a.y > yc) {
                let t = (yc - a.y) / (b.y - a.y);
                xs.push(a.x + t * (b.x - a.x));
            }
        }
        xs.sort_by(|p, q| p.partial_cmp(q).unwrap_or(std::cmp::Ordering::Equal));

        for pair in xs.chunks_exact(2) {
            let x_first = ((pair[0] - 0.5).ceil() as i64).max(0);
            let x_last = ((pair[1] - 0.5).floor() as i64).min(mask.width as i64 - 1);
            for x in x_first..=x_last {
                mask.set(x as usize, y, on);
            }
        }
    }
}
