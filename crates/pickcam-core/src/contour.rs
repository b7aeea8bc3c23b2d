//! External contour tracing and polygon simplification.

use nalgebra::Point2;

use crate::mask::{connected_components, Mask};

// Clockwise Moore neighborhood on screen coordinates (x right, y down).
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

fn dir_index(from: (i32, i32), to: (i32, i32)) -> usize {
    let d = (to.0 - from.0, to.1 - from.1);
    DIRS.iter().position(|&v| v == d).unwrap_or(4)
}

/// Moore-neighbor tracing with Jacob's stopping criterion.
///
/// `start` must be the topmost-leftmost pixel of the component, so its west
/// neighbor is guaranteed background and serves as the initial backtrack.
fn trace_boundary(
    labels: &[u32],
    width: usize,
    height: usize,
    label: u32,
    start: (i32, i32),
    area: usize,
) -> Vec<(i32, i32)> {
    let at = |x: i32, y: i32| -> bool {
        x >= 0
            && y >= 0
            && x < width as i32
            && y < height as i32
            && labels[y as usize * width + x as usize] == label
    };

    let start_b = (start.0 - 1, start.1);
    let mut s = start;
    let mut b = start_b;
    let mut boundary = Vec::new();

    let cap = 8 * area + 8;
    for _ in 0..cap {
        boundary.push(s);

        let bi = dir_index(s, b);
        let mut next = None;
        let mut prev = b;
        for step in 1..=8 {
            let d = (bi + step) % 8;
            let q = (s.0 + DIRS[d].0, s.1 + DIRS[d].1);
            if at(q.0, q.1) {
                next = Some(q);
                break;
            }
            prev = q;
        }

        let Some(next) = next else {
            break; // isolated pixel
        };
        b = prev;
        s = next;
        if s == start && b == start_b {
            break;
        }
    }

    boundary
}

/// Trace the outer boundary of every 8-connected component, in scan order.
pub fn find_external_contours(mask: &Mask) -> Vec<Vec<Point2<f32>>> {
    let comps = connected_components(mask);
    let w = mask.width;

    let mut starts: Vec<Option<(i32, i32)>> = vec![None; comps.areas.len()];
    for (i, &label) in comps.labels.iter().enumerate() {
        if label != 0 {
            let slot = &mut starts[(label - 1) as usize];
            if slot.is_none() {
                *slot = Some(((i % w) as i32, (i / w) as i32));
            }
        }
    }

    starts
        .iter()
        .enumerate()
        .filter_map(|(k, s)| {
            s.map(|start| {
                trace_boundary(
                    &comps.labels,
                    w,
                    mask.height,
                    (k + 1) as u32,
                    start,
                    comps.areas[k],
                )
            })
        })
        .map(|pts| {
            pts.into_iter()
                .map(|(x, y)| Point2::new(x as f32, y as f32))
                .collect()
        })
        .collect()
}

/// Closed arc length of a polygon.
pub fn polygon_perimeter(pts: &[Point2<f32>]) -> f64 {
    if pts.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0f64;
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        let dx = (b.x - a.x) as f64;
        let dy = (b.y - a.y) as f64;
        total += (dx * dx + dy * dy).sqrt();
    }
    total
}

/// Unsigned shoelace area of a closed polygon.
pub fn polygon_area(pts: &[Point2<f32>]) -> f64 {
    if pts.len() < 3 {
        return 0.0;
    }
    let mut a2 = 0.0f64;
    for i in 0..pts.len() {
        let p = pts[i];
        let q = pts[(i + 1) % pts.len()];
        a2 += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    (a2 * 0.5).abs()
}

/// Shoelace centroid, falling back to the vertex mean for degenerate area.
pub fn polygon_centroid(pts: &[Point2<f32>]) -> Option<Point2<f64>> {
    if pts.is_empty() {
        return None;
    }

    let mut a2 = 0.0f64;
    let mut cx = 0.0f64;
    let mut cy = 0.0f64;
    for i in 0..pts.len() {
        let p = pts[i];
        let q = pts[(i + 1) % pts.len()];
        let cross = p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
        a2 += cross;
        cx += (p.x as f64 + q.x as f64) * cross;
        cy += (p.y as f64 + q.y as f64) * cross;
    }

    if a2.abs() < 1e-9 {
        let n = pts.len() as f64;
        let mx = pts.iter().map(|p| p.x as f64).sum::<f64>() / n;
        let my = pts.iter().map(|p| p.y as f64).sum::<f64>() / n;
        return Some(Point2::new(mx, my));
    }

    Some(Point2::new(cx / (3.0 * a2), cy / (3.0 * a2)))
}

fn perpendicular_distance(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f64 {
    let abx = (b.x - a.x) as f64;
    let aby = (b.y - a.y) as f64;
    let apx = (p.x - a.x) as f64;
    let apy = (p.y - a.y) as f64;
    let len = (abx * abx + aby * aby).sqrt();
    if len < 1e-12 {
        return (apx * apx + apy * apy).sqrt();
    }
    (abx * apy - aby * apx).abs() / len
}

/// Push the interior vertices kept between the endpoints of `points`.
fn rdp_keep(points: &[Point2<f32>], eps: f64, keep: &mut Vec<Point2<f32>>) {
    if points.len() < 3 {
        return;
    }
    let a = points[0];
    let b = points[points.len() - 1];

    let mut best_i = 0usize;
    let mut best_d = -1.0f64;
    for (i, &p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let d = perpendicular_distance(p, a, b);
        if d > best_d {
            best_d = d;
            best_i = i;
        }
    }

    if best_d > eps {
        rdp_keep(&points[..=best_i], eps, keep);
        keep.push(points[best_i]);
        rdp_keep(&points[best_i..], eps, keep);
    }
}

/// Ramer-Douglas-Peucker simplification of a closed contour.
///
/// The contour is split at the vertex farthest from the first one, each open
/// chain is simplified, and the halves are stitched back together. Vertex
/// order is preserved.
pub fn approx_polygon_closed(pts: &[Point2<f32>], eps: f64) -> Vec<Point2<f32>> {
    if pts.len() <= 3 {
        return pts.to_vec();
    }

    let first = pts[0];
    let mut far = 0usize;
    let mut far_d = -1.0f64;
    for (i, p) in pts.iter().enumerate() {
        let dx = (p.x - first.x) as f64;
        let dy = (p.y - first.y) as f64;
        let d = dx * dx + dy * dy;
        if d > far_d {
            far_d = d;
            far = i;
        }
    }
    if far == 0 {
        return vec![first];
    }

    let mut wrap: Vec<Point2<f32>> = pts[far..].to_vec();
    wrap.push(first);

    let mut out = vec![first];
    rdp_keep(&pts[..=far], eps, &mut out);
    out.push(pts[far]);
    rdp_keep(&wrap, eps, &mut out);
    out
}
