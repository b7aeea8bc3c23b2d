//! 2x3 affine estimation between camera pixels and robot millimeters.

use nalgebra::{DMatrix, DVector, Matrix2x3, Matrix3, Point2, SMatrix, SVector, Vector3};
use thiserror::Error;

/// Affine map `dst = M * [x, y, 1]^T` with `M` being 2x3.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    pub m: Matrix2x3<f64>,
}

impl AffineTransform {
    pub fn new(m: Matrix2x3<f64>) -> Self {
        Self { m }
    }

    pub fn from_array(rows: [[f64; 3]; 2]) -> Self {
        Self::new(Matrix2x3::new(
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2],
        ))
    }

    pub fn to_array(&self) -> [[f64; 3]; 2] {
        [
            [self.m[(0, 0)], self.m[(0, 1)], self.m[(0, 2)]],
            [self.m[(1, 0)], self.m[(1, 1)], self.m[(1, 2)]],
        ]
    }

    pub fn identity() -> Self {
        Self::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.m * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0], v[1])
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AffineFitError {
    #[error("need at least 3 point pairs, got {have}")]
    TooFewPoints { have: usize },
    #[error("point configuration is degenerate, no non-collinear support found")]
    Degenerate,
}

/// Result of a consensus fit: the refined transform plus which input pairs
/// supported it.
#[derive(Clone, Debug)]
pub struct AffineFit {
    pub transform: AffineTransform,
    pub inliers: Vec<usize>,
    pub mean_residual: f64,
}

/// Solve the affine map through exactly three correspondences.
///
/// Returns `None` when the source triple is (near-)collinear.
pub fn fit_affine_exact(src: &[Point2<f64>; 3], dst: &[Point2<f64>; 3]) -> Option<AffineTransform> {
    let ab = src[1] - src[0];
    let ac = src[2] - src[0];
    if (ab.x * ac.y - ab.y * ac.x).abs() < 1e-9 {
        return None;
    }

    let mut a = SMatrix::<f64, 6, 6>::zeros();
    let mut b = SVector::<f64, 6>::zeros();
    for k in 0..3 {
        let r0 = 2 * k;
        let r1 = 2 * k + 1;
        a[(r0, 0)] = src[k].x;
        a[(r0, 1)] = src[k].y;
        a[(r0, 2)] = 1.0;
        a[(r1, 3)] = src[k].x;
        a[(r1, 4)] = src[k].y;
        a[(r1, 5)] = 1.0;
        b[r0] = dst[k].x;
        b[r1] = dst[k].y;
    }

    let x = a.lu().solve(&b)?;
    Some(AffineTransform::new(Matrix2x3::new(
        x[0], x[1], x[2], x[3], x[4], x[5],
    )))
}

// Translate the centroid to the origin and scale the mean distance to
// sqrt(2), which keeps the normal system well conditioned for pixel-scale
// inputs.
fn normalization(pts: &[Point2<f64>]) -> Matrix3<f64> {
    let n = pts.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        let dx = p.x - cx;
        let dy = p.y - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn apply3(t: &Matrix3<f64>, p: Point2<f64>) -> Point2<f64> {
    let v = t * Vector3::new(p.x, p.y, 1.0);
    Point2::new(v[0], v[1])
}

/// Least-squares affine fit over all correspondences.
pub fn fit_affine_least_squares(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> Option<AffineTransform> {
    if src.len() != dst.len() || src.len() < 3 {
        return None;
    }

    let t_src = normalization(src);
    let t_dst = normalization(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 6);
    let mut b = DVector::<f64>::zeros(2 * n);
    for k in 0..n {
        let s = apply3(&t_src, src[k]);
        let d = apply3(&t_dst, dst[k]);
        a[(2 * k, 0)] = s.x;
        a[(2 * k, 1)] = s.y;
        a[(2 * k, 2)] = 1.0;
        b[2 * k] = d.x;
        a[(2 * k + 1, 3)] = s.x;
        a[(2 * k + 1, 4)] = s.y;
        a[(2 * k + 1, 5)] = 1.0;
        b[2 * k + 1] = d.y;
    }

    let svd = a.svd(true, true);
    let x = svd.solve(&b, 1e-12).ok()?;

    let an = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], 0.0, 0.0, 1.0);
    let m3 = t_dst.try_inverse()? * an * t_src;
    Some(AffineTransform::new(Matrix2x3::new(
        m3[(0, 0)],
        m3[(0, 1)],
        m3[(0, 2)],
        m3[(1, 0)],
        m3[(1, 1)],
        m3[(1, 2)],
    )))
}

/// Robust affine fit: exhaustive 3-subset consensus plus a least-squares
/// refit over the winning inlier set.
///
/// The calibration flow bounds the pair count by the profile id range, so
/// enumerating every triple is cheap and fully deterministic, unlike
/// randomized sampling. Residuals are measured in destination units.
pub fn fit_affine_consensus(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    inlier_threshold: f64,
) -> Result<AffineFit, AffineFitError> {
    let n = src.len().min(dst.len());
    if src.len() != dst.len() || n < 3 {
        return Err(AffineFitError::TooFewPoints { have: n });
    }

    let mut best: Option<(Vec<usize>, f64, AffineTransform)> = None;
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let s3 = [src[i], src[j], src[k]];
                let d3 = [dst[i], dst[j], dst[k]];
                let Some(t) = fit_affine_exact(&s3, &d3) else {
                    continue;
                };

                let mut inliers = Vec::with_capacity(n);
                let mut sum = 0.0;
                for idx in 0..n {
                    let r = (t.apply(src[idx]) - dst[idx]).norm();
                    if r <= inlier_threshold {
                        inliers.push(idx);
                        sum += r;
                    }
                }
                if inliers.len() < 3 {
                    continue;
                }

                let mean = sum / inliers.len() as f64;
                let better = match &best {
                    None => true,
                    Some((bi, bm, _)) => {
                        inliers.len() > bi.len() || (inliers.len() == bi.len() && mean < *bm)
                    }
                };
                if better {
                    best = Some((inliers, mean, t));
                }
            }
        }
    }

    let (inliers, _, seed) = best.ok_or(AffineFitError::Degenerate)?;

    let s: Vec<Point2<f64>> = inliers.iter().map(|&i| src[i]).collect();
    let d: Vec<Point2<f64>> = inliers.iter().map(|&i| dst[i]).collect();
    let refined = fit_affine_least_squares(&s, &d).unwrap_or(seed);

    let mean_residual = s
        .iter()
        .zip(&d)
        .map(|(sp, dp)| (refined.apply(*sp) - *dp).norm())
        .sum::<f64>()
        / inliers.len() as f64;

    Ok(AffineFit {
        transform: refined,
        inliers,
        mean_residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_transform() -> AffineTransform {
        // half-scale plus a shift, roughly what a mm/px calibration gives
        AffineTransform::from_array([[0.5, 0.0, 10.0], [0.0, -0.5, 200.0]])
    }

    #[test]
    fn exact_fit_recovers_a_known_map() {
        let t = sample_transform();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(640.0, 0.0),
            Point2::new(0.0, 480.0),
        ];
        let dst = src.map(|p| t.apply(p));

        let fitted = fit_affine_exact(&src, &dst).expect("fit");
        let probe = Point2::new(321.0, 243.0);
        let q = fitted.apply(probe);
        let expected = t.apply(probe);
        assert_abs_diff_eq!(q.x, expected.x, epsilon = 1e-9);
        assert_abs_diff_eq!(q.y, expected.y, epsilon = 1e-9);
    }

    #[test]
    fn exact_fit_rejects_collinear_sources() {
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(20.0, 20.0),
        ];
        let dst = src;
        assert!(fit_affine_exact(&src, &dst).is_none());
    }

    #[test]
    fn least_squares_averages_noisy_pairs() {
        let t = sample_transform();
        let src: Vec<Point2<f64>> = vec![
            Point2::new(12.0, 30.0),
            Point2::new(600.0, 40.0),
            Point2::new(320.0, 460.0),
            Point2::new(50.0, 400.0),
            Point2::new(580.0, 420.0),
        ];
        let dst: Vec<Point2<f64>> = src
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let q = t.apply(*p);
                let jitter = if i % 2 == 0 { 0.2 } else { -0.2 };
                Point2::new(q.x + jitter, q.y - jitter)
            })
            .collect();

        let fitted = fit_affine_least_squares(&src, &dst).expect("fit");
        let probe = Point2::new(300.0, 250.0);
        let q = fitted.apply(probe);
        let expected = t.apply(probe);
        assert_abs_diff_eq!(q.x, expected.x, epsilon = 0.5);
        assert_abs_diff_eq!(q.y, expected.y, epsilon = 0.5);
    }

    #[test]
    fn consensus_ignores_a_gross_outlier() {
        let t = sample_transform();
        let src: Vec<Point2<f64>> = vec![
            Point2::new(10.0, 10.0),
            Point2::new(620.0, 20.0),
            Point2::new(330.0, 450.0),
            Point2::new(40.0, 430.0),
            Point2::new(600.0, 440.0),
        ];
        let mut dst: Vec<Point2<f64>> = src.iter().map(|p| t.apply(*p)).collect();
        dst[2] = Point2::new(dst[2].x + 500.0, dst[2].y - 500.0);

        let fit = fit_affine_consensus(&src, &dst, 20.0).expect("fit");
        assert_eq!(fit.inliers, vec![0, 1, 3, 4]);
        assert!(fit.mean_residual < 1e-6);

        let probe = Point2::new(100.0, 100.0);
        let q = fit.transform.apply(probe);
        let expected = t.apply(probe);
        assert_abs_diff_eq!(q.x, expected.x, epsilon = 1e-6);
        assert_abs_diff_eq!(q.y, expected.y, epsilon = 1e-6);
    }

    #[test]
    fn consensus_requires_three_pairs() {
        let src = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)];
        let dst = src.clone();
        match fit_affine_consensus(&src, &dst, 20.0) {
            Err(AffineFitError::TooFewPoints { have: 2 }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn consensus_rejects_all_collinear_input() {
        let src: Vec<Point2<f64>> = (0..5).map(|i| Point2::new(i as f64 * 10.0, 5.0)).collect();
        let dst = src.clone();
        assert_eq!(
            fit_affine_consensus(&src, &dst, 20.0).unwrap_err(),
            AffineFitError::Degenerate
        );
    }
}
