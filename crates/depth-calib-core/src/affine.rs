use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimal number of correspondences for a 3D affine fit.
pub const MIN_CORRESPONDENCES: usize = 4;

/// 3D affine transform stored as a 4x4 homogeneous matrix.
///
/// `target = T * [source; 1]`. The bottom row is always `(0, 0, 0, 1)`.
/// Serialized as row-major `[[f64; 4]; 4]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 4]; 4]", into = "[[f64; 4]; 4]")]
pub struct AffineTransform {
    m: Matrix4<f64>,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            m: Matrix4::identity(),
        }
    }

    pub fn from_translation(t: Vector3<f64>) -> Self {
        Self::from_parts(Matrix3::identity(), t)
    }

    /// Build from the linear 3x3 block and the translation column.
    pub fn from_parts(linear: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        Self { m }
    }

    /// Build from the upper 3x4 block in row-major order.
    pub fn from_upper_rows(p: &[f64; 12]) -> Self {
        Self {
            m: Matrix4::new(
                p[0], p[1], p[2], p[3], //
                p[4], p[5], p[6], p[7], //
                p[8], p[9], p[10], p[11], //
                0.0, 0.0, 0.0, 1.0,
            ),
        }
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.m
    }

    pub fn linear(&self) -> Matrix3<f64> {
        self.m.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.m.fixed_view::<3, 1>(0, 3).into_owned()
    }

    pub fn to_array(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.m[(r, c)];
            }
        }
        rows
    }

    /// Map a point: append 1, multiply, drop the homogeneous component.
    #[inline]
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        let v = self.m * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v[0], v[1], v[2])
    }

    /// `self` applied after `first`.
    pub fn compose(&self, first: &AffineTransform) -> AffineTransform {
        Self { m: self.m * first.m }
    }

    pub fn inverse(&self) -> Option<Self> {
        self.m.try_inverse().map(|m| Self { m })
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<[[f64; 4]; 4]> for AffineTransform {
    type Error = String;

    fn try_from(rows: [[f64; 4]; 4]) -> Result<Self, Self::Error> {
        if rows[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(format!(
                "affine transform bottom row must be [0, 0, 0, 1], got {:?}",
                rows[3]
            ));
        }
        let mut p = [0.0; 12];
        for r in 0..3 {
            p[4 * r..4 * r + 4].copy_from_slice(&rows[r]);
        }
        Ok(Self::from_upper_rows(&p))
    }
}

impl From<AffineTransform> for [[f64; 4]; 4] {
    fn from(t: AffineTransform) -> Self {
        t.to_array()
    }
}

/// Solver settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffineSolveParams {
    /// Reject the fit when `sigma_min / sigma_max` of the (normalized) design
    /// matrix falls below this value.
    pub min_relative_singular_value: f64,
}

impl Default for AffineSolveParams {
    fn default() -> Self {
        Self {
            min_relative_singular_value: 1e-6,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AffineSolveError {
    #[error("affine fit needs at least {required} correspondences, got {got}")]
    InsufficientPoints { got: usize, required: usize },
    #[error("source and target point counts differ ({source_len} vs {target_len})")]
    MismatchedLengths {
        source_len: usize,
        target_len: usize,
    },
    #[error("correspondences contain non-finite coordinates")]
    NonFinite,
    #[error("degenerate anchor configuration (relative singular value {relative_singular_value:e})")]
    DegenerateConfiguration { relative_singular_value: f64 },
}

/// Result of a least-squares affine fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineFit {
    pub transform: AffineTransform,
    /// RMS distance between mapped sources and targets (target units).
    pub rms_residual: f64,
    /// `sigma_min / sigma_max` of the normalized design matrix.
    pub relative_singular_value: f64,
}

/// Translate to the centroid and scale so the mean distance is sqrt(3).
fn normalization_3d(points: impl Iterator<Item = Point3<f64>> + Clone) -> Matrix4<f64> {
    let mut n = 0.0_f64;
    let mut c = Vector3::zeros();
    for p in points.clone() {
        c += p.coords;
        n += 1.0;
    }
    c /= n;

    let mean_dist = points.map(|p| (p.coords - c).norm()).sum::<f64>() / n;
    let s = if mean_dist > 1e-12 {
        3.0_f64.sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix4::new(
        s, 0.0, 0.0, -s * c.x, //
        0.0, s, 0.0, -s * c.y, //
        0.0, 0.0, s, -s * c.z, //
        0.0, 0.0, 0.0, 1.0,
    )
}

fn is_finite(p: &Point3<f64>) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

/// Least-squares affine transform mapping `pairs[i].0` (source) onto `pairs[i].1` (target).
///
/// Each correspondence contributes three rows to a 3N x 12 design matrix, one
/// per target coordinate, with the homogeneous source point in that
/// coordinate's four columns. The system is solved with an SVD; source points
/// are normalized first so the conditioning check is scale independent.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(pairs, params), fields(n = pairs.len()))
)]
pub fn solve_affine(
    pairs: &[(Point3<f64>, Point3<f64>)],
    params: &AffineSolveParams,
) -> Result<AffineFit, AffineSolveError> {
    let n = pairs.len();
    if n < MIN_CORRESPONDENCES {
        return Err(AffineSolveError::InsufficientPoints {
            got: n,
            required: MIN_CORRESPONDENCES,
        });
    }
    if pairs.iter().any(|(s, t)| !is_finite(s) || !is_finite(t)) {
        return Err(AffineSolveError::NonFinite);
    }

    let t_src = normalization_3d(pairs.iter().map(|(s, _)| *s));

    let mut a = DMatrix::<f64>::zeros(3 * n, 12);
    let mut b = DVector::<f64>::zeros(3 * n);
    for (k, (src, dst)) in pairs.iter().enumerate() {
        let s = t_src * src.to_homogeneous();
        for coord in 0..3 {
            let row = 3 * k + coord;
            let col = 4 * coord;
            a[(row, col)] = s[0];
            a[(row, col + 1)] = s[1];
            a[(row, col + 2)] = s[2];
            a[(row, col + 3)] = 1.0;
            b[row] = dst[coord];
        }
    }

    let svd = a.svd(true, true);
    let sigma_max = svd.singular_values.max();
    let sigma_min = svd.singular_values.min();
    let relative_singular_value = if sigma_max > 0.0 {
        sigma_min / sigma_max
    } else {
        0.0
    };
    if !(relative_singular_value >= params.min_relative_singular_value) {
        return Err(AffineSolveError::DegenerateConfiguration {
            relative_singular_value,
        });
    }

    let p = svd
        .solve(&b, sigma_max * f64::EPSILON)
        .map_err(|_| AffineSolveError::DegenerateConfiguration {
            relative_singular_value,
        })?;

    let mut upper = [0.0; 12];
    for (i, v) in upper.iter_mut().enumerate() {
        *v = p[i];
    }
    let normalized = AffineTransform::from_upper_rows(&upper);
    let transform = AffineTransform {
        m: normalized.m * t_src,
    };

    let sq_sum: f64 = pairs
        .iter()
        .map(|(s, t)| (transform.apply(s) - t).norm_squared())
        .sum();
    let rms_residual = (sq_sum / n as f64).sqrt();

    debug!(
        "affine fit: n={} rms={:.6} rel_sv={:.3e}",
        n, rms_residual, relative_singular_value
    );

    Ok(AffineFit {
        transform,
        rms_residual,
        relative_singular_value,
    })
}

/// [`solve_affine`] over parallel source/target slices.
pub fn solve_affine_pairs(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    params: &AffineSolveParams,
) -> Result<AffineFit, AffineSolveError> {
    if source.len() != target.len() {
        return Err(AffineSolveError::MismatchedLengths {
            source_len: source.len(),
            target_len: target.len(),
        });
    }
    let pairs: Vec<_> = source.iter().copied().zip(target.iter().copied()).collect();
    solve_affine(&pairs, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn ground_truth() -> AffineTransform {
        let r = Rotation3::from_euler_angles(0.3, -0.2, 1.1);
        let linear = r.matrix() * Matrix3::from_diagonal(&Vector3::new(1.5, 0.8, 2.0));
        AffineTransform::from_parts(linear, Vector3::new(0.4, -2.0, 7.5))
    }

    fn tetrahedron() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.1, 0.2, 1.8),
            Point3::new(0.6, 0.1, 2.1),
            Point3::new(0.2, 0.7, 2.0),
            Point3::new(0.3, 0.3, 2.6),
        ]
    }

    fn assert_transform_close(a: &AffineTransform, b: &AffineTransform, eps: f64) {
        for r in 0..4 {
            for c in 0..4 {
                assert_relative_eq!(a.matrix()[(r, c)], b.matrix()[(r, c)], epsilon = eps);
            }
        }
    }

    #[test]
    fn four_points_recover_known_transform() {
        let t = ground_truth();
        let src = tetrahedron();
        let dst: Vec<_> = src.iter().map(|p| t.apply(p)).collect();

        let fit = solve_affine_pairs(&src, &dst, &AffineSolveParams::default()).expect("fit");
        assert_transform_close(&fit.transform, &t, 1e-6);
        assert!(fit.rms_residual < 1e-9);
        assert_eq!(fit.transform.to_array()[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn overdetermined_fit_recovers_known_transform() {
        let t = ground_truth();
        let src: Vec<_> = (0..3)
            .flat_map(|i| {
                (0..3).flat_map(move |j| {
                    (0..2).map(move |k| Point3::new(i as f64 * 0.2, j as f64 * 0.3, 1.5 + k as f64))
                })
            })
            .collect();
        let dst: Vec<_> = src.iter().map(|p| t.apply(p)).collect();

        let fit = solve_affine_pairs(&src, &dst, &AffineSolveParams::default()).expect("fit");
        assert_transform_close(&fit.transform, &t, 1e-6);
    }

    #[test]
    fn least_squares_averages_symmetric_noise() {
        let src = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let mut dst: Vec<_> = src.iter().map(|p| p + Vector3::new(1.0, 2.0, 3.0)).collect();
        dst[4].x += 0.01;

        let fit = solve_affine_pairs(&src, &dst, &AffineSolveParams::default()).expect("fit");
        assert!(fit.rms_residual > 0.0);
        assert!(fit.rms_residual < 0.01);
    }

    #[test]
    fn pure_translation_is_recovered() {
        let src = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let dst: Vec<_> = src.iter().map(|p| p + Vector3::new(10.0, 10.0, 10.0)).collect();

        let fit = solve_affine_pairs(&src, &dst, &AffineSolveParams::default()).expect("fit");
        assert_relative_eq!(
            fit.transform.translation(),
            Vector3::new(10.0, 10.0, 10.0),
            epsilon = 1e-9
        );
        assert_relative_eq!(fit.transform.linear(), Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn three_points_are_insufficient() {
        let src = &tetrahedron()[..3];
        let err = solve_affine_pairs(src, src, &AffineSolveParams::default()).expect_err("n=3");
        assert_eq!(
            err,
            AffineSolveError::InsufficientPoints {
                got: 3,
                required: 4
            }
        );
    }

    #[test]
    fn coplanar_sources_are_degenerate() {
        let src = vec![
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(0.0, 1.0, 2.0),
            Point3::new(1.0, 1.0, 2.0),
            Point3::new(0.5, 0.3, 2.0),
        ];
        let dst: Vec<_> = src.iter().map(|p| p + Vector3::new(1.0, 0.0, 0.0)).collect();
        let err = solve_affine_pairs(&src, &dst, &AffineSolveParams::default()).expect_err("planar");
        assert!(matches!(err, AffineSolveError::DegenerateConfiguration { .. }));
    }

    #[test]
    fn near_planar_sources_fall_under_default_threshold() {
        let params = AffineSolveParams::default();
        assert_eq!(params.min_relative_singular_value, 1e-6);

        let src = vec![
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(0.0, 1.0, 2.0),
            Point3::new(1.0, 1.0, 2.0 + 1e-8),
            Point3::new(0.5, 0.3, 2.0),
        ];
        let dst: Vec<_> = src.iter().map(|p| p + Vector3::new(0.0, 2.0, 0.0)).collect();
        let err = solve_affine_pairs(&src, &dst, &params).expect_err("near planar");
        match err {
            AffineSolveError::DegenerateConfiguration {
                relative_singular_value,
            } => assert!(relative_singular_value < 1e-6),
            other => panic!("unexpected error {other:?}"),
        }

        let loose = AffineSolveParams {
            min_relative_singular_value: 1e-14,
        };
        assert!(solve_affine_pairs(&src, &dst, &loose).is_ok());
    }

    #[test]
    fn mismatched_or_non_finite_inputs_fail() {
        let src = tetrahedron();
        let params = AffineSolveParams::default();
        assert!(matches!(
            solve_affine_pairs(&src, &src[..3], &params),
            Err(AffineSolveError::MismatchedLengths { .. })
        ));

        let mut bad = src.clone();
        bad[2].y = f64::INFINITY;
        assert_eq!(
            solve_affine_pairs(&bad, &src, &params),
            Err(AffineSolveError::NonFinite)
        );
    }

    #[test]
    fn apply_identity_and_affine_combination() {
        let p = Point3::new(0.3, -1.2, 4.0);
        assert_eq!(AffineTransform::identity().apply(&p), p);

        let t = ground_truth();
        let p1 = Point3::new(1.0, 2.0, 3.0);
        let p2 = Point3::new(-0.5, 0.25, 2.0);
        let o = Point3::origin();
        let lhs = t.apply(&p1).coords + t.apply(&p2).coords - t.apply(&o).coords;
        let rhs = t.apply(&Point3::from(p1.coords + p2.coords - o.coords)).coords;
        assert_relative_eq!(lhs, rhs, epsilon = 1e-9);
    }

    #[test]
    fn inverse_and_compose_round_trip() {
        let t = ground_truth();
        let inv = t.inverse().expect("invertible");
        assert_transform_close(&inv.compose(&t), &AffineTransform::identity(), 1e-9);
    }

    #[test]
    fn json_uses_rows_and_checks_bottom_row() {
        let t = AffineTransform::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let json = serde_json::to_string(&t).expect("serialize");
        assert_eq!(
            json,
            "[[1.0,0.0,0.0,1.0],[0.0,1.0,0.0,2.0],[0.0,0.0,1.0,3.0],[0.0,0.0,0.0,1.0]]"
        );
        let back: AffineTransform = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, t);

        let bad = "[[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,1,1]]";
        assert!(serde_json::from_str::<AffineTransform>(bad).is_err());
    }
}
