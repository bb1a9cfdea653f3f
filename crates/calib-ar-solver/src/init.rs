//! Closed-form starting points for the planar solver.

use crate::camera::{Intrinsics, Pose};
use calib_ar_core::{Homography, ImageSize};
use log::debug;
use nalgebra::{DMatrix, Matrix2, Matrix3, Rotation3, SVector, Vector2, Vector3};

/// Zhang's constraint row `v_ij` built from columns `i`, `j` of `H`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Scale `H` so its entries are O(1); the constraints are homogeneous.
fn unit_scaled(h: &Matrix3<f64>) -> Matrix3<f64> {
    let n = h.norm();
    if n > 0.0 {
        h / n
    } else {
        *h
    }
}

/// Zhang's closed-form intrinsics from at least three plane homographies.
///
/// Skew is estimated but discarded. `None` if the views do not constrain
/// the image of the absolute conic.
pub fn zhang_intrinsics(homographies: &[Homography]) -> Option<Intrinsics> {
    if homographies.len() < 3 {
        return None;
    }

    let mut v = DMatrix::<f64>::zeros(2 * homographies.len(), 6);
    for (k, h) in homographies.iter().enumerate() {
        let h = unit_scaled(&h.h);
        v.row_mut(2 * k).copy_from(&v_ij(&h, 0, 1).transpose());
        v.row_mut(2 * k + 1)
            .copy_from(&(v_ij(&h, 0, 0) - v_ij(&h, 1, 1)).transpose());
    }

    let svd = v.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let b = v_t.row(min_idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() <= 1e-12 * (b11 * b11 + b22 * b22) || b11.abs() < f64::MIN_POSITIVE {
        return None;
    }

    let cy = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + cy * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return None;
    }
    let fx = (lambda / b11).sqrt();
    let fy = (lambda * b11 / denom).sqrt();
    let skew = -b12 * fx * fx * fy / lambda;
    let cx = skew * cy / fy - b13 * fx * fx / lambda;

    let k = Intrinsics::new(fx, fy, cx, cy);
    k.is_valid().then_some(k)
}

/// Focal lengths from the orthogonality constraints with the principal point
/// at the image centre.
///
/// Each view gives `r1·r2 = 0` and `|r1| = |r2|`, linear in `1/fx²` and
/// `1/fy²`. With `same_focal` (or a single usable view) one focal is fitted.
pub fn centered_focal_intrinsics(
    homographies: &[Homography],
    size: ImageSize,
    same_focal: bool,
) -> Option<Intrinsics> {
    let (cx, cy) = (size.width as f64 / 2.0, size.height as f64 / 2.0);
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let mut rows: Vec<(Vector2<f64>, f64)> = Vec::with_capacity(2 * homographies.len());
    for h in homographies {
        let h = unit_scaled(&(shift * h.h));
        let (a, b) = (h.column(0), h.column(1));
        rows.push((Vector2::new(a[0] * b[0], a[1] * b[1]), -a[2] * b[2]));
        rows.push((
            Vector2::new(a[0] * a[0] - b[0] * b[0], a[1] * a[1] - b[1] * b[1]),
            -(a[2] * a[2] - b[2] * b[2]),
        ));
    }

    let (inv_fx2, inv_fy2) = if same_focal || homographies.len() < 2 {
        let (num, den) = rows.iter().fold((0.0, 0.0), |(num, den), (a, rhs)| {
            let s = a.x + a.y;
            (num + s * rhs, den + s * s)
        });
        if den <= f64::MIN_POSITIVE {
            return None;
        }
        (num / den, num / den)
    } else {
        let mut ata = Matrix2::zeros();
        let mut atb = Vector2::zeros();
        for (a, rhs) in &rows {
            ata += a * a.transpose();
            atb += a * *rhs;
        }
        let x = ata.try_inverse()? * atb;
        (x.x, x.y)
    };

    if !(inv_fx2 > 0.0 && inv_fy2 > 0.0) {
        return None;
    }
    let k = Intrinsics::new(inv_fx2.sqrt().recip(), inv_fy2.sqrt().recip(), cx, cy);
    k.is_valid().then_some(k)
}

/// Last resort: focal `max(width, height)`, principal point at the centre.
pub fn default_intrinsics(size: ImageSize) -> Intrinsics {
    let f = size.width.max(size.height) as f64;
    Intrinsics::new(f, f, size.width as f64 / 2.0, size.height as f64 / 2.0)
}

/// Plausibility gate for closed-form estimates.
pub(crate) fn plausible(k: &Intrinsics, size: ImageSize) -> bool {
    let (w, h) = (size.width as f64, size.height as f64);
    let aspect = k.fx / k.fy;
    k.is_valid()
        && (0.0..=w).contains(&k.cx)
        && (0.0..=h).contains(&k.cy)
        && (0.2..=5.0).contains(&aspect)
        && k.fx < 100.0 * w.max(h)
}

/// Board pose from a plane homography and intrinsics (`H ~ K [r1 r2 t]`).
///
/// The rotation is projected onto SO(3); the board is placed in front of the
/// camera.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Pose> {
    let k_inv = k.try_inverse()?;
    let m = k_inv * h;
    let (c1, c2, c3) = (m.column(0), m.column(1), m.column(2));

    let scale = 0.5 * (c1.norm() + c2.norm());
    if scale <= 1e-12 {
        return None;
    }
    let sign = if c3[2] < 0.0 { -1.0 } else { 1.0 };
    let lambda = sign / scale;

    let r1: Vector3<f64> = c1 * lambda;
    let r2: Vector3<f64> = c2 * lambda;
    let t: Vector3<f64> = c3 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u = u;
        u.column_mut(2).neg_mut();
        r_orth = u * v_t;
    }

    let pose = Pose::from_rotation(&Rotation3::from_matrix_unchecked(r_orth), t);
    debug!(
        "homography pose: |r| = {:.4} rad, t = [{:.4}, {:.4}, {:.4}]",
        pose.rotation.norm(),
        t.x,
        t.y,
        t.z
    );
    Some(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn k_gt() -> Matrix3<f64> {
        Intrinsics::new(900.0, 880.0, 640.0, 360.0).matrix()
    }

    fn homography(k: &Matrix3<f64>, pose: &Pose) -> Homography {
        let r = pose.rotation_matrix();
        let m = Matrix3::from_columns(&[
            r.matrix().column(0).into_owned(),
            r.matrix().column(1).into_owned(),
            pose.translation,
        ]);
        Homography::new(k * m)
    }

    fn poses() -> Vec<Pose> {
        vec![
            Pose::new(Vector3::new(0.1, 0.0, 0.05), Vector3::new(0.1, -0.05, 1.0)),
            Pose::new(Vector3::new(-0.2, 0.1, 0.0), Vector3::new(-0.1, 0.05, 1.2)),
            Pose::new(Vector3::new(0.05, -0.3, -0.1), Vector3::new(0.05, 0.1, 0.9)),
            Pose::new(Vector3::new(0.3, 0.2, 0.2), Vector3::new(0.0, 0.0, 1.1)),
        ]
    }

    #[test]
    fn zhang_recovers_intrinsics() {
        let k = k_gt();
        let hs: Vec<_> = poses().iter().map(|p| homography(&k, p)).collect();
        let est = zhang_intrinsics(&hs).unwrap();
        assert_relative_eq!(est.fx, 900.0, epsilon = 1e-3);
        assert_relative_eq!(est.fy, 880.0, epsilon = 1e-3);
        assert_relative_eq!(est.cx, 640.0, epsilon = 1e-3);
        assert_relative_eq!(est.cy, 360.0, epsilon = 1e-3);
    }

    #[test]
    fn zhang_needs_three_views() {
        let k = k_gt();
        let hs: Vec<_> = poses().iter().take(2).map(|p| homography(&k, p)).collect();
        assert!(zhang_intrinsics(&hs).is_none());
    }

    #[test]
    fn centered_focal_from_single_view() {
        let k = Intrinsics::new(900.0, 900.0, 640.0, 360.0).matrix();
        let size = ImageSize::new(1280, 720);
        let h = homography(&k, &poses()[1]);
        let est = centered_focal_intrinsics(&[h], size, true).unwrap();
        assert_relative_eq!(est.fx, 900.0, epsilon = 1e-3);
        assert_relative_eq!(est.fy, 900.0, epsilon = 1e-3);
        assert_eq!(640.0, est.cx);
        assert_eq!(360.0, est.cy);
    }

    #[test]
    fn centered_focal_with_two_unknowns() {
        let k = k_gt();
        let size = ImageSize::new(1280, 720);
        let hs: Vec<_> = poses().iter().map(|p| homography(&k, p)).collect();
        let est = centered_focal_intrinsics(&hs, size, false).unwrap();
        assert_relative_eq!(est.fx, 900.0, epsilon = 1e-3);
        assert_relative_eq!(est.fy, 880.0, epsilon = 1e-3);
    }

    #[test]
    fn decomposition_recovers_pose() {
        let k = k_gt();
        for pose in poses() {
            let h = homography(&k, &pose);
            // Arbitrary projective scale, including a negative one.
            let est = pose_from_homography(&k, &(h.h * -3.7)).unwrap();
            assert_relative_eq!(est.rotation, pose.rotation, epsilon = 1e-9);
            assert_relative_eq!(est.translation, pose.translation, epsilon = 1e-9);
        }
    }

    #[test]
    fn fallback_uses_larger_side() {
        let k = default_intrinsics(ImageSize::new(640, 480));
        assert_eq!(640.0, k.fx);
        assert_eq!(640.0, k.fy);
        assert_eq!(320.0, k.cx);
        assert_eq!(240.0, k.cy);
    }
}
