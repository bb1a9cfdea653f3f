//! Board pose from a single view with a calibrated camera.

use crate::camera::{Camera, Pose};
use crate::init::pose_from_homography;
use crate::lm::{LmOptions, NllsProblem};
use crate::planar::{plane_homography, reprojection_residuals, validate_view};
use log::debug;
use nalgebra::{DVector, Matrix3, Point2, Point3, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

struct PoseProblem<'a> {
    camera: &'a Camera,
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
}

impl NllsProblem for PoseProblem<'_> {
    fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
        let pose = Pose::new(
            Vector3::new(p[0], p[1], p[2]),
            Vector3::new(p[3], p[4], p[5]),
        );
        let mut r = DVector::zeros(2 * self.object.len());
        reprojection_residuals(self.camera, &pose, self.object, self.image, r.as_mut_slice());
        r
    }
}

/// Estimate the pose of a planar board (`z = 0`) from its detected corners.
///
/// Corners are undistorted onto the normalised plane, a homography gives the
/// initial pose and LM refines it against pixel reprojection error.
/// Returns `None` for mismatched or degenerate input.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(points = object.len()))
)]
pub fn estimate_pose(
    camera: &Camera,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> Option<Pose> {
    validate_view(0, object, image.len()).ok()?;

    let normalized: Vec<Point2<f64>> = image.iter().map(|p| camera.normalize(*p)).collect();
    let h = plane_homography(object, &normalized)?;
    let initial = pose_from_homography(&Matrix3::identity(), &h.h)?;

    let problem = PoseProblem {
        camera,
        object,
        image,
    };
    let mut params = DVector::zeros(6);
    params.rows_mut(0, 3).copy_from(&initial.rotation);
    params.rows_mut(3, 3).copy_from(&initial.translation);

    let lm = LmOptions {
        patience: 30,
        ..Default::default()
    };
    let report = lm.minimize(&problem, params, &[true; 6]);
    let p = report.params;
    if p.iter().any(|v| !v.is_finite()) {
        return None;
    }
    debug!(
        "pose refined in {} evaluations, rms {:.4} px",
        report.evaluations,
        (report.final_cost / object.len() as f64).sqrt()
    );
    Some(Pose::new(
        Vector3::new(p[0], p[1], p[2]),
        Vector3::new(p[3], p[4], p[5]),
    ))
}
