//! Zhang-style planar calibration with joint Levenberg–Marquardt refinement.

use crate::camera::{Camera, Distortion, Intrinsics, Pose};
use crate::error::SolverError;
use crate::init::{
    centered_focal_intrinsics, default_intrinsics, plausible, pose_from_homography,
    zhang_intrinsics,
};
use crate::lm::{fd_step, LmOptions, NllsProblem};
use calib_ar_core::{estimate_homography, Homography, ImagePointSet, ImageSize, ObjectPointSet};
use log::{debug, info};
use nalgebra::{DMatrix, DVector, Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One board observation: shared board points paired with detected corners.
#[derive(Clone, Debug)]
pub struct Observation {
    pub object: ObjectPointSet,
    pub image: ImagePointSet,
}

impl Observation {
    pub fn new(object: ObjectPointSet, image: ImagePointSet) -> Self {
        Self { object, image }
    }
}

/// Parameters held at their initial value during refinement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverFlags {
    /// Keep `cx, cy` (image centre unless seeded).
    pub fix_principal_point: bool,
    /// Keep `fx / fy` (1 unless seeded).
    pub fix_aspect_ratio: bool,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    pub fix_k3: bool,
    /// Keep every distortion coefficient.
    pub fix_distortion: bool,
}

/// Optional starting values and flags for a calibration run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSeeds {
    pub initial_intrinsics: Option<Intrinsics>,
    pub initial_distortion: Option<Distortion>,
    pub flags: SolverFlags,
}

/// Solver output: camera, per-view poses and RMS reprojection error (pixels).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub camera: Camera,
    pub extrinsics: Vec<Pose>,
    pub rms: f64,
}

impl Calibration {
    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        self.camera.intrinsics.matrix()
    }

    pub fn distortion_coefficients(&self) -> Vec<f64> {
        self.camera.distortion.coefficients().to_vec()
    }
}

/// Camera calibration backend.
pub trait CalibrationSolver {
    /// Calibrate from planar observations taken at `image_size`.
    ///
    /// Returns one extrinsic pose per observation, in input order.
    fn solve(
        &self,
        observations: &[Observation],
        image_size: ImageSize,
        seeds: &CalibrationSeeds,
    ) -> Result<Calibration, SolverError>;
}

impl<S: CalibrationSolver + ?Sized> CalibrationSolver for &S {
    fn solve(
        &self,
        observations: &[Observation],
        image_size: ImageSize,
        seeds: &CalibrationSeeds,
    ) -> Result<Calibration, SolverError> {
        (**self).solve(observations, image_size, seeds)
    }
}

/// Planar-target solver: homographies, closed-form start, LM refinement of
/// `fx fy cx cy k1 k2 p1 p2 k3` and every view pose.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarSolver {
    pub lm: LmOptions,
}

const INTRINSIC_DIM: usize = 9;
const POSE_DIM: usize = 6;

struct View {
    object: Vec<Point3<f64>>,
    image: Vec<Point2<f64>>,
}

/// Checks shared by calibration and pose estimation.
pub(crate) fn validate_view(
    view: usize,
    object: &[Point3<f64>],
    image_len: usize,
) -> Result<(), SolverError> {
    if object.len() != image_len {
        return Err(SolverError::PointCountMismatch {
            view,
            object: object.len(),
            image: image_len,
        });
    }
    if object.len() < 4 {
        return Err(SolverError::TooFewPoints {
            view,
            count: object.len(),
        });
    }
    let extent = object
        .iter()
        .map(|p| p.x.abs().max(p.y.abs()))
        .fold(0.0f64, f64::max);
    if object.iter().any(|p| p.z.abs() > 1e-9 * extent.max(1.0)) {
        return Err(SolverError::NonPlanarTarget { view });
    }
    Ok(())
}

pub(crate) fn plane_homography(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> Option<Homography> {
    let plane: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    estimate_homography(&plane, image)
}

fn camera_from_params(p: &DVector<f64>, aspect: Option<f64>) -> Camera {
    let fy = aspect.map_or(p[1], |a| p[0] / a);
    Camera::new(
        Intrinsics::new(p[0], fy, p[2], p[3]),
        Distortion::from_slice(&p.as_slice()[4..INTRINSIC_DIM]),
    )
}

fn pose_from_params(p: &DVector<f64>, offset: usize) -> Pose {
    Pose::new(
        Vector3::new(p[offset], p[offset + 1], p[offset + 2]),
        Vector3::new(p[offset + 3], p[offset + 4], p[offset + 5]),
    )
}

/// Pixel residuals of one view, written as `(du, dv)` pairs into `out`.
pub(crate) fn reprojection_residuals(
    camera: &Camera,
    pose: &Pose,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    out: &mut [f64],
) {
    let rot = pose.rotation_matrix();
    for (i, (p, obs)) in object.iter().zip(image).enumerate() {
        let pc = rot * p + pose.translation;
        // Clamp depth so a wild trial step stays finite; LM rejects it anyway.
        let z = if pc.z.abs() < 1e-9 { 1e-9 } else { pc.z };
        let ideal = Point2::new(pc.x / z, pc.y / z);
        let px = camera.intrinsics.to_pixel(camera.distortion.distort(ideal));
        out[2 * i] = px.x - obs.x;
        out[2 * i + 1] = px.y - obs.y;
    }
}

/// Joint reprojection problem over intrinsics, distortion and all poses.
struct PlanarProblem<'a> {
    views: &'a [View],
    /// Row offset of each view in the residual vector.
    offsets: Vec<usize>,
    rows: usize,
    /// `fx / fy` when the aspect ratio is held.
    aspect: Option<f64>,
}

impl<'a> PlanarProblem<'a> {
    fn new(views: &'a [View], aspect: Option<f64>) -> Self {
        let mut offsets = Vec::with_capacity(views.len());
        let mut rows = 0;
        for v in views {
            offsets.push(rows);
            rows += 2 * v.object.len();
        }
        Self {
            views,
            offsets,
            rows,
            aspect,
        }
    }
}

impl NllsProblem for PlanarProblem<'_> {
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let camera = camera_from_params(params, self.aspect);
        let mut r = DVector::zeros(self.rows);
        for (k, view) in self.views.iter().enumerate() {
            let pose = pose_from_params(params, INTRINSIC_DIM + k * POSE_DIM);
            let start = self.offsets[k];
            let out = &mut r.as_mut_slice()[start..start + 2 * view.object.len()];
            reprojection_residuals(&camera, &pose, &view.object, &view.image, out);
        }
        r
    }

    /// Forward differences exploiting that a pose only touches its own view.
    fn jacobian(&self, params: &DVector<f64>, free: &[bool]) -> DMatrix<f64> {
        let r0 = self.residuals(params);
        let mut jac = DMatrix::zeros(self.rows, params.len());
        let mut shifted = params.clone();

        for j in (0..INTRINSIC_DIM).filter(|&j| free[j]) {
            let h = fd_step(params[j]);
            shifted[j] = params[j] + h;
            jac.set_column(j, &((self.residuals(&shifted) - &r0) / h));
            shifted[j] = params[j];
        }

        let camera = camera_from_params(params, self.aspect);
        let mut buf = Vec::new();
        for (k, view) in self.views.iter().enumerate() {
            let base = INTRINSIC_DIM + k * POSE_DIM;
            let start = self.offsets[k];
            buf.resize(2 * view.object.len(), 0.0);
            for j in (base..base + POSE_DIM).filter(|&j| free[j]) {
                let h = fd_step(params[j]);
                shifted[j] = params[j] + h;
                let pose = pose_from_params(&shifted, base);
                reprojection_residuals(&camera, &pose, &view.object, &view.image, &mut buf);
                for (i, v) in buf.iter().enumerate() {
                    jac[(start + i, j)] = (v - r0[start + i]) / h;
                }
                shifted[j] = params[j];
            }
        }
        jac
    }
}

impl PlanarSolver {
    pub fn new(lm: LmOptions) -> Self {
        Self { lm }
    }

    fn initial_intrinsics(
        homographies: &[Homography],
        size: ImageSize,
        flags: &SolverFlags,
    ) -> Intrinsics {
        if !flags.fix_principal_point {
            if let Some(mut k) = zhang_intrinsics(homographies).filter(|k| plausible(k, size)) {
                debug!("closed-form intrinsics from {} views", homographies.len());
                if flags.fix_aspect_ratio {
                    let f = 0.5 * (k.fx + k.fy);
                    k.fx = f;
                    k.fy = f;
                }
                return k;
            }
        }
        if let Some(k) = centered_focal_intrinsics(homographies, size, flags.fix_aspect_ratio)
            .filter(|k| plausible(k, size))
        {
            debug!("intrinsics from orthogonality constraints, centred principal point");
            return k;
        }
        debug!("falling back to focal = max(width, height)");
        default_intrinsics(size)
    }
}

impl CalibrationSolver for PlanarSolver {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(views = observations.len(), size = %image_size))
    )]
    fn solve(
        &self,
        observations: &[Observation],
        image_size: ImageSize,
        seeds: &CalibrationSeeds,
    ) -> Result<Calibration, SolverError> {
        if observations.is_empty() {
            return Err(SolverError::NoObservations);
        }
        if image_size.width == 0 || image_size.height == 0 {
            return Err(SolverError::EmptyImage {
                width: image_size.width,
                height: image_size.height,
            });
        }

        let mut views = Vec::with_capacity(observations.len());
        let mut homographies = Vec::with_capacity(observations.len());
        for (k, obs) in observations.iter().enumerate() {
            validate_view(k, obs.object.points(), obs.image.len())?;
            let view = View {
                object: obs.object.points().to_vec(),
                image: obs.image.to_f64(),
            };
            let h = plane_homography(&view.object, &view.image)
                .ok_or(SolverError::DegenerateView { view: k })?;
            homographies.push(h);
            views.push(view);
        }

        let flags = seeds.flags;
        let intrinsics = seeds
            .initial_intrinsics
            .unwrap_or_else(|| Self::initial_intrinsics(&homographies, image_size, &flags));
        let mut distortion = seeds.initial_distortion.unwrap_or_default();
        if flags.zero_tangent_dist {
            distortion.p1 = 0.0;
            distortion.p2 = 0.0;
        }
        let aspect = flags
            .fix_aspect_ratio
            .then(|| intrinsics.fx / intrinsics.fy);

        let k_mat = intrinsics.matrix();
        let mut params = DVector::zeros(INTRINSIC_DIM + POSE_DIM * views.len());
        params[0] = intrinsics.fx;
        params[1] = intrinsics.fy;
        params[2] = intrinsics.cx;
        params[3] = intrinsics.cy;
        for (i, c) in distortion.coefficients().into_iter().enumerate() {
            params[4 + i] = c;
        }
        for (k, h) in homographies.iter().enumerate() {
            let pose = pose_from_homography(&k_mat, &h.h).ok_or(SolverError::DegenerateView { view: k })?;
            let base = INTRINSIC_DIM + k * POSE_DIM;
            params.rows_mut(base, 3).copy_from(&pose.rotation);
            params.rows_mut(base + 3, 3).copy_from(&pose.translation);
        }

        let mut free = vec![true; params.len()];
        free[1] = aspect.is_none();
        free[2] = !flags.fix_principal_point;
        free[3] = !flags.fix_principal_point;
        if flags.fix_distortion {
            free[4..INTRINSIC_DIM].fill(false);
        } else {
            free[6] = !flags.zero_tangent_dist;
            free[7] = !flags.zero_tangent_dist;
            free[8] = !flags.fix_k3;
        }

        let problem = PlanarProblem::new(&views, aspect);
        let report = self.lm.minimize(&problem, params, &free);
        let params = report.params;
        if params.iter().any(|v| !v.is_finite()) || !report.final_cost.is_finite() {
            return Err(SolverError::NonFinite);
        }

        let camera = camera_from_params(&params, aspect);
        if !camera.intrinsics.is_valid() {
            return Err(SolverError::NonFinite);
        }
        let extrinsics = (0..views.len())
            .map(|k| pose_from_params(&params, INTRINSIC_DIM + k * POSE_DIM))
            .collect();
        let total_points: usize = views.iter().map(|v| v.object.len()).sum();
        let rms = (report.final_cost / total_points as f64).sqrt();

        info!(
            "calibrated {} views: rms {:.4} px after {} evaluations ({:?})",
            views.len(),
            rms,
            report.evaluations,
            report.termination
        );

        Ok(Calibration {
            camera,
            extrinsics,
            rms,
        })
    }
}
