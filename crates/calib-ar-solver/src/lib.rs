//! Planar camera calibration and board pose estimation.
//!
//! - [`PlanarSolver`] implements [`CalibrationSolver`]: per-view DLT
//!   homographies, a closed-form start (Zhang, or centred principal point),
//!   then Levenberg–Marquardt over intrinsics, Brown–Conrady distortion and
//!   every view pose.
//! - [`estimate_pose`] recovers one board pose for a calibrated [`Camera`].
//! - [`project_points`] maps board points to pixels.

mod camera;
mod error;
mod init;
mod lm;
mod planar;
mod pose;

pub use camera::{project_points, Camera, Distortion, Intrinsics, Pose};
pub use error::SolverError;
pub use init::{centered_focal_intrinsics, default_intrinsics, pose_from_homography, zhang_intrinsics};
pub use levenberg_marquardt::TerminationReason;
pub use lm::{forward_difference_jacobian, LmOptions, LmReport, NllsProblem};
pub use planar::{
    Calibration, CalibrationSeeds, CalibrationSolver, Observation, PlanarSolver, SolverFlags,
};
pub use pose::estimate_pose;
