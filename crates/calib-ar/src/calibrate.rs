use crate::error::CalibrationError;
use crate::selector::SelectedFrame;
use calib_ar_core::{
    luminance, object_points, BoardPattern, CellSize, CornerDetector, ImageSize, ObjectPointSet,
};
use calib_ar_solver::{Calibration, CalibrationSeeds, CalibrationSolver, Camera, Observation, Pose};
use log::{debug, info};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Result of a calibration run. Held in memory only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub camera: Camera,
    /// RMS reprojection error in pixels.
    pub rms: f64,
    /// One board pose per observation used, in selection order.
    pub extrinsics: Vec<Pose>,
    pub image_size: ImageSize,
}

impl CameraModel {
    fn from_calibration(calibration: Calibration, image_size: ImageSize) -> Self {
        Self {
            camera: calibration.camera,
            rms: calibration.rms,
            extrinsics: calibration.extrinsics,
            image_size,
        }
    }

    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        self.camera.intrinsics.matrix()
    }

    /// `[k1, k2, p1, p2, k3]`.
    pub fn distortion(&self) -> Vec<f64> {
        self.camera.distortion.coefficients().to_vec()
    }
}

/// Detects the board in each selected frame and runs the solver once.
pub struct CalibrationEngine<D, S> {
    detector: D,
    solver: S,
}

impl<D: CornerDetector, S: CalibrationSolver> CalibrationEngine<D, S> {
    pub fn new(detector: D, solver: S) -> Self {
        Self { detector, solver }
    }

    /// Calibrate from `frames`.
    ///
    /// Frames where the board is not found are skipped. All remaining frames
    /// must share one size.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(frames = frames.len()))
    )]
    pub fn calibrate(
        &self,
        frames: &[SelectedFrame],
        pattern: BoardPattern,
        cell_size: CellSize,
        seeds: &CalibrationSeeds,
    ) -> Result<CameraModel, CalibrationError> {
        let object = object_points(pattern, cell_size);
        let (observations, image_size) = self.observe(frames, pattern, &object)?;

        info!(
            "calibrating from {} of {} frames at {image_size}",
            observations.len(),
            frames.len()
        );
        let calibration = self.solver.solve(&observations, image_size, seeds)?;
        let model = CameraModel::from_calibration(calibration, image_size);
        log_model(&model);
        Ok(model)
    }

    fn observe(
        &self,
        frames: &[SelectedFrame],
        pattern: BoardPattern,
        object: &ObjectPointSet,
    ) -> Result<(Vec<Observation>, ImageSize), CalibrationError> {
        let mut observations = Vec::new();
        let mut image_size: Option<ImageSize> = None;

        for (index, selected) in frames.iter().enumerate() {
            let Some(corners) = self.detector.detect(&luminance(selected.frame()), pattern) else {
                debug!("frame {index}: chessboard not found, skipped");
                continue;
            };
            let size = ImageSize::of(selected.frame());
            match image_size {
                None => image_size = Some(size),
                Some(expected) if expected != size => {
                    return Err(CalibrationError::FrameSizeMismatch {
                        index,
                        expected,
                        found: size,
                    });
                }
                Some(_) => {}
            }
            observations.push(Observation::new(object.clone(), corners));
        }

        match image_size {
            Some(size) => Ok((observations, size)),
            None => Err(CalibrationError::InsufficientObservations {
                columns: pattern.columns(),
                rows: pattern.rows(),
            }),
        }
    }
}

fn log_model(model: &CameraModel) {
    let k = model.intrinsic_matrix();
    info!("rms reprojection error: {:.4} px", model.rms);
    info!(
        "intrinsic matrix: [[{:.3}, {:.3}, {:.3}], [{:.3}, {:.3}, {:.3}], [{:.3}, {:.3}, {:.3}]]",
        k[(0, 0)],
        k[(0, 1)],
        k[(0, 2)],
        k[(1, 0)],
        k[(1, 1)],
        k[(1, 2)],
        k[(2, 0)],
        k[(2, 1)],
        k[(2, 2)]
    );
    info!("distortion [k1 k2 p1 p2 k3]: {:.6?}", model.distortion());
}
