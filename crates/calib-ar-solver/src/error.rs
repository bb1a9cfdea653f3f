/// Failures of the calibration and pose solvers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("no observations to calibrate from")]
    NoObservations,

    #[error("view {view}: {object} object points but {image} image points")]
    PointCountMismatch {
        view: usize,
        object: usize,
        image: usize,
    },

    #[error("view {view}: {count} points, at least 4 are required")]
    TooFewPoints { view: usize, count: usize },

    #[error("view {view}: board points are not planar (z = 0)")]
    NonPlanarTarget { view: usize },

    #[error("view {view}: board-to-image homography is degenerate")]
    DegenerateView { view: usize },

    #[error("image size {width}x{height} is empty")]
    EmptyImage { width: u32, height: u32 },

    #[error("refinement produced non-finite parameters")]
    NonFinite,
}
