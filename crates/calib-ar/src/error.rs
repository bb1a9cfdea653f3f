use calib_ar_core::{ImageSize, PatternError};
use calib_ar_solver::SolverError;
use std::path::PathBuf;

/// Opening or reading a frame source.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("cannot read any frame from {0}")]
    UnreadableSource(String),

    #[error("unsupported source {0} (video files need the `opencv` feature)")]
    UnsupportedSource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "opencv")]
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// Display / input surface failures.
#[derive(thiserror::Error, Debug)]
pub enum SurfaceError {
    #[error("cannot write frame to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "opencv")]
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// Calibration engine failures.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("no selected frame contains a detectable {columns}x{rows} chessboard")]
    InsufficientObservations { columns: u32, rows: u32 },

    #[error("frame {index} is {found}, earlier frames are {expected}")]
    FrameSizeMismatch {
        index: usize,
        expected: ImageSize,
        found: ImageSize,
    },

    #[error("calibration failed: {0}")]
    CalibrationFailed(#[from] SolverError),
}

/// Loading the JSON configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("no frame source given (set `source` or pass a path)")]
    MissingSource,

    #[error("unknown log level {0:?}")]
    LogLevel(String),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Any fatal condition of an end-to-end run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no frames were selected for calibration")]
    NoFramesSelected,
}
