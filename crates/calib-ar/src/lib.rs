//! Chessboard camera calibration from a video and a pose-anchored AR overlay.
//!
//! A run has three stages:
//! - [`selector`]: browse the frames, pause on one to preview the detected
//!   corners and keep it, or take every frame ([`SelectionMode::All`]).
//! - [`calibrate`]: detect the board in the kept frames and solve for the
//!   intrinsics, distortion and one pose per frame.
//! - [`overlay`]: replay the source and draw an object anchored on the
//!   board in every frame where it is found.
//!
//! [`Pipeline`] wires them together from an [`AppConfig`]. Frames come from
//! a [`FrameSource`] and are shown on a [`Surface`]; both are traits so the
//! stages run headless in tests.
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_ar::{AppConfig, Pipeline, SelectionMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = AppConfig::default();
//! config.source = Some("frames/".into());
//! config.selection.mode = SelectionMode::All;
//! config.playback.output_dir = Some("overlay/".into());
//!
//! let report = Pipeline::new(config).run()?;
//! println!("rms = {:.3} px", report.model.rms);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//! - `cli` (default): the `calib-ar` binary.
//! - `opencv`: video files through `VideoCapture` and HighGUI windows.
//! - `tracing`: spans on the heavy stages and a `tracing-subscriber` logger.

pub use calib_ar_chessboard as chessboard;
pub use calib_ar_core as core;
pub use calib_ar_solver as solver;

pub mod calibrate;
pub mod config;
pub mod draw;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod selector;
pub mod source;
pub mod surface;

#[cfg(feature = "opencv")]
pub mod cv;

pub use calibrate::{CalibrationEngine, CameraModel};
pub use config::AppConfig;
pub use error::{CalibrationError, ConfigError, PipelineError, StreamError, SurfaceError};
pub use overlay::{ring_segments, ArObject, ArStyle, PlaybackConfig, PlaybackSummary, PoseOverlay};
pub use pipeline::{Phase, Pipeline, RunReport};
pub use selector::{
    select_all, FrameSelector, SelectedFrame, SelectionConfig, SelectionMode, SelectorState,
};
pub use source::{FrameSource, FrameStream, ImageSequence, MemorySource, SourceSpec};
pub use surface::{Command, HeadlessSurface, Key, Surface, SurfaceGuard, Wait};

pub use calib_ar_chessboard::{ChessboardDetector, ChessboardParams};
pub use calib_ar_core::{
    object_points, BoardPattern, CellSize, CornerDetector, Frame, ImagePointSet, ImageSize,
    ObjectPointSet,
};
pub use calib_ar_solver::{CalibrationSeeds, CalibrationSolver, Camera, PlanarSolver, SolverFlags};
