//! End-to-end run: select frames, calibrate, then replay with the overlay.

use crate::calibrate::{CalibrationEngine, CameraModel};
use crate::config::AppConfig;
use crate::error::{ConfigError, PipelineError, SurfaceError};
use crate::overlay::{PlaybackSummary, PoseOverlay};
use crate::selector::{select_all, FrameSelector, SelectionMode};
use crate::source::SourceSpec;
use crate::surface::{HeadlessSurface, Surface, SurfaceGuard};
use calib_ar_chessboard::ChessboardDetector;
use calib_ar_core::CornerDetector;
use log::info;

/// Which stage is asking for a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Selection,
    Playback,
}

/// Outcome of a successful run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub selected: usize,
    pub model: CameraModel,
    pub playback: PlaybackSummary,
}

pub struct Pipeline<D = ChessboardDetector> {
    config: AppConfig,
    detector: D,
}

impl Pipeline {
    /// Pipeline with the ChESS chessboard detector from `config.chessboard`.
    pub fn new(config: AppConfig) -> Self {
        let detector = ChessboardDetector::new(config.chessboard.clone());
        Self { config, detector }
    }
}

impl<D: CornerDetector> Pipeline<D> {
    pub fn with_detector(config: AppConfig, detector: D) -> Self {
        Self { config, detector }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run with the default surfaces: a HighGUI window when built with
    /// `opencv`, a headless surface otherwise or when playback writes to
    /// `playback.output_dir`.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        self.run_with(|phase| self.default_surface(phase))
    }

    /// Run, opening one surface per phase through `open_surface`.
    ///
    /// Each surface is torn down when its phase ends, on success or error.
    pub fn run_with<U, F>(&self, mut open_surface: F) -> Result<RunReport, PipelineError>
    where
        U: Surface,
        F: FnMut(Phase) -> Result<U, SurfaceError>,
    {
        let cfg = &self.config;
        let spec = SourceSpec::from_path(cfg.source.clone().ok_or(ConfigError::MissingSource)?);
        let detector = &self.detector;

        let mut stream = spec.open()?;
        let selected = match cfg.selection.mode {
            SelectionMode::All => select_all(&mut stream),
            SelectionMode::Interactive => {
                let mut surface = SurfaceGuard::new(open_surface(Phase::Selection)?);
                let selected = FrameSelector::new(detector, cfg.pattern)
                    .with_wait_ms(cfg.selection.wait_ms)
                    .run(&mut stream, &mut *surface)?;
                surface.finish()?;
                selected
            }
        };
        drop(stream);
        if selected.is_empty() {
            return Err(PipelineError::NoFramesSelected);
        }

        let engine = CalibrationEngine::new(detector, &cfg.solver);
        let model = engine.calibrate(&selected, cfg.pattern, cfg.cell_size, &cfg.seeds)?;

        info!("replaying {spec} with the AR overlay");
        let overlay = PoseOverlay::new(detector, cfg.pattern, cfg.ar.clone())
            .with_camera(model.camera, cfg.cell_size);
        let mut stream = spec.open()?;
        let mut surface = SurfaceGuard::new(open_surface(Phase::Playback)?);
        let playback = overlay.run(&mut stream, &mut *surface, cfg.playback.wait_ms)?;
        surface.finish()?;

        Ok(RunReport {
            selected: selected.len(),
            model,
            playback,
        })
    }

    fn default_surface(&self, phase: Phase) -> Result<Box<dyn Surface>, SurfaceError> {
        if phase == Phase::Playback {
            if let Some(dir) = &self.config.playback.output_dir {
                return Ok(Box::new(HeadlessSurface::new().with_output_dir(dir.clone())));
            }
        }
        self.window(phase)
    }

    #[cfg(feature = "opencv")]
    fn window(&self, phase: Phase) -> Result<Box<dyn Surface>, SurfaceError> {
        let name = match phase {
            Phase::Selection => &self.config.selection.window_name,
            Phase::Playback => &self.config.playback.window_name,
        };
        Ok(Box::new(crate::cv::HighGuiSurface::open(name.as_str())?))
    }

    #[cfg(not(feature = "opencv"))]
    fn window(&self, phase: Phase) -> Result<Box<dyn Surface>, SurfaceError> {
        log::warn!("built without `opencv`: {phase:?} runs without a window");
        Ok(Box::new(HeadlessSurface::new()))
    }
}
