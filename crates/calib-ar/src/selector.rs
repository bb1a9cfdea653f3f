//! Interactive frame selection for calibration.
//!
//! Browsing shows every frame with the running selection count. `Space`
//! pauses and previews the detected corners, `Enter` in the preview keeps
//! the frame, `Escape` ends the selection from either state.

use crate::draw::draw_chessboard_corners;
use crate::error::SurfaceError;
use crate::source::{FrameSource, FrameStream};
use crate::surface::{Command, Surface, Wait};
use calib_ar_core::{luminance, BoardPattern, CornerDetector, Frame, ImagePointSet};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// How frames are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Keyboard-driven browsing with a corner preview.
    #[default]
    Interactive,
    /// Take every frame, no detection and no display.
    All,
}

fn default_wait_ms() -> u64 {
    10
}

fn default_window_name() -> String {
    "Camera Calibration".to_owned()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub mode: SelectionMode,
    /// Browse-time key wait per frame.
    pub wait_ms: u64,
    pub window_name: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Interactive,
            wait_ms: default_wait_ms(),
            window_name: default_window_name(),
        }
    }
}

/// A frame kept for calibration, with the corners found while previewing.
///
/// Read-only once committed.
#[derive(Clone, Debug)]
pub struct SelectedFrame {
    frame: Frame,
    corners: Option<ImagePointSet>,
}

impl SelectedFrame {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            corners: None,
        }
    }

    pub(crate) fn with_corners(frame: Frame, corners: Option<ImagePointSet>) -> Self {
        Self { frame, corners }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Corners from the preview step; `None` for frames committed without one.
    pub fn corners(&self) -> Option<&ImagePointSet> {
        self.corners.as_ref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectorState {
    Browsing,
    CornersPreview,
    Done,
}

/// Browse/preview/commit state machine over a frame stream.
pub struct FrameSelector<D> {
    detector: D,
    pattern: BoardPattern,
    wait_ms: u64,
    state: SelectorState,
    selected: Vec<SelectedFrame>,
}

/// Every frame of `stream`, in order, without corners.
pub fn select_all<S: FrameSource>(stream: &mut FrameStream<S>) -> Vec<SelectedFrame> {
    let selected: Vec<SelectedFrame> = stream.map(SelectedFrame::new).collect();
    info!("selected all {} frames", selected.len());
    selected
}

impl<D: CornerDetector> FrameSelector<D> {
    pub fn new(detector: D, pattern: BoardPattern) -> Self {
        Self {
            detector,
            pattern,
            wait_ms: default_wait_ms(),
            state: SelectorState::Browsing,
            selected: Vec::new(),
        }
    }

    /// Browse-time key wait in milliseconds.
    pub fn with_wait_ms(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn selected(&self) -> &[SelectedFrame] {
        &self.selected
    }

    pub fn caption(&self) -> String {
        format!("NSelect: {}", self.selected.len())
    }

    /// Drive the state machine until `Exit` or end of stream.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn run<S, U>(
        mut self,
        stream: &mut FrameStream<S>,
        surface: &mut U,
    ) -> Result<Vec<SelectedFrame>, SurfaceError>
    where
        S: FrameSource,
        U: Surface + ?Sized,
    {
        for frame in stream.by_ref() {
            self.step(frame, surface)?;
            if self.state == SelectorState::Done {
                break;
            }
        }
        self.state = SelectorState::Done;
        info!("selected {} frames", self.selected.len());
        Ok(self.selected)
    }

    /// Handle one frame while browsing, including any preview it triggers.
    pub fn step<U: Surface + ?Sized>(
        &mut self,
        frame: Frame,
        surface: &mut U,
    ) -> Result<(), SurfaceError> {
        if self.state == SelectorState::Done {
            return Ok(());
        }
        let caption = self.caption();
        surface.show(&frame, &caption)?;

        let command = surface
            .poll(Wait::millis(self.wait_ms))?
            .map(Command::from_key);
        match command {
            Some(Command::Exit) => self.state = SelectorState::Done,
            Some(Command::Pause) => self.preview(frame, &caption, surface)?,
            _ => {}
        }
        Ok(())
    }

    fn preview<U: Surface + ?Sized>(
        &mut self,
        frame: Frame,
        caption: &str,
        surface: &mut U,
    ) -> Result<(), SurfaceError> {
        self.state = SelectorState::CornersPreview;
        let corners = self.detector.detect(&luminance(&frame), self.pattern);

        let mut display = frame.clone();
        match &corners {
            Some(c) => draw_chessboard_corners(&mut display, self.pattern, c),
            None => debug!("no chessboard in paused frame"),
        }
        surface.show(&display, caption)?;

        let command = surface.poll(Wait::Unbounded)?.map(Command::from_key);
        self.state = match command {
            Some(Command::Commit) => {
                self.selected.push(SelectedFrame::with_corners(frame, corners));
                info!("frame committed ({} selected)", self.selected.len());
                SelectorState::Browsing
            }
            Some(Command::Exit) => SelectorState::Done,
            _ => SelectorState::Browsing,
        };
        Ok(())
    }
}
