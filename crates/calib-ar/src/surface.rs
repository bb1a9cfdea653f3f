//! Display and keyboard seam used by the interactive stages.

use crate::error::SurfaceError;
use calib_ar_core::Frame;
use log::{debug, warn};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::time::Duration;

/// A key press read from a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Space,
    Enter,
    Escape,
    Char(char),
    Other(i32),
}

impl Key {
    /// Decode a HighGUI-style key code; negative codes mean "no key".
    pub fn from_code(code: i32) -> Option<Self> {
        if code < 0 {
            return None;
        }
        Some(match code & 0xFF {
            32 => Self::Space,
            10 | 13 => Self::Enter,
            27 => Self::Escape,
            c @ 33..=126 => Self::Char(c as u8 as char),
            _ => Self::Other(code),
        })
    }
}

/// What a key means to the frame selector and the playback loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Pause,
    Commit,
    Exit,
    Other,
}

impl Command {
    pub fn from_key(key: Key) -> Self {
        match key {
            Key::Space => Self::Pause,
            Key::Enter => Self::Commit,
            Key::Escape => Self::Exit,
            _ => Self::Other,
        }
    }
}

/// How long [`Surface::poll`] may block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Return `None` once the duration passes without input.
    Bounded(Duration),
    /// Block until a key arrives.
    Unbounded,
}

impl Wait {
    pub fn millis(ms: u64) -> Self {
        Self::Bounded(Duration::from_millis(ms))
    }
}

/// A window (or stand-in) that shows frames and reports key presses.
pub trait Surface {
    /// Display `frame`; an empty `caption` draws no text.
    fn show(&mut self, frame: &Frame, caption: &str) -> Result<(), SurfaceError>;

    fn poll(&mut self, wait: Wait) -> Result<Option<Key>, SurfaceError>;

    /// Release the window. Called once at the end of a phase.
    fn teardown(&mut self) -> Result<(), SurfaceError>;
}

impl<S: Surface + ?Sized> Surface for &mut S {
    fn show(&mut self, frame: &Frame, caption: &str) -> Result<(), SurfaceError> {
        (**self).show(frame, caption)
    }

    fn poll(&mut self, wait: Wait) -> Result<Option<Key>, SurfaceError> {
        (**self).poll(wait)
    }

    fn teardown(&mut self) -> Result<(), SurfaceError> {
        (**self).teardown()
    }
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn show(&mut self, frame: &Frame, caption: &str) -> Result<(), SurfaceError> {
        (**self).show(frame, caption)
    }

    fn poll(&mut self, wait: Wait) -> Result<Option<Key>, SurfaceError> {
        (**self).poll(wait)
    }

    fn teardown(&mut self) -> Result<(), SurfaceError> {
        (**self).teardown()
    }
}

/// Tears the wrapped surface down when dropped.
///
/// Use [`SurfaceGuard::finish`] to observe the teardown error; on drop it is
/// only logged.
pub struct SurfaceGuard<S: Surface> {
    surface: S,
    active: bool,
}

impl<S: Surface> SurfaceGuard<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            active: true,
        }
    }

    pub fn finish(mut self) -> Result<(), SurfaceError> {
        self.active = false;
        self.surface.teardown()
    }
}

impl<S: Surface> Deref for SurfaceGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.surface
    }
}

impl<S: Surface> DerefMut for SurfaceGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

impl<S: Surface> Drop for SurfaceGuard<S> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.surface.teardown() {
                warn!("surface teardown failed: {err}");
            }
        }
    }
}

/// A surface without a window, driven by a scripted key queue.
///
/// Each poll consumes one script entry; `None` entries are timeouts. A
/// bounded poll on an exhausted script times out, an unbounded one reads
/// `Escape` (input closed). Shown frames may be written as numbered PNG
/// files and kept in memory.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    script: VecDeque<Option<Key>>,
    output_dir: Option<PathBuf>,
    keep_frames: bool,
    frames: Vec<Frame>,
    captions: Vec<String>,
    shown: usize,
    teardowns: usize,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key press.
    pub fn press(mut self, key: Key) -> Self {
        self.script.push_back(Some(key));
        self
    }

    /// Queue `polls` timeouts.
    pub fn idle(mut self, polls: usize) -> Self {
        self.script.extend(std::iter::repeat(None).take(polls));
        self
    }

    /// Write every shown frame to `dir` as `frame_00000.png`, ...
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Keep a copy of every shown frame.
    pub fn recording(mut self) -> Self {
        self.keep_frames = true;
        self
    }

    pub fn captions(&self) -> &[String] {
        &self.captions
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn shown(&self) -> usize {
        self.shown
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns
    }
}

impl Surface for HeadlessSurface {
    fn show(&mut self, frame: &Frame, caption: &str) -> Result<(), SurfaceError> {
        if let Some(dir) = &self.output_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("frame_{:05}.png", self.shown));
            frame
                .save(&path)
                .map_err(|source| SurfaceError::Write { path, source })?;
        }
        if self.keep_frames {
            self.frames.push(frame.clone());
        }
        self.captions.push(caption.to_owned());
        self.shown += 1;
        Ok(())
    }

    fn poll(&mut self, wait: Wait) -> Result<Option<Key>, SurfaceError> {
        match wait {
            Wait::Bounded(_) => Ok(self.script.pop_front().flatten()),
            Wait::Unbounded => {
                while let Some(entry) = self.script.pop_front() {
                    if entry.is_some() {
                        return Ok(entry);
                    }
                }
                debug!("headless input exhausted, reading Escape");
                Ok(Some(Key::Escape))
            }
        }
    }

    fn teardown(&mut self) -> Result<(), SurfaceError> {
        self.teardowns += 1;
        Ok(())
    }
}
