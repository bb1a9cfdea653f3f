//! OpenCV-backed video source and HighGUI window.

use crate::error::{StreamError, SurfaceError};
use crate::source::FrameSource;
use crate::surface::{Key, Surface, Wait};
use calib_ar_core::Frame;
use log::{debug, warn};
use opencv::core::{AlgorithmHint, Mat, Point, Scalar, CV_8UC3};
use opencv::prelude::*;
use opencv::{highgui, imgproc, videoio};
use std::path::Path;

fn mat_to_frame(bgr: &Mat, rgb: &mut Mat) -> opencv::Result<Frame> {
    imgproc::cvt_color(
        bgr,
        rgb,
        imgproc::COLOR_BGR2RGB,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    let (w, h) = (rgb.cols() as u32, rgb.rows() as u32);
    let data = rgb.data_bytes()?.to_vec();
    Frame::from_raw(w, h, data).ok_or_else(|| {
        opencv::Error::new(
            opencv::core::StsUnmatchedSizes,
            format!("frame buffer does not match {w}x{h} RGB"),
        )
    })
}

fn frame_to_mat(frame: &Frame) -> opencv::Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(frame.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(
        &rgb,
        &mut bgr,
        imgproc::COLOR_RGB2BGR,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    Ok(bgr)
}

/// Video decoded through `VideoCapture`.
pub struct VideoFile {
    capture: videoio::VideoCapture,
    bgr: Mat,
    rgb: Mat,
}

impl VideoFile {
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let name = path.display().to_string();
        let capture = videoio::VideoCapture::from_file(&name, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(StreamError::UnreadableSource(name));
        }
        debug!("opened video {name}");
        Ok(Self {
            capture,
            bgr: Mat::default(),
            rgb: Mat::default(),
        })
    }
}

impl FrameSource for VideoFile {
    fn read_next(&mut self) -> Option<Frame> {
        match self.capture.read(&mut self.bgr) {
            Ok(true) if !self.bgr.empty() => match mat_to_frame(&self.bgr, &mut self.rgb) {
                Ok(frame) => Some(frame),
                Err(err) => {
                    warn!("dropping video stream: {err}");
                    None
                }
            },
            Ok(_) => None,
            Err(err) => {
                warn!("video read failed: {err}");
                None
            }
        }
    }
}

/// A named HighGUI window.
pub struct HighGuiSurface {
    window: String,
}

impl HighGuiSurface {
    pub fn open(window: impl Into<String>) -> Result<Self, SurfaceError> {
        let window = window.into();
        highgui::named_window(&window, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { window })
    }
}

impl Surface for HighGuiSurface {
    fn show(&mut self, frame: &Frame, caption: &str) -> Result<(), SurfaceError> {
        let mut mat = frame_to_mat(frame)?;
        if !caption.is_empty() {
            imgproc::put_text(
                &mut mat,
                caption,
                Point::new(10, 25),
                imgproc::FONT_HERSHEY_DUPLEX,
                0.6,
                Scalar::new(0.0, 255.0, 0.0, 0.0),
                1,
                imgproc::LINE_8,
                false,
            )?;
        }
        highgui::imshow(&self.window, &mat)?;
        Ok(())
    }

    fn poll(&mut self, wait: Wait) -> Result<Option<Key>, SurfaceError> {
        let delay = match wait {
            Wait::Bounded(d) => d.as_millis().clamp(1, i32::MAX as u128) as i32,
            Wait::Unbounded => 0,
        };
        Ok(Key::from_code(highgui::wait_key(delay)?))
    }

    fn teardown(&mut self) -> Result<(), SurfaceError> {
        highgui::destroy_window(&self.window)?;
        Ok(())
    }
}
