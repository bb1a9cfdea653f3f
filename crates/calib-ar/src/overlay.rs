//! Per-frame AR overlay anchored on the detected chessboard.
//!
//! [`ArStyle::FlatRing`] draws a ring of diametric segments around the
//! centroid of the detected corners, in image space. [`ArStyle::Extruded`]
//! estimates the board pose with the calibrated camera and draws a cylinder
//! standing on the board: base ring, top ring `height` above it, struts.

use crate::draw::{draw_line, fill_circle};
use crate::error::SurfaceError;
use crate::source::{FrameSource, FrameStream};
use crate::surface::{Command, Surface, Wait};
use calib_ar_core::{
    luminance, object_points, BoardPattern, CellSize, CornerDetector, Frame, ImagePointSet,
    ObjectPointSet,
};
use calib_ar_solver::{estimate_pose, project_points, Camera};
use image::Rgb;
use log::{debug, info};
use nalgebra::{Point2, Point3};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::f64::consts::PI;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArStyle {
    #[default]
    FlatRing,
    Extruded,
}

/// Rejects negative, NaN and infinite lengths at load time.
fn length<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = f64::deserialize(d)?;
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(D::Error::custom(format!(
            "length must be finite and non-negative (got {v})"
        )))
    }
}

/// Appearance of the overlay object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArObject {
    /// Ring radius; pixels for the flat ring, AR units when extruded.
    #[serde(deserialize_with = "length")]
    pub radius: f64,
    /// Cylinder height in AR units. Only [`ArStyle::Extruded`] uses it.
    #[serde(deserialize_with = "length")]
    pub height: f64,
    /// RGB.
    pub color: [u8; 3],
    pub thickness: u32,
    pub marker_radius: u32,
    pub segments: usize,
    /// Length of one AR unit in board units (millimetres for a board
    /// measured in metres).
    #[serde(deserialize_with = "length")]
    pub unit_length: f64,
    pub style: ArStyle,
}

impl Default for ArObject {
    fn default() -> Self {
        Self {
            radius: 50.0,
            height: 100.0,
            color: [0, 255, 0],
            thickness: 2,
            marker_radius: 2,
            segments: 50,
            unit_length: 1e-3,
            style: ArStyle::FlatRing,
        }
    }
}

impl ArObject {
    fn rgb(&self) -> Rgb<u8> {
        Rgb(self.color)
    }
}

/// Segment `i` joins `center + r(cos θ, sin θ)` to the opposite point on the
/// ring, `θ = 2πi / segments`.
pub fn ring_segments(
    center: Point2<f64>,
    radius: f64,
    segments: usize,
) -> Vec<(Point2<f64>, Point2<f64>)> {
    (0..segments)
        .map(|i| {
            let theta = 2.0 * PI * i as f64 / segments as f64;
            let at = |a: f64| Point2::new(center.x + radius * a.cos(), center.y + radius * a.sin());
            (at(theta), at(theta + PI))
        })
        .collect()
}

fn default_wait_ms() -> u64 {
    10
}

fn default_window_name() -> String {
    "AR Object on Chessboard".to_owned()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub wait_ms: u64,
    pub window_name: String,
    /// Write rendered frames here instead of opening a window.
    pub output_dir: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            wait_ms: default_wait_ms(),
            window_name: default_window_name(),
            output_dir: None,
        }
    }
}

/// Counts from one playback run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub frames: usize,
    /// Frames where the board was found and the object drawn.
    pub anchored: usize,
    /// Playback ended on `Escape` rather than end of stream.
    pub stopped: bool,
}

/// Stateless per-frame renderer.
pub struct PoseOverlay<D> {
    detector: D,
    pattern: BoardPattern,
    ar: ArObject,
    board: Option<(Camera, ObjectPointSet)>,
}

impl<D: CornerDetector> PoseOverlay<D> {
    pub fn new(detector: D, pattern: BoardPattern, ar: ArObject) -> Self {
        Self {
            detector,
            pattern,
            ar,
            board: None,
        }
    }

    /// Calibrated camera and board scale, needed by [`ArStyle::Extruded`].
    /// Without them the extruded style falls back to the flat ring.
    pub fn with_camera(mut self, camera: Camera, cell_size: CellSize) -> Self {
        self.board = Some((camera, object_points(self.pattern, cell_size)));
        self
    }

    pub fn ar(&self) -> &ArObject {
        &self.ar
    }

    /// Detect the board and draw the object into `frame`.
    ///
    /// Returns whether the board was found; if not, `frame` is untouched.
    pub fn render(&self, frame: &mut Frame) -> bool {
        let Some(corners) = self.detector.detect(&luminance(frame), self.pattern) else {
            return false;
        };
        match (self.ar.style, &self.board) {
            (ArStyle::Extruded, Some((camera, object))) => {
                if !self.draw_extruded(frame, camera, object, &corners) {
                    debug!("pose estimation failed, drawing flat ring");
                    self.draw_flat(frame, &corners);
                }
            }
            _ => self.draw_flat(frame, &corners),
        }
        true
    }

    fn draw_flat(&self, frame: &mut Frame, corners: &ImagePointSet) {
        let Some(center) = corners.centroid() else {
            return;
        };
        let color = self.ar.rgb();
        for (a, b) in ring_segments(center, self.ar.radius, self.ar.segments) {
            draw_line(frame, a, b, color, self.ar.thickness);
            fill_circle(frame, a, self.ar.marker_radius, color);
            fill_circle(frame, b, self.ar.marker_radius, color);
        }
    }

    fn draw_extruded(
        &self,
        frame: &mut Frame,
        camera: &Camera,
        object: &ObjectPointSet,
        corners: &ImagePointSet,
    ) -> bool {
        let Some(pose) = estimate_pose(camera, object.points(), &corners.to_f64()) else {
            return false;
        };
        let n = self.ar.segments;
        if n == 0 {
            return true;
        }
        let c = object.centroid();
        let r = self.ar.radius * self.ar.unit_length;
        // Board z points away from the camera, so "up" is -z.
        let h = self.ar.height * self.ar.unit_length;

        let mut ring: Vec<Point3<f64>> = Vec::with_capacity(2 * n);
        for z in [0.0, -h] {
            ring.extend((0..n).map(|i| {
                let theta = 2.0 * PI * i as f64 / n as f64;
                Point3::new(c.x + r * theta.cos(), c.y + r * theta.sin(), z)
            }));
        }
        let projected = project_points(camera, &pose, &ring);
        let (base, top) = projected.split_at(n);

        let color = self.ar.rgb();
        // Points behind the camera project to NaN and are skipped by the rasteriser.
        for i in 0..n {
            let j = (i + 1) % n;
            draw_line(frame, base[i], base[j], color, self.ar.thickness);
            draw_line(frame, top[i], top[j], color, self.ar.thickness);
            draw_line(frame, base[i], top[i], color, self.ar.thickness);
        }
        for p in top {
            fill_circle(frame, *p, self.ar.marker_radius, color);
        }
        true
    }

    /// Render and show every frame until end of stream or `Escape`.
    pub fn run<S, U>(
        &self,
        stream: &mut FrameStream<S>,
        surface: &mut U,
        wait_ms: u64,
    ) -> Result<PlaybackSummary, SurfaceError>
    where
        S: FrameSource,
        U: Surface + ?Sized,
    {
        let mut summary = PlaybackSummary::default();
        for mut frame in stream.by_ref() {
            summary.frames += 1;
            if self.render(&mut frame) {
                summary.anchored += 1;
            }
            surface.show(&frame, "")?;
            if let Some(key) = surface.poll(Wait::millis(wait_ms))? {
                if Command::from_key(key) == Command::Exit {
                    summary.stopped = true;
                    break;
                }
            }
        }
        info!(
            "playback: {} frames, board found in {}{}",
            summary.frames,
            summary.anchored,
            if summary.stopped { " (stopped)" } else { "" }
        );
        Ok(summary)
    }
}
