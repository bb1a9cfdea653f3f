#![allow(dead_code)]

use calib_ar::solver::{project_points, Distortion, Intrinsics, Pose};
use calib_ar::{object_points, BoardPattern, Camera, CellSize, CornerDetector, Frame, ImagePointSet};
use image::{GrayImage, Rgb};
use nalgebra::{Point2, Vector3};

/// Route library logs to the test harness once.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub fn pattern() -> BoardPattern {
    BoardPattern::new(10, 7).unwrap()
}

pub fn cell() -> CellSize {
    CellSize::new(0.025).unwrap()
}

pub fn camera() -> Camera {
    Camera::new(
        Intrinsics::new(620.0, 610.0, 322.0, 236.0),
        Distortion {
            k1: -0.08,
            k2: 0.02,
            p1: 0.0005,
            p2: -0.0003,
            k3: 0.0,
        },
    )
}

pub fn poses() -> Vec<Pose> {
    vec![
        Pose::new(Vector3::new(0.10, -0.20, 0.02), Vector3::new(-0.11, -0.07, 0.55)),
        Pose::new(Vector3::new(-0.25, 0.05, 0.10), Vector3::new(-0.10, -0.08, 0.60)),
        Pose::new(Vector3::new(0.05, 0.30, -0.05), Vector3::new(-0.12, -0.06, 0.50)),
        Pose::new(Vector3::new(0.30, 0.15, 0.20), Vector3::new(-0.09, -0.09, 0.65)),
        Pose::new(Vector3::new(-0.15, -0.25, -0.15), Vector3::new(-0.13, -0.05, 0.58)),
    ]
}

/// Board corners as seen through `camera()` from every pose.
pub fn views() -> Vec<ImagePointSet> {
    let object = object_points(pattern(), cell());
    let cam = camera();
    poses()
        .iter()
        .map(|pose| {
            project_points(&cam, pose, object.points())
                .into_iter()
                .map(|p| Point2::new(p.x as f32, p.y as f32))
                .collect()
        })
        .collect()
}

/// A black frame whose top-left pixel encodes `index`.
pub fn tagged_frame(index: usize, width: u32, height: u32) -> Frame {
    let mut frame = Frame::new(width, height);
    let v = (10 * index + 5) as u8;
    frame.put_pixel(0, 0, Rgb([v, v, v]));
    frame
}

pub fn tagged_frames(n: usize) -> Vec<Frame> {
    (0..n).map(|i| tagged_frame(i, WIDTH, HEIGHT)).collect()
}

/// Answers with a precomputed corner set chosen by the frame tag.
pub struct Lookup {
    pub views: Vec<Option<ImagePointSet>>,
}

impl Lookup {
    pub fn all() -> Self {
        Self {
            views: views().into_iter().map(Some).collect(),
        }
    }

    pub fn none() -> Self {
        Self { views: Vec::new() }
    }
}

impl CornerDetector for Lookup {
    fn detect(&self, gray: &GrayImage, _pattern: BoardPattern) -> Option<ImagePointSet> {
        let index = (gray.get_pixel(0, 0).0[0] / 10) as usize;
        self.views.get(index).cloned().flatten()
    }
}

/// Four corners centred on `(cx, cy)`, for any frame.
pub struct Square {
    pub cx: f32,
    pub cy: f32,
}

impl CornerDetector for Square {
    fn detect(&self, _gray: &GrayImage, _pattern: BoardPattern) -> Option<ImagePointSet> {
        Some(
            [(-10.0, -10.0), (10.0, -10.0), (-10.0, 10.0), (10.0, 10.0)]
                .into_iter()
                .map(|(dx, dy)| Point2::new(self.cx + dx, self.cy + dy))
                .collect(),
        )
    }
}
