//! Core types for chessboard calibration and AR overlays.
//!
//! This crate is intentionally small and purely geometric. It defines the
//! board layout, the point sets exchanged between stages, the frame type and
//! the [`CornerDetector`] seam. It does *not* depend on any concrete corner
//! detector or solver.

mod detector;
mod frame;
mod homography;
mod logger;
mod pattern;
mod points;

pub use detector::CornerDetector;
pub use frame::{luminance, Frame, ImageSize};
pub use homography::{estimate_homography, Homography};
pub use pattern::{object_points, BoardPattern, CellSize, ObjectPointSet, PatternError};
pub use points::ImagePointSet;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{filter_directive, init_with_level, parse_level};
