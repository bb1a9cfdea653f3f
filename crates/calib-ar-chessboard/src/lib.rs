//! Chessboard inner-corner detector built on `calib-ar-core`.
//!
//! Pipeline:
//! 1. ChESS corners from `chess-corners`, filtered by strength.
//! 2. Corner orientations (mod π) split into the two diagonal families.
//! 3. Grid axes derived from the two cluster centers.
//! 4. Each corner links to at most one neighbor per axis direction, chosen
//!    from its k nearest neighbors; only mutual links are kept.
//! 5. The largest connected component is labelled by BFS and must fill the
//!    requested `columns x rows` grid exactly, possibly transposed.
//! 6. The grid is emitted row-major, starting from the corner nearest to
//!    the image's top-left among the orientation-preserving relabellings.

mod corner;
mod detector;
mod gridgraph;
mod orientation;
mod params;

pub use corner::Corner;
pub use detector::ChessboardDetector;
pub use gridgraph::{GridGraph, NeighborDirection, NodeNeighbor};
pub use orientation::{cluster_orientations, OrientationClusters, OrientationParams};
pub use params::{ChessCornerParams, ChessboardParams, GridGraphParams};
