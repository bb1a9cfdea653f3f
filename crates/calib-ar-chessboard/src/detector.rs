use crate::gridgraph::GridGraph;
use crate::orientation::cluster_orientations;
use crate::params::ChessboardParams;
use crate::Corner;
use calib_ar_core::{BoardPattern, CornerDetector, ImagePointSet};
use chess_corners::{find_chess_corners_image, ChessConfig, ThresholdMode};
use log::{debug, warn};
use nalgebra::Point2;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Chessboard detector: ChESS corners, orientation clusters, grid graph.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    params: ChessboardParams,
}

/// Integer grid recovered from one connected component.
struct LabelledGrid {
    width: usize,
    height: usize,
    cells: HashMap<(usize, usize), Point2<f32>>,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    pub fn chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.threshold_mode = ThresholdMode::Relative;
        cfg.threshold_value = self.params.chess.threshold_rel;
        cfg.nms_radius = self.params.chess.nms_radius;
        cfg
    }

    /// Raw ChESS corners of a luminance image; empty if ChESS rejects the input.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, gray), fields(width = gray.width(), height = gray.height()))
    )]
    pub fn detect_corners(&self, gray: &image::GrayImage) -> Vec<Corner> {
        match find_chess_corners_image(gray, &self.chess_config()) {
            Ok(raw) => raw.iter().map(Corner::from).collect(),
            Err(err) => {
                warn!("ChESS corner detection failed: {err}");
                Vec::new()
            }
        }
    }

    /// Find the full `pattern` grid in a cloud of corners.
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        pattern: BoardPattern,
    ) -> Option<ImagePointSet> {
        let expected = pattern.corner_count();
        let mut strong: Vec<Corner> = corners
            .iter()
            .filter(|c| c.strength >= self.params.min_strength)
            .copied()
            .collect();
        if strong.len() < expected {
            debug!("{} corners after strength filter, need {expected}", strong.len());
            return None;
        }

        let clusters = cluster_orientations(&strong, &self.params.orientation)?;
        let axes = clusters.grid_axes()?;
        for (c, label) in strong.iter_mut().zip(&clusters.labels) {
            c.orientation_cluster = *label;
        }

        let graph = GridGraph::new(&strong, &self.params.graph, axes);
        let component = graph
            .connected_components()
            .into_iter()
            .max_by_key(Vec::len)?;
        if component.len() != expected {
            debug!(
                "largest grid component has {} corners, need {expected}",
                component.len()
            );
            return None;
        }

        let coords = graph.assign_grid_coordinates(&component)?;
        let grid = LabelledGrid::from_coords(&strong, &coords);
        let points = grid.canonical_order(pattern)?;
        debug!("chessboard {}x{} found", pattern.columns(), pattern.rows());
        Some(points.into())
    }
}

impl CornerDetector for ChessboardDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, gray), fields(columns = pattern.columns(), rows = pattern.rows()))
    )]
    fn detect(&self, gray: &image::GrayImage, pattern: BoardPattern) -> Option<ImagePointSet> {
        let corners = self.detect_corners(gray);
        self.detect_from_corners(&corners, pattern)
    }
}

impl LabelledGrid {
    fn from_coords(corners: &[Corner], coords: &[(usize, i32, i32)]) -> Self {
        let min_u = coords.iter().map(|c| c.1).min().unwrap_or(0);
        let min_v = coords.iter().map(|c| c.2).min().unwrap_or(0);
        let cells: HashMap<_, _> = coords
            .iter()
            .map(|&(node, u, v)| (((u - min_u) as usize, (v - min_v) as usize), corners[node].position))
            .collect();
        let width = cells.keys().map(|k| k.0 + 1).max().unwrap_or(0);
        let height = cells.keys().map(|k| k.1 + 1).max().unwrap_or(0);
        Self {
            width,
            height,
            cells,
        }
    }

    /// Row-major corner list for `pattern`, choosing among the rotations of
    /// the grid the one that keeps the board right-handed in the image and
    /// starts nearest to the top-left of the image.
    fn canonical_order(&self, pattern: BoardPattern) -> Option<Vec<Point2<f32>>> {
        let (cols, rows) = (pattern.columns() as usize, pattern.rows() as usize);
        if self.cells.len() != cols * rows {
            return None;
        }

        let mut best: Option<(f32, Vec<Point2<f32>>)> = None;
        for swap in [false, true] {
            let (w, h) = if swap { (rows, cols) } else { (cols, rows) };
            if (self.width, self.height) != (w, h) {
                continue;
            }
            for (flip_u, flip_v) in [(false, false), (true, false), (false, true), (true, true)] {
                let cell = |x: usize, y: usize| {
                    let (u, v) = if swap { (y, x) } else { (x, y) };
                    let u = if flip_u { w - 1 - u } else { u };
                    let v = if flip_v { h - 1 - v } else { v };
                    self.cells.get(&(u, v)).copied()
                };
                let Some(points) = (0..rows)
                    .flat_map(|y| (0..cols).map(move |x| (x, y)))
                    .map(|(x, y)| cell(x, y))
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };
                if !is_right_handed(&points, cols) {
                    continue;
                }
                let origin = points[0];
                let key = origin.x + origin.y;
                if best.as_ref().is_none_or(|(k, _)| key < *k) {
                    best = Some((key, points));
                }
            }
        }
        best.map(|(_, points)| points)
    }
}

/// Board x-axis turned onto its y-axis must be clockwise in image
/// coordinates (y pointing down), i.e. the board is seen from the front.
fn is_right_handed(points: &[Point2<f32>], cols: usize) -> bool {
    let origin = points[0];
    let along_x = points[1] - origin;
    let along_y = points[cols] - origin;
    along_x.x * along_y.y - along_x.y * along_y.x > 0.0
}
