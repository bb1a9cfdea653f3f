use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

/// Errors raised when constructing board geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("board pattern needs at least 2x2 interior corners (got {columns}x{rows})")]
    TooSmall { columns: u32, rows: u32 },
    #[error("cell size must be positive and finite (got {0})")]
    InvalidCellSize(f64),
}

/// Interior-corner layout of a planar chessboard.
///
/// `columns` counts corners along the board x axis, `rows` along y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPattern", into = "RawPattern")]
pub struct BoardPattern {
    columns: u32,
    rows: u32,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct RawPattern {
    columns: u32,
    rows: u32,
}

impl TryFrom<RawPattern> for BoardPattern {
    type Error = PatternError;

    fn try_from(raw: RawPattern) -> Result<Self, Self::Error> {
        Self::new(raw.columns, raw.rows)
    }
}

impl From<BoardPattern> for RawPattern {
    fn from(p: BoardPattern) -> Self {
        Self {
            columns: p.columns,
            rows: p.rows,
        }
    }
}

impl BoardPattern {
    pub fn new(columns: u32, rows: u32) -> Result<Self, PatternError> {
        if columns < 2 || rows < 2 {
            return Err(PatternError::TooSmall { columns, rows });
        }
        Ok(Self { columns, rows })
    }

    #[inline]
    pub fn columns(&self) -> u32 {
        self.columns
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of interior corners, `columns * rows`.
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Row-major index of grid corner `(x, y)`.
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.columns as usize + x as usize
    }
}

impl Default for BoardPattern {
    fn default() -> Self {
        Self {
            columns: 10,
            rows: 7,
        }
    }
}

/// Physical side length of one board square.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CellSize(f64);

impl CellSize {
    pub fn new(size: f64) -> Result<Self, PatternError> {
        if !(size.is_finite() && size > 0.0) {
            return Err(PatternError::InvalidCellSize(size));
        }
        Ok(Self(size))
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for CellSize {
    type Error = PatternError;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<CellSize> for f64 {
    fn from(c: CellSize) -> Self {
        c.0
    }
}

impl Default for CellSize {
    fn default() -> Self {
        Self(0.025)
    }
}

/// Board corners in board coordinates, row-major with `x` fastest, all on `z = 0`.
///
/// Cloning is cheap: every observation shares the same backing storage.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPointSet {
    pattern: BoardPattern,
    points: Arc<[Point3<f64>]>,
}

impl ObjectPointSet {
    pub fn pattern(&self) -> BoardPattern {
        self.pattern
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Whether two sets share the same allocation.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.points, &other.points)
    }

    /// Mean of all points; the geometric centre of the corner grid.
    pub fn centroid(&self) -> Point3<f64> {
        let n = self.points.len() as f64;
        let sum = self
            .points
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / n)
    }
}

impl Deref for ObjectPointSet {
    type Target = [Point3<f64>];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

/// Derive the 3-D corner layout of `pattern` scaled by `cell_size`.
pub fn object_points(pattern: BoardPattern, cell_size: CellSize) -> ObjectPointSet {
    let s = cell_size.get();
    let columns = pattern.columns();
    let points: Vec<Point3<f64>> = (0..pattern.rows())
        .flat_map(move |y| {
            (0..columns).map(move |x| Point3::new(x as f64 * s, y as f64 * s, 0.0))
        })
        .collect();
    ObjectPointSet {
        pattern,
        points: points.into(),
    }
}
