use nalgebra::Point2;
use std::ops::Deref;

/// Detected corner positions for one frame, in pixel coordinates.
///
/// Ordering and cardinality match the board's `ObjectPointSet`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImagePointSet {
    points: Vec<Point2<f32>>,
}

impl ImagePointSet {
    pub fn new(points: Vec<Point2<f32>>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point2<f32>] {
        &self.points
    }

    /// Arithmetic mean of all corners, `None` for an empty set.
    pub fn centroid(&self) -> Option<Point2<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0f64, 0.0f64), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        let n = self.points.len() as f64;
        Some(Point2::new(sx / n, sy / n))
    }

    /// Points widened to `f64` for the numeric stages.
    pub fn to_f64(&self) -> Vec<Point2<f64>> {
        self.points
            .iter()
            .map(|p| Point2::new(p.x as f64, p.y as f64))
            .collect()
    }
}

impl Deref for ImagePointSet {
    type Target = [Point2<f32>];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl From<Vec<Point2<f32>>> for ImagePointSet {
    fn from(points: Vec<Point2<f32>>) -> Self {
        Self::new(points)
    }
}

impl FromIterator<Point2<f32>> for ImagePointSet {
    fn from_iter<T: IntoIterator<Item = Point2<f32>>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
