use crate::{BoardPattern, ImagePointSet};

/// Chessboard corner detector seam.
///
/// Implementations return `Some` only when the complete interior-corner grid
/// of `pattern` was found, with the points ordered row-major (x fastest) so
/// that they pair index-by-index with [`crate::object_points`].
pub trait CornerDetector {
    fn detect(&self, gray: &image::GrayImage, pattern: BoardPattern) -> Option<ImagePointSet>;
}

impl<D: CornerDetector + ?Sized> CornerDetector for &D {
    fn detect(&self, gray: &image::GrayImage, pattern: BoardPattern) -> Option<ImagePointSet> {
        (**self).detect(gray, pattern)
    }
}

impl<D: CornerDetector + ?Sized> CornerDetector for Box<D> {
    fn detect(&self, gray: &image::GrayImage, pattern: BoardPattern) -> Option<ImagePointSet> {
        (**self).detect(gray, pattern)
    }
}
