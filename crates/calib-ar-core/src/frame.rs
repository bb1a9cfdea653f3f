use serde::{Deserialize, Serialize};

/// A decoded video frame, 8-bit RGB.
pub type Frame = image::RgbImage;

/// Width and height of a frame in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(frame: &Frame) -> Self {
        Self::new(frame.width(), frame.height())
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Single-channel luminance copy of `frame` (Rec. 601 weights).
pub fn luminance(frame: &Frame) -> image::GrayImage {
    image::imageops::grayscale(frame)
}
