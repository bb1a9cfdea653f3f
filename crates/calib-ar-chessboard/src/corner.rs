use crate::orientation::wrap_pi;
use chess_corners::CornerDescriptor;
use nalgebra::Point2;
use std::f32::consts::FRAC_PI_2;

/// A ChESS X-junction candidate in image pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,
    /// Direction of the light-square diagonal, radians, defined modulo π.
    pub orientation: f32,
    /// Which of the two diagonal clusters this corner belongs to, once known.
    pub orientation_cluster: Option<usize>,
    /// Detector response.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, orientation: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            orientation,
            orientation_cluster: None,
            strength,
        }
    }
}

/// ChESS reports the two local grid axes with the dark sector running
/// from `axes[0]` to `axes[1]`; the light diagonal is normal to its bisector.
impl From<&CornerDescriptor> for Corner {
    fn from(c: &CornerDescriptor) -> Self {
        let dark = 0.5 * (c.axes[0].angle + c.axes[1].angle);
        Self::new(c.x, c.y, wrap_pi(dark + FRAC_PI_2), c.response)
    }
}
