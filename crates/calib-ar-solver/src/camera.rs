//! Pinhole camera with Brown–Conrady distortion.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics (no skew).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }

    #[inline]
    pub fn to_pixel(&self, normalized: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * normalized.x + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }

    #[inline]
    pub fn to_normalized(&self, pixel: Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }
}

/// Brown–Conrady coefficients in OpenCV order `k1 k2 p1 p2 k3`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Build from up to five coefficients; missing ones are zero.
    pub fn from_slice(c: &[f64]) -> Self {
        let at = |i: usize| c.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    /// Apply the lens model to an ideal normalized point.
    pub fn distort(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xd = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(xd, yd)
    }

    /// Invert [`Self::distort`] by fixed-point iteration.
    pub fn undistort(&self, p: Point2<f64>) -> Point2<f64> {
        const ITERS: usize = 20;
        let (mut x, mut y) = (p.x, p.y);
        for _ in 0..ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            if radial.abs() < 1e-12 {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (p.x - dx) / radial;
            y = (p.y - dy) / radial;
        }
        Point2::new(x, y)
    }
}

/// Rigid board-to-camera transform; rotation stored as an axis-angle vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rotation(rotation: &Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(rotation.scaled_axis(), translation)
    }

    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::from_scaled_axis(self.rotation)
    }
}

/// Calibrated camera: intrinsics plus lens distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl Camera {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a point given in camera coordinates. `None` behind the camera.
    pub fn project_camera_point(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 1e-12 {
            return None;
        }
        let ideal = Point2::new(p.x / p.z, p.y / p.z);
        Some(self.intrinsics.to_pixel(self.distortion.distort(ideal)))
    }

    /// Pixel to ideal (undistorted) normalized image coordinates.
    pub fn normalize(&self, pixel: Point2<f64>) -> Point2<f64> {
        self.distortion
            .undistort(self.intrinsics.to_normalized(pixel))
    }
}

/// Project board points through `pose` and `camera`.
///
/// Points behind the camera come out as NaN so that indices stay aligned
/// with the input.
pub fn project_points(camera: &Camera, pose: &Pose, points: &[Point3<f64>]) -> Vec<Point2<f64>> {
    let rot = pose.rotation_matrix();
    points
        .iter()
        .map(|p| {
            camera
                .project_camera_point(&(rot * p + pose.translation))
                .unwrap_or_else(|| Point2::new(f64::NAN, f64::NAN))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::new(
            Intrinsics::new(800.0, 780.0, 320.0, 240.0),
            Distortion {
                k1: -0.2,
                k2: 0.05,
                p1: 0.001,
                p2: -0.0005,
                k3: 0.0,
            },
        )
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = camera().distortion;
        for &(x, y) in &[(0.0, 0.0), (0.2, -0.1), (-0.3, 0.25), (0.35, 0.3)] {
            let p = Point2::new(x, y);
            let back = d.undistort(d.distort(p));
            assert_relative_eq!(back.x, x, epsilon = 1e-9);
            assert_relative_eq!(back.y, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn principal_ray_hits_principal_point() {
        let cam = camera();
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        let px = project_points(&cam, &pose, &[Point3::origin()]);
        assert_relative_eq!(px[0].x, 320.0);
        assert_relative_eq!(px[0].y, 240.0);
    }

    #[test]
    fn points_behind_camera_are_nan() {
        let cam = camera();
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -1.0));
        let px = project_points(&cam, &pose, &[Point3::origin()]);
        assert!(px[0].x.is_nan());
    }

    #[test]
    fn normalize_inverts_projection() {
        let cam = camera();
        let p = Point3::new(0.1, -0.05, 1.0);
        let px = cam.project_camera_point(&p).unwrap();
        let n = cam.normalize(px);
        assert_relative_eq!(n.x, 0.1, epsilon = 1e-8);
        assert_relative_eq!(n.y, -0.05, epsilon = 1e-8);
    }

    #[test]
    fn distortion_from_short_slice_pads_with_zero() {
        let d = Distortion::from_slice(&[0.1, -0.2]);
        assert_eq!([0.1, -0.2, 0.0, 0.0, 0.0], d.coefficients());
    }
}
