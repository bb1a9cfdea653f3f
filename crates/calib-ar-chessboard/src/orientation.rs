//! Split corner orientations into the two diagonal families of a chessboard.
//!
//! Inner corners of a chessboard alternate between two diagonal directions
//! roughly 90° apart. Angles live on a circle of period π, so the histogram
//! wraps and cluster means are taken in doubled-angle space.

use crate::Corner;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrientationParams {
    /// Histogram bins over [0, π).
    pub num_bins: usize,
    /// Refinement iterations of the circular 2-means.
    pub max_iters: usize,
    /// Minimal distance between the two seed peaks, degrees.
    pub min_peak_separation_deg: f32,
    /// Corners farther than this from both centers are outliers, degrees.
    pub outlier_threshold_deg: f32,
    /// A peak must carry at least this fraction of the total weight.
    pub min_peak_weight_fraction: f32,
    /// Weight votes by corner strength instead of counting them.
    pub use_weights: bool,
}

impl Default for OrientationParams {
    fn default() -> Self {
        Self {
            num_bins: 90,
            max_iters: 10,
            min_peak_separation_deg: 20.0,
            outlier_threshold_deg: 30.0,
            min_peak_weight_fraction: 0.05,
            use_weights: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrientationClusters {
    /// Cluster centers in [0, π).
    pub centers: [f32; 2],
    /// Per-corner label, `None` for outliers.
    pub labels: Vec<Option<usize>>,
}

impl OrientationClusters {
    /// The two grid axes implied by the diagonal centers, as unit vectors.
    ///
    /// With diagonals `d0`, `d1` the board axes run along `d0 + d1` and
    /// `d0 - d1`. Returns `None` when the centers are (anti)parallel.
    pub fn grid_axes(&self) -> Option<[nalgebra::Vector2<f32>; 2]> {
        let d0 = unit(self.centers[0]);
        let mut d1 = unit(self.centers[1]);
        // Pick the representative of d1 within 90° of d0 so the sum and
        // difference have comparable length.
        if d0.dot(&d1) < 0.0 {
            d1 = -d1;
        }
        let a = d0 + d1;
        let b = d0 - d1;
        if a.norm_squared() < 1e-6 || b.norm_squared() < 1e-6 {
            return None;
        }
        Some([a.normalize(), b.normalize()])
    }
}

fn unit(theta: f32) -> nalgebra::Vector2<f32> {
    nalgebra::Vector2::new(theta.cos(), theta.sin())
}

pub(crate) fn wrap_pi(theta: f32) -> f32 {
    theta.rem_euclid(PI)
}

/// Distance on the period-π circle, in [0, π/2].
pub(crate) fn angular_dist_pi(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(PI);
    d.min(PI - d)
}

fn weight(corner: &Corner, params: &OrientationParams) -> f32 {
    if params.use_weights {
        corner.strength.max(0.0)
    } else {
        1.0
    }
}

fn smooth(hist: &[f32]) -> Vec<f32> {
    const KERNEL: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    let n = hist.len() as isize;
    (0..n)
        .map(|i| {
            KERNEL
                .iter()
                .enumerate()
                .map(|(k, w)| w * hist[(i + k as isize - 2).rem_euclid(n) as usize])
                .sum::<f32>()
                / 16.0
        })
        .collect()
}

/// Weighted doubled-angle mean of `(angle, weight)` pairs.
fn circular_mean(angles: impl Iterator<Item = (f32, f32)>) -> Option<f32> {
    let (mut sx, mut sy, mut sw) = (0.0f32, 0.0f32, 0.0f32);
    for (theta, w) in angles {
        sx += w * (2.0 * theta).cos();
        sy += w * (2.0 * theta).sin();
        sw += w;
    }
    if sw <= 0.0 || sx.hypot(sy) < 1e-6 * sw {
        return None;
    }
    Some(wrap_pi(0.5 * sy.atan2(sx)))
}

/// Cluster corner orientations into two dominant diagonal directions.
///
/// Returns `None` when fewer than two sufficiently separated peaks exist.
pub fn cluster_orientations(
    corners: &[Corner],
    params: &OrientationParams,
) -> Option<OrientationClusters> {
    if corners.is_empty() || params.num_bins < 4 {
        return None;
    }
    let bins = params.num_bins;
    let bin_width = PI / bins as f32;

    let mut hist = vec![0.0f32; bins];
    for c in corners {
        let b = ((wrap_pi(c.orientation) / bin_width) as usize).min(bins - 1);
        hist[b] += weight(c, params);
    }
    let total: f32 = hist.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let hist = smooth(&hist);

    let mut peaks: Vec<(usize, f32)> = (0..bins)
        .filter(|&i| {
            let v = hist[i];
            v > 0.0 && v >= hist[(i + bins - 1) % bins] && v >= hist[(i + 1) % bins]
        })
        .map(|i| (i, hist[i]))
        .collect();
    peaks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // Peak mass: the sum over the ±2 bins the kernel spreads a vote into.
    let mass = |bin: usize| -> f32 {
        (0..5)
            .map(|k| hist[(bin + bins + k - 2) % bins])
            .sum::<f32>()
    };
    let min_mass = total * params.min_peak_weight_fraction;
    let bin_center = |b: usize| (b as f32 + 0.5) * bin_width;

    let first = peaks.iter().find(|(b, _)| mass(*b) >= min_mass)?.0;
    let min_sep = params.min_peak_separation_deg.to_radians();
    let second = peaks
        .iter()
        .find(|(b, _)| {
            mass(*b) >= min_mass && angular_dist_pi(bin_center(*b), bin_center(first)) >= min_sep
        })?
        .0;

    let mut centers = [bin_center(first), bin_center(second)];
    let outlier = params.outlier_threshold_deg.to_radians();
    let mut labels = vec![None; corners.len()];

    for _ in 0..params.max_iters.max(1) {
        let mut changed = false;
        for (label, c) in labels.iter_mut().zip(corners) {
            let d0 = angular_dist_pi(c.orientation, centers[0]);
            let d1 = angular_dist_pi(c.orientation, centers[1]);
            let (best, dist) = if d0 <= d1 { (0, d0) } else { (1, d1) };
            let next = (dist <= outlier).then_some(best);
            if *label != next {
                *label = next;
                changed = true;
            }
        }

        for (k, center) in centers.iter_mut().enumerate() {
            let members = labels
                .iter()
                .zip(corners)
                .filter(|(l, _)| **l == Some(k))
                .map(|(_, c)| (c.orientation, weight(c, params)));
            if let Some(mean) = circular_mean(members) {
                *center = mean;
            }
        }

        if !changed {
            break;
        }
    }

    let separation = angular_dist_pi(centers[0], centers[1]);
    debug!(
        "orientation centers {:.1}° / {:.1}° (separation {:.1}°)",
        centers[0].to_degrees(),
        centers[1].to_degrees(),
        separation.to_degrees()
    );
    if separation < min_sep.min(FRAC_PI_2) {
        return None;
    }

    Some(OrientationClusters { centers, labels })
}
