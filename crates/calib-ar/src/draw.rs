//! In-place raster primitives on RGB frames.
//!
//! Positions are float pixels. Segments are clipped to the frame (plus the
//! brush width) before rasterising, so far off-screen or non-finite input
//! costs nothing.

use calib_ar_core::{BoardPattern, Frame, ImagePointSet};
use image::Rgb;
use nalgebra::Point2;

#[inline]
fn set_pixel(img: &mut Frame, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i64 && y < img.height() as i64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Liang–Barsky clip of `p0 -> p1` against `[lo, hi]` on both axes.
///
/// Returns `None` when the segment misses the box. Endpoints inside the box
/// come back unchanged.
fn clip_segment(
    p0: Point2<f64>,
    p1: Point2<f64>,
    lo: Point2<f64>,
    hi: Point2<f64>,
) -> Option<(Point2<f64>, Point2<f64>)> {
    let d = p1 - p0;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-d.x, p0.x - lo.x),
        (d.x, hi.x - p0.x),
        (-d.y, p0.y - lo.y),
        (d.y, hi.y - p0.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    let a = if t0 > 0.0 { p0 + d * t0 } else { p0 };
    let b = if t1 < 1.0 { p0 + d * t1 } else { p1 };
    Some((a, b))
}

/// Bresenham line from `p0` to `p1`, positions truncated toward zero.
///
/// `thickness > 1` stamps a square brush of that side at every step, which
/// is close enough for the short strokes drawn here.
pub fn draw_line(
    img: &mut Frame,
    p0: Point2<f64>,
    p1: Point2<f64>,
    color: Rgb<u8>,
    thickness: u32,
) {
    if !(p0.x.is_finite() && p0.y.is_finite() && p1.x.is_finite() && p1.y.is_finite()) {
        return;
    }
    let brush = thickness.clamp(1, img.width().max(img.height()).max(1)) as i64;
    let pad = brush as f64;
    let lo = Point2::new(-pad, -pad);
    let hi = Point2::new(img.width() as f64 + pad, img.height() as f64 + pad);
    let Some((a, b)) = clip_segment(p0, p1, lo, hi) else {
        return;
    };

    let (mut x0, mut y0) = (a.x as i64, a.y as i64);
    let (x1, y1) = (b.x as i64, b.y as i64);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let lo = -(brush - 1) / 2;
    let hi = lo + brush - 1;

    loop {
        for oy in lo..=hi {
            for ox in lo..=hi {
                set_pixel(img, x0 + ox, y0 + oy, color);
            }
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Filled disc of `radius` around `center`; radius 0 is a single pixel.
pub fn fill_circle(img: &mut Frame, center: Point2<f64>, radius: u32, color: Rgb<u8>) {
    if !(center.x.is_finite() && center.y.is_finite()) || img.width() == 0 || img.height() == 0 {
        return;
    }
    let (cx, cy) = (center.x.trunc(), center.y.trunc());
    let r = radius as f64;
    let (w, h) = (img.width() as f64, img.height() as f64);
    if cx + r < 0.0 || cy + r < 0.0 || cx - r >= w || cy - r >= h {
        return;
    }
    let (x0, x1) = ((cx - r).max(0.0) as u32, (cx + r).min(w - 1.0) as u32);
    let (y0, y1) = ((cy - r).max(0.0) as u32, (cy + r).min(h - 1.0) as u32);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let (ox, oy) = (x as f64 - cx, y as f64 - cy);
            if ox * ox + oy * oy <= r * r {
                img.put_pixel(x, y, color);
            }
        }
    }
}

/// One colour per board row, cycling.
const ROW_COLORS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 128, 255]),
    Rgb([255, 0, 255]),
];

/// Overlay detected corners: a marker on every corner and a polyline
/// through them in row-major order, coloured per row.
pub fn draw_chessboard_corners(img: &mut Frame, pattern: BoardPattern, corners: &ImagePointSet) {
    let columns = pattern.columns() as usize;
    if columns == 0 {
        return;
    }
    let mut prev: Option<Point2<f64>> = None;
    for (i, p) in corners.iter().enumerate() {
        let color = ROW_COLORS[(i / columns) % ROW_COLORS.len()];
        let here = Point2::new(p.x.trunc() as f64, p.y.trunc() as f64);
        if let Some(prev) = prev {
            draw_line(img, prev, here, color, 1);
        }
        let (x, y) = (here.x, here.y);
        draw_line(img, Point2::new(x - 4.0, y - 4.0), Point2::new(x + 4.0, y + 4.0), color, 1);
        draw_line(img, Point2::new(x - 4.0, y + 4.0), Point2::new(x + 4.0, y - 4.0), color, 1);
        prev = Some(here);
    }
}
