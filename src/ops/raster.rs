// ============================================================================
// RASTER PRIMITIVES: SDF coverage fills/strokes onto RgbaImage surfaces
// ============================================================================

use egui::{Pos2, pos2};
use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::blend_over;

pub type Color = [u8; 4];

/// Integer pixel bounds `[x0, x1) × [y0, y1)` clamped to a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBounds {
    /// Bounds of `points` grown by `pad`, clipped to `w × h`.
    pub fn around(points: &[Pos2], pad: f32, w: u32, h: u32) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let x0 = (min_x - pad).floor().max(0.0);
        let y0 = (min_y - pad).floor().max(0.0);
        let x1 = (max_x + pad).ceil().min(w as f32);
        let y1 = (max_y + pad).ceil().min(h as f32);
        if !(x0 < x1 && y0 < y1) {
            return None;
        }
        Some(Self { x0: x0 as u32, y0: y0 as u32, x1: x1 as u32, y1: y1 as u32 })
    }
}

/// Smoothstep between edge0 and edge1.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Anti-aliased coverage for a signed distance (negative = inside).
#[inline]
pub fn coverage(d: f32) -> f32 {
    smoothstep(0.5, -0.5, d)
}

/// Distance from `p` to segment `ab`.
#[inline]
pub fn sdf_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq < 1e-12 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

/// Signed distance to a closed polygon. The crossing-parity sign makes it
/// valid for concave outlines such as a hairline band.
pub fn sdf_polygon(verts: &[Pos2], p: Pos2) -> f32 {
    let n = verts.len();
    if n == 0 {
        return f32::MAX;
    }
    let mut d = (p - verts[0]).length_sq();
    let mut s: f32 = 1.0;
    let mut j = n - 1;
    for i in 0..n {
        let e = verts[j] - verts[i];
        let w = p - verts[i];
        let t = if e.length_sq() > 0.0 { (w.dot(e) / e.length_sq()).clamp(0.0, 1.0) } else { 0.0 };
        d = d.min((w - e * t).length_sq());
        let c1 = p.y >= verts[i].y;
        let c2 = p.y < verts[j].y;
        let c3 = e.x * w.y > e.y * w.x;
        if (c1 && c2 && c3) || (!c1 && !c2 && !c3) {
            s = -s;
        }
        j = i;
    }
    s * d.sqrt()
}

/// Blend `color` into every pixel of `bounds` weighted by `cov(pixel_center)`.
pub fn paint_coverage<F>(img: &mut RgbaImage, bounds: PixelBounds, color: Color, alpha: f32, cov: F)
where
    F: Fn(Pos2) -> f32 + Sync,
{
    let width = img.width() as usize;
    let row_bytes = width * 4;
    let rows: &mut [u8] = &mut img.as_mut()[bounds.y0 as usize * row_bytes..bounds.y1 as usize * row_bytes];
    rows.par_chunks_mut(row_bytes).enumerate().for_each(|(r, row)| {
        let py = (bounds.y0 as usize + r) as f32 + 0.5;
        for x in bounds.x0..bounds.x1 {
            let c = cov(pos2(x as f32 + 0.5, py));
            if c <= 0.001 {
                continue;
            }
            let a = (color[3] as f32 * c * alpha).round().clamp(0.0, 255.0) as u8;
            if a == 0 {
                continue;
            }
            let idx = x as usize * 4;
            let below = [row[idx], row[idx + 1], row[idx + 2], row[idx + 3]];
            let out = blend_over(below, [color[0], color[1], color[2], a]);
            row[idx..idx + 4].copy_from_slice(&out);
        }
    });
}

pub fn fill_polygon(img: &mut RgbaImage, verts: &[Pos2], color: Color, alpha: f32) {
    if verts.len() < 3 {
        return;
    }
    let Some(bounds) = PixelBounds::around(verts, 1.0, img.width(), img.height()) else { return };
    paint_coverage(img, bounds, color, alpha, |p| coverage(sdf_polygon(verts, p)));
}

/// Stroke a set of segments as one path (overlaps do not double-blend).
pub fn stroke_segments(img: &mut RgbaImage, segments: &[(Pos2, Pos2)], width: f32, color: Color, alpha: f32) {
    if segments.is_empty() {
        return;
    }
    let half = width * 0.5;
    let pts: Vec<Pos2> = segments.iter().flat_map(|&(a, b)| [a, b]).collect();
    let Some(bounds) = PixelBounds::around(&pts, half + 1.0, img.width(), img.height()) else { return };
    paint_coverage(img, bounds, color, alpha, |p| {
        let d = segments
            .iter()
            .map(|&(a, b)| sdf_segment(p, a, b))
            .fold(f32::MAX, f32::min);
        coverage(d - half)
    });
}

pub fn fill_circle(img: &mut RgbaImage, center: Pos2, radius: f32, color: Color, alpha: f32) {
    let radius = radius.max(0.0);
    let Some(bounds) = PixelBounds::around(&[center], radius + 1.0, img.width(), img.height()) else { return };
    paint_coverage(img, bounds, color, alpha, |p| coverage((p - center).length() - radius));
}

pub fn stroke_circle(img: &mut RgbaImage, center: Pos2, radius: f32, width: f32, color: Color, alpha: f32) {
    let radius = radius.max(0.0);
    let half = width * 0.5;
    let Some(bounds) = PixelBounds::around(&[center], radius + half + 1.0, img.width(), img.height()) else {
        return;
    };
    paint_coverage(img, bounds, color, alpha, |p| coverage(((p - center).length() - radius).abs() - half));
}

// ============================================================================
// PATH HELPERS
// ============================================================================

/// Consecutive point pairs; `closed` adds the last→first edge.
pub fn polyline_segments(points: &[Pos2], closed: bool) -> Vec<(Pos2, Pos2)> {
    let mut segs: Vec<(Pos2, Pos2)> = points.windows(2).map(|w| (w[0], w[1])).collect();
    if closed && points.len() > 2 {
        segs.push((points[points.len() - 1], points[0]));
    }
    segs
}

/// Split a polyline into the "on" pieces of a dash pattern
/// (`[on, off, on, off, ...]`). The phase carries across vertices.
pub fn dash_segments(points: &[Pos2], closed: bool, pattern: &[f32]) -> Vec<(Pos2, Pos2)> {
    let segs = polyline_segments(points, closed);
    let period: f32 = pattern.iter().sum();
    if pattern.is_empty() || period <= 0.0 {
        return segs;
    }
    let mut out = Vec::new();
    let mut dash_idx = 0usize;
    let mut left = pattern[0];
    for (a, b) in segs {
        let len = (b - a).length();
        if len <= 0.0 {
            continue;
        }
        let dir = (b - a) / len;
        let mut pos = 0.0f32;
        while pos < len {
            let step = left.min(len - pos);
            if dash_idx % 2 == 0 {
                out.push((a + dir * pos, a + dir * (pos + step)));
            }
            pos += step;
            left -= step;
            if left <= 1e-6 {
                dash_idx = (dash_idx + 1) % pattern.len().max(2);
                left = pattern[dash_idx % pattern.len()];
            }
        }
    }
    out
}

/// Flatten a quadratic Bézier into `steps` points after `p0`.
pub fn flatten_quadratic(p0: Pos2, ctrl: Pos2, p1: Pos2, steps: usize) -> Vec<Pos2> {
    let steps = steps.max(1);
    (1..=steps)
        .map(|i| {
            let t = i as f32 / steps as f32;
            let u = 1.0 - t;
            pos2(
                u * u * p0.x + 2.0 * u * t * ctrl.x + t * t * p1.x,
                u * u * p0.y + 2.0 * u * t * ctrl.y + t * t * p1.y,
            )
        })
        .collect()
}

/// Smooth open curve through `points`: quadratic pieces using each interior
/// point as control and the midpoints as joins.
pub fn smooth_through(points: &[Pos2]) -> Vec<Pos2> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut out = vec![points[0]];
    let mut cursor = points[0];
    for i in 1..points.len() - 1 {
        let mid = points[i] + (points[i + 1] - points[i]) * 0.5;
        out.extend(flatten_quadratic(cursor, points[i], mid, 8));
        cursor = mid;
    }
    out.push(points[points.len() - 1]);
    out
}

/// Circle outline as a closed polyline (about one vertex per 4px of arc).
pub fn circle_points(center: Pos2, radius: f32) -> Vec<Pos2> {
    let n = ((std::f32::consts::TAU * radius.max(0.0) / 4.0).ceil() as usize).max(32);
    (0..n)
        .map(|i| {
            let a = i as f32 / n as f32 * std::f32::consts::TAU;
            pos2(center.x + radius * a.cos(), center.y + radius * a.sin())
        })
        .collect()
}

/// Reset every pixel to transparent.
pub fn clear(img: &mut RgbaImage) {
    img.as_mut().par_iter_mut().for_each(|b| *b = 0);
}
