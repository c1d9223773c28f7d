// ============================================================================
// OVERLAY RENDERER: region fill, outline and drag handles
// ============================================================================

use egui::{Pos2, vec2};
use image::RgbaImage;

use crate::ops::raster::{self, Color};
use crate::ops::shapes::{HairlineDesign, RegionShape};

pub const HANDLE_RADIUS: f32 = 8.0;

const ACCENT: Color = [0, 255, 0, 255];
const INNER_HANDLE: Color = [255, 0, 0, 255];
const OUTER_HANDLE: Color = [0, 0, 255, 255];
const HANDLE_RING: Color = [255, 255, 255, 255];

/// Visual parameters for one overlay pass.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    /// Fill for banded hairline shapes.
    pub fill: Color,
    /// Fill for circular regions.
    pub circle_fill: Color,
    pub outline: Color,
    pub outline_width: f32,
    /// Empty = solid outline.
    pub outline_dash: Vec<f32>,
    /// Applied to fill and outline (canvas `globalAlpha`).
    pub global_alpha: f32,
    pub inner_handle: Color,
    pub outer_handle: Color,
    pub handle_ring_width: f32,
    pub radius_dash: Vec<f32>,
    pub radius_line_width: f32,
    pub draw_handles: bool,
    /// Draw banded outlines as smooth curves through the anchors.
    pub smooth: bool,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill: [ACCENT[0], ACCENT[1], ACCENT[2], 0x22],
            circle_fill: [ACCENT[0], ACCENT[1], ACCENT[2], 0x30],
            outline: ACCENT,
            outline_width: 3.0,
            outline_dash: vec![10.0, 5.0],
            global_alpha: 0.8,
            inner_handle: INNER_HANDLE,
            outer_handle: OUTER_HANDLE,
            handle_ring_width: 2.0,
            radius_dash: vec![5.0, 5.0],
            radius_line_width: 2.0,
            draw_handles: true,
            smooth: false,
        }
    }
}

impl OverlayStyle {
    /// Editing style for a hairline design (the Curve design is drawn smooth).
    pub fn for_design(design: HairlineDesign) -> Self {
        Self { smooth: design == HairlineDesign::Curve, ..Self::default() }
    }

    /// Solid region only, full opacity, no handles. Feeds the region mask.
    pub fn mask_only() -> Self {
        Self {
            fill: ACCENT,
            circle_fill: ACCENT,
            outline_dash: Vec::new(),
            global_alpha: 1.0,
            draw_handles: false,
            ..Self::default()
        }
    }
}

/// Clear `canvas` and draw `shape` on it. Same inputs, same pixels.
pub fn render(canvas: &mut RgbaImage, shape: Option<&RegionShape>, style: &OverlayStyle) {
    raster::clear(canvas);
    let Some(shape) = shape else { return };

    match shape {
        RegionShape::BandedCurve { inner, outer } => render_band(canvas, inner, outer, style),
        RegionShape::ZPattern { inner, outer } => render_band(canvas, inner, outer, style),
        RegionShape::CircularRegion { center, .. } => {
            let radius = shape.average_radius().unwrap_or(0.0);
            render_circle(canvas, *center, radius, style);
        }
    }
}

fn render_band(canvas: &mut RgbaImage, inner: &[Pos2], outer: &[Pos2], style: &OverlayStyle) {
    let outline = band_path(inner, outer, style.smooth);

    raster::fill_polygon(canvas, &outline, style.fill, style.global_alpha);
    stroke_path(canvas, &outline, true, style.outline_width, &style.outline_dash, style.outline, style.global_alpha);

    if style.draw_handles {
        for p in inner {
            draw_handle(canvas, *p, style.inner_handle, style);
        }
        for p in outer {
            draw_handle(canvas, *p, style.outer_handle, style);
        }
    }
}

/// Outer points forward, then the inner points reversed; implicitly closed.
pub fn band_path(inner: &[Pos2], outer: &[Pos2], smooth: bool) -> Vec<Pos2> {
    let inner_rev: Vec<Pos2> = inner.iter().rev().copied().collect();
    if smooth {
        let mut path = raster::smooth_through(outer);
        path.extend(raster::smooth_through(&inner_rev));
        path
    } else {
        let mut path = outer.to_vec();
        path.extend(inner_rev);
        path
    }
}

fn render_circle(canvas: &mut RgbaImage, center: Pos2, radius: f32, style: &OverlayStyle) {
    raster::fill_circle(canvas, center, radius, style.circle_fill, style.global_alpha);
    if style.outline_dash.is_empty() {
        raster::stroke_circle(canvas, center, radius, style.outline_width, style.outline, style.global_alpha);
    } else {
        let ring = raster::circle_points(center, radius);
        stroke_path(canvas, &ring, true, style.outline_width, &style.outline_dash, style.outline, style.global_alpha);
    }

    if style.draw_handles {
        let edge = center + vec2(radius, 0.0);
        let radius_line = raster::dash_segments(&[center, edge], false, &style.radius_dash);
        raster::stroke_segments(canvas, &radius_line, style.radius_line_width, style.outline, 1.0);
        draw_handle(canvas, center, style.inner_handle, style);
        draw_handle(canvas, edge, style.outer_handle, style);
    }
}

fn stroke_path(canvas: &mut RgbaImage, path: &[Pos2], closed: bool, width: f32, dash: &[f32], color: Color, alpha: f32) {
    let segments = if dash.is_empty() {
        raster::polyline_segments(path, closed)
    } else {
        raster::dash_segments(path, closed, dash)
    };
    raster::stroke_segments(canvas, &segments, width, color, alpha);
}

fn draw_handle(canvas: &mut RgbaImage, at: Pos2, color: Color, style: &OverlayStyle) {
    raster::fill_circle(canvas, at, HANDLE_RADIUS, color, 1.0);
    raster::stroke_circle(canvas, at, HANDLE_RADIUS, style.handle_ring_width, HANDLE_RING, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::shapes::{FaceBounds, PatternKind, default_shape};
    use egui::pos2;

    fn face() -> FaceBounds {
        FaceBounds { left: 100.0, right: 300.0, top: 150.0, width: 200.0, height: 250.0, center_x: 200.0 }
    }

    #[test]
    fn test_render_is_idempotent() {
        let shape = default_shape(&face(), PatternKind::Hairline, HairlineDesign::MPattern);
        let style = OverlayStyle::default();
        let mut a = RgbaImage::new(400, 400);
        let mut b = RgbaImage::new(400, 400);
        render(&mut a, Some(&shape), &style);
        render(&mut b, Some(&shape), &style);
        assert_eq!(a, b);
        render(&mut a, Some(&shape), &style);
        assert_eq!(a, b);
    }

    #[test]
    fn test_handles_colored_by_role() {
        let shape = default_shape(&face(), PatternKind::Hairline, HairlineDesign::MPattern);
        let mut canvas = RgbaImage::new(400, 400);
        render(&mut canvas, Some(&shape), &OverlayStyle::default());
        let RegionShape::BandedCurve { inner, outer } = shape else { unreachable!() };
        let at = |p: Pos2| canvas.get_pixel(p.x as u32, p.y as u32).0;
        assert_eq!(at(inner[2]), [255, 0, 0, 255]);
        assert_eq!(at(outer[2]), [0, 0, 255, 255]);
    }

    #[test]
    fn test_render_clears_previous_content() {
        let mut canvas = RgbaImage::from_pixel(50, 50, image::Rgba([9, 9, 9, 255]));
        render(&mut canvas, None, &OverlayStyle::default());
        assert!(canvas.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_circle_handles_and_fill() {
        let shape = crate::ops::shapes::circle_around(pos2(100.0, 100.0), 40.0);
        let mut canvas = RgbaImage::new(200, 200);
        render(&mut canvas, Some(&shape), &OverlayStyle::default());
        assert_eq!(canvas.get_pixel(100, 100).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(140, 100).0, [0, 0, 255, 255]);
        // inside the circle, away from handles and the radius line
        let inside = canvas.get_pixel(100, 75).0;
        assert_eq!(&inside[..3], &[0, 255, 0]);
        assert!(inside[3] > 0 && inside[3] < 255);
        assert_eq!(canvas.get_pixel(5, 5).0[3], 0);
    }

    #[test]
    fn test_band_fill_lighter_than_circle_fill() {
        let band = RegionShape::BandedCurve {
            inner: [pos2(20.0, 80.0), pos2(60.0, 80.0), pos2(100.0, 80.0), pos2(140.0, 80.0), pos2(180.0, 80.0)],
            outer: [pos2(20.0, 20.0), pos2(60.0, 20.0), pos2(100.0, 20.0), pos2(140.0, 20.0), pos2(180.0, 20.0)],
        };
        let circle = crate::ops::shapes::circle_around(pos2(100.0, 100.0), 60.0);
        let mut a = RgbaImage::new(200, 200);
        let mut b = RgbaImage::new(200, 200);
        render(&mut a, Some(&band), &OverlayStyle::default());
        render(&mut b, Some(&circle), &OverlayStyle::default());
        // 0x22 and 0x30 under the 0.8 global alpha
        assert_eq!(a.get_pixel(80, 50).0, [0, 255, 0, 27]);
        assert_eq!(b.get_pixel(100, 70).0, [0, 255, 0, 38]);
    }

    #[test]
    fn test_mask_only_fill_is_opaque() {
        let shape = crate::ops::shapes::circle_around(pos2(50.0, 50.0), 20.0);
        let mut canvas = RgbaImage::new(100, 100);
        render(&mut canvas, Some(&shape), &OverlayStyle::mask_only());
        assert_eq!(canvas.get_pixel(50, 50).0[3], 255);
        assert_eq!(canvas.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_band_path_order() {
        let inner = [pos2(0.0, 10.0), pos2(5.0, 10.0), pos2(10.0, 10.0)];
        let outer = [pos2(0.0, 0.0), pos2(5.0, 0.0), pos2(10.0, 0.0)];
        let path = band_path(&inner, &outer, false);
        assert_eq!(path, vec![outer[0], outer[1], outer[2], inner[2], inner[1], inner[0]]);
    }
}
