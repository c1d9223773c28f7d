use egui::{Pos2, Rect, pos2, vec2};
use image::Rgba;
use rand::Rng;

use crate::canvas::DrawingLayer;
use crate::components::history::{Command, HistoryManager, LayerSnapshotCommand};
use crate::ops::raster::{coverage, sdf_segment};
use crate::ops::shapes::{RegionShape, RegionState, circle_around};
use crate::ops::strands::{self, Strand, StrokeSettings};

/// Default pick distance for anchors, in image pixels.
pub const DEFAULT_HIT_RADIUS: f32 = 80.0;

/// Eraser width is a fraction of the larger canvas side.
const ERASER_SIZE_SCALE: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    HairBrush,
    Eraser,
}

impl Tool {
    pub fn label(self) -> &'static str {
        match self {
            Tool::HairBrush => "Hair Stroke",
            Tool::Eraser => "Eraser Stroke",
        }
    }
}

// ============================================================================
// ANCHOR EDITOR: hit-test and drag of region anchors
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { index: usize },
}

#[derive(Clone, Debug)]
pub struct AnchorEditor {
    pub hit_radius: f32,
    state: DragState,
    /// Anchor under the pointer while idle, for highlighting.
    pub hover_index: Option<usize>,
}

impl Default for AnchorEditor {
    fn default() -> Self {
        Self::new(DEFAULT_HIT_RADIUS)
    }
}

impl AnchorEditor {
    pub fn new(hit_radius: f32) -> Self {
        Self { hit_radius, state: DragState::Idle, hover_index: None }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn dragging_index(&self) -> Option<usize> {
        match self.state {
            DragState::Dragging { index } => Some(index),
            DragState::Idle => None,
        }
    }

    /// Closest anchor strictly within the hit radius. Ties keep the
    /// earlier index.
    pub fn hit_test(&self, pos: Pos2, shape: &RegionShape) -> Option<usize> {
        let mut best_idx = None;
        let mut best_dist = f32::MAX;
        for (i, pt) in shape.anchors().iter().enumerate() {
            let dist = pt.distance(pos);
            if dist < self.hit_radius && dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }
        best_idx
    }

    /// Start a drag when an anchor is close enough. Returns true on a hit.
    pub fn pointer_down(&mut self, pos: Pos2, shape: Option<&RegionShape>) -> bool {
        let Some(shape) = shape else {
            crate::log_warn!("anchor editor: pointer down with no region");
            return false;
        };
        match self.hit_test(pos, shape) {
            Some(index) => {
                self.state = DragState::Dragging { index };
                self.hover_index = None;
                true
            }
            None => false,
        }
    }

    /// Move the dragged anchor. Returns true when the region changed and
    /// the overlay needs redrawing.
    pub fn pointer_move(&mut self, pos: Pos2, region: &mut RegionState) -> bool {
        let DragState::Dragging { index } = self.state else {
            self.hover_index = region.shape().and_then(|s| self.hit_test(pos, s));
            return false;
        };
        let Some(shape) = region.shape_mut() else {
            self.state = DragState::Idle;
            return false;
        };
        let changed = apply_drag(shape, index, pos);
        if changed {
            region.mark_edited();
        }
        changed
    }

    pub fn pointer_up(&mut self) {
        self.state = DragState::Idle;
    }

    pub fn pointer_leave(&mut self) {
        self.state = DragState::Idle;
        self.hover_index = None;
    }
}

/// Move anchor `index` of `shape` to `pos`.
///
/// Banded shapes move the single anchor. Circles only react to index 0
/// (translate, keeping the horizontal radius) and index 1 (resize around
/// the fixed center); the remaining edge points are not draggable.
pub fn apply_drag(shape: &mut RegionShape, index: usize, pos: Pos2) -> bool {
    if let RegionShape::CircularRegion { center, right, .. } = *shape {
        let moved = match index {
            0 => circle_around(pos, (right.x - center.x).abs()),
            1 => circle_around(center, (pos.x - center.x).abs()),
            _ => return false,
        };
        *shape = moved;
        return true;
    }
    match shape.banded_anchor_mut(index) {
        Some(anchor) => {
            *anchor = pos;
            true
        }
        None => false,
    }
}

// ============================================================================
// STROKE GESTURE: one pointer-down..up sequence on the drawing layer
// ============================================================================

/// Drives one brush gesture. The layer is snapshotted at `begin`, painted
/// on each `paint_to`, and a single history entry is pushed at `end`.
#[derive(Default)]
pub struct HairBrush {
    pub tool: Tool,
    last: Option<Pos2>,
    pending: Option<LayerSnapshotCommand>,
    bounds: Option<Rect>,
}

impl HairBrush {
    pub fn new(tool: Tool) -> Self {
        Self { tool, ..Self::default() }
    }

    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    pub fn begin(&mut self, layer: &DrawingLayer, pos: Pos2) {
        self.pending = Some(LayerSnapshotCommand::new(self.tool.label(), layer));
        self.last = Some(pos);
        self.bounds = None;
    }

    /// Paint from the previous sample to `pos`. The travel direction of the
    /// pointer steers the strands. Ignored unless a gesture is active.
    pub fn paint_to<R: Rng + ?Sized>(
        &mut self,
        layer: &mut DrawingLayer,
        rng: &mut R,
        pos: Pos2,
        settings: &StrokeSettings,
    ) -> Vec<Strand> {
        if self.pending.is_none() {
            return Vec::new();
        }
        let last = self.last.unwrap_or(pos);
        self.last = Some(pos);

        match self.tool {
            Tool::HairBrush => {
                // no travel yet: strands fan out at random
                let delta = pos - last;
                let direction = (delta.length_sq() > 0.0).then(|| delta.y.atan2(delta.x));
                let drawn = strands::paint_step(layer, rng, pos.x, pos.y, settings, direction);
                for s in &drawn {
                    if let Some(b) = s.body.bounds() {
                        self.expand_bounds(b);
                    }
                }
                drawn
            }
            Tool::Eraser => {
                let width = eraser_width(settings.sanitized().brush_size, layer.width(), layer.height());
                if let Some(r) = erase_segment(layer, last, pos, width) {
                    self.expand_bounds(r);
                }
                Vec::new()
            }
        }
    }

    fn expand_bounds(&mut self, rect: Rect) {
        self.bounds = Some(match self.bounds {
            Some(existing) => existing.union(rect),
            None => rect,
        });
    }

    /// Area touched so far in this gesture.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    /// Close the gesture and record it. Returns true when an entry was pushed.
    pub fn end(&mut self, layer: &DrawingLayer, history: &mut HistoryManager) -> bool {
        self.last = None;
        self.bounds = None;
        let Some(mut cmd) = self.pending.take() else { return false };
        cmd.set_after(layer);
        if !cmd.changed() {
            return false;
        }
        history.push(Box::new(cmd));
        true
    }

    /// Abandon the gesture, restoring the layer as it was at `begin`.
    pub fn cancel(&mut self, layer: &mut DrawingLayer) {
        if let Some(cmd) = self.pending.take() {
            cmd.undo(layer);
        }
        self.last = None;
        self.bounds = None;
    }
}

/// Eraser diameter for a canvas: `brush_size` percent of a tenth of the
/// longer side.
pub fn eraser_width(brush_size: f32, width: u32, height: u32) -> f32 {
    let base = width.max(height) as f32 / 100.0;
    (brush_size * base * ERASER_SIZE_SCALE).max(1.0)
}

/// Round-capped erase from `a` to `b`, scaling alpha down by coverage.
/// Returns the touched rect, or `None` when nothing was in range.
pub fn erase_segment(layer: &mut DrawingLayer, a: Pos2, b: Pos2, width: f32) -> Option<Rect> {
    let half = width * 0.5;
    let pad = half + 1.0;
    let x0 = (a.x.min(b.x) - pad).floor().max(0.0) as u32;
    let y0 = (a.y.min(b.y) - pad).floor().max(0.0) as u32;
    let x1 = ((a.x.max(b.x) + pad).ceil().max(0.0) as u32).min(layer.width());
    let y1 = ((a.y.max(b.y) + pad).ceil().max(0.0) as u32).min(layer.height());
    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    for y in y0..y1 {
        for x in x0..x1 {
            let px = *layer.pixels.get_pixel(x, y);
            if px[3] == 0 {
                continue;
            }
            let cov = coverage(sdf_segment(pos2(x as f32 + 0.5, y as f32 + 0.5), a, b) - half);
            if cov <= 0.0 {
                continue;
            }
            let alpha = (px[3] as f32 * (1.0 - cov)).round() as u8;
            let out = if alpha == 0 { Rgba([0, 0, 0, 0]) } else { Rgba([px[0], px[1], px[2], alpha]) };
            layer.pixels.put_pixel(x, y, out);
        }
    }

    let rect = Rect::from_min_max(pos2(x0 as f32, y0 as f32), pos2(x1 as f32, y1 as f32));
    layer.mark_dirty(Some(rect));
    Some(rect)
}

/// Wipe the drawing layer as one undoable step. No-op on an empty layer.
pub fn clear_drawing(layer: &mut DrawingLayer, history: &mut HistoryManager) -> bool {
    if !layer.has_content() {
        return false;
    }
    let mut cmd = LayerSnapshotCommand::new("Clear Drawing", layer);
    layer.clear();
    cmd.set_after(layer);
    history.push(Box::new(cmd));
    true
}

/// Axis-aligned distances from a circle's center to its four edge points.
pub fn circle_edge_distances(shape: &RegionShape) -> Option<[f32; 4]> {
    match shape {
        RegionShape::CircularRegion { center, right, left, top, bottom } => Some([
            center.distance(*right),
            center.distance(*left),
            center.distance(*top),
            center.distance(*bottom),
        ]),
        _ => None,
    }
}

/// Nudge every anchor by `delta`; used for keyboard fine-tuning.
pub fn translate_shape(shape: &mut RegionShape, dx: f32, dy: f32) {
    let d = vec2(dx, dy);
    match shape {
        RegionShape::BandedCurve { inner, outer } => {
            inner.iter_mut().chain(outer.iter_mut()).for_each(|p| *p += d);
        }
        RegionShape::ZPattern { inner, outer } => {
            inner.iter_mut().chain(outer.iter_mut()).for_each(|p| *p += d);
        }
        RegionShape::CircularRegion { center, right, left, top, bottom } => {
            for p in [center, right, left, top, bottom] {
                *p += d;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::shapes::{FaceBounds, HairlineDesign, PatternKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn face() -> FaceBounds {
        FaceBounds { left: 100.0, right: 300.0, top: 150.0, width: 200.0, height: 250.0, center_x: 200.0 }
    }

    fn region(kind: PatternKind) -> RegionState {
        let mut r = RegionState::new(kind, HairlineDesign::MPattern);
        r.sync(Some(face()), kind, HairlineDesign::MPattern);
        r
    }

    #[test]
    fn test_hit_picks_closest_within_radius() {
        let region = region(PatternKind::Hairline);
        let shape = region.shape().unwrap();
        let editor = AnchorEditor::default();
        // inner[2] sits at (200, 140); outer[2] at (185, 125)
        assert_eq!(editor.hit_test(pos2(201.0, 141.0), shape), Some(2));
        assert_eq!(editor.hit_test(pos2(184.0, 124.0), shape), Some(7));
        assert_eq!(editor.hit_test(pos2(900.0, 900.0), shape), None);
    }

    #[test]
    fn test_hit_radius_is_exclusive() {
        let shape = circle_around(pos2(0.0, 0.0), 500.0);
        let editor = AnchorEditor::new(80.0);
        assert_eq!(editor.hit_test(pos2(80.0, 0.0), &shape), None);
        assert_eq!(editor.hit_test(pos2(79.9, 0.0), &shape), Some(0));
    }

    #[test]
    fn test_drag_banded_moves_only_selected() {
        let mut region = region(PatternKind::Hairline);
        let before = region.shape().unwrap().anchors();
        let mut editor = AnchorEditor::default();
        assert!(editor.pointer_down(before[2], region.shape()));
        assert!(editor.pointer_move(pos2(210.0, 100.0), &mut region));
        let after = region.shape().unwrap().anchors();
        for (i, (a, b)) in before.iter().zip(&after).enumerate() {
            if i == 2 {
                assert_eq!(*b, pos2(210.0, 100.0));
            } else {
                assert_eq!(a, b);
            }
        }
        assert!(region.is_user_edited());
        editor.pointer_up();
        assert_eq!(editor.state(), DragState::Idle);
        assert!(!editor.pointer_move(pos2(0.0, 0.0), &mut region));
    }

    #[test]
    fn test_center_drag_keeps_edges_equidistant() {
        let mut region = region(PatternKind::Crown);
        let mut editor = AnchorEditor::default();
        let shape = region.shape().unwrap().clone();
        let RegionShape::CircularRegion { center, right, .. } = shape else { panic!("circle expected") };
        let radius = (right.x - center.x).abs();

        assert!(editor.pointer_down(center, region.shape()));
        assert!(editor.pointer_move(pos2(250.0, 60.0), &mut region));
        let shape = region.shape().unwrap();
        let RegionShape::CircularRegion { center, .. } = *shape else { panic!("circle expected") };
        assert_eq!(center, pos2(250.0, 60.0));
        for d in circle_edge_distances(shape).unwrap() {
            assert!((d - radius).abs() < 1e-4);
        }
    }

    #[test]
    fn test_edge_drag_resizes_and_zero_radius_allowed() {
        let mut shape = circle_around(pos2(100.0, 100.0), 30.0);
        assert!(apply_drag(&mut shape, 1, pos2(160.0, 5.0)));
        assert_eq!(circle_edge_distances(&shape).unwrap(), [60.0; 4]);
        assert!(apply_drag(&mut shape, 1, pos2(100.0, 40.0)));
        assert_eq!(shape.average_radius(), Some(0.0));
        // top/left/bottom are not draggable
        let snapshot = shape.clone();
        assert!(!apply_drag(&mut shape, 3, pos2(0.0, 0.0)));
        assert_eq!(shape, snapshot);
    }

    #[test]
    fn test_pointer_leave_ends_drag() {
        let mut region = region(PatternKind::MidCrown);
        let mut editor = AnchorEditor::default();
        let center = region.shape().unwrap().anchors()[0];
        assert!(editor.pointer_down(center, region.shape()));
        editor.pointer_leave();
        assert_eq!(editor.dragging_index(), None);
        assert!(!editor.pointer_move(pos2(1.0, 1.0), &mut region));
    }

    #[test]
    fn test_pointer_down_without_region() {
        let mut editor = AnchorEditor::default();
        assert!(!editor.pointer_down(pos2(1.0, 1.0), None));
        assert_eq!(editor.state(), DragState::Idle);
    }

    #[test]
    fn test_one_gesture_one_history_entry() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut layer = DrawingLayer::new(200, 200);
        let mut history = HistoryManager::default();
        let mut brush = HairBrush::new(Tool::HairBrush);
        let settings = StrokeSettings { density: 3.0, ..Default::default() };

        brush.begin(&layer, pos2(50.0, 50.0));
        for i in 1..6 {
            brush.paint_to(&mut layer, &mut rng, pos2(50.0 + i as f32 * 10.0, 60.0), &settings);
        }
        assert!(brush.bounds().is_some());
        assert!(brush.end(&layer, &mut history));
        assert_eq!(history.undo_count(), 1);

        history.undo(&mut layer);
        assert!(!layer.has_content());
    }

    #[test]
    fn test_stationary_pointer_spreads_strands() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut layer = DrawingLayer::new(300, 300);
        let mut brush = HairBrush::new(Tool::HairBrush);
        let settings = StrokeSettings { density: 20.0, ..Default::default() };

        brush.begin(&layer, pos2(150.0, 150.0));
        let drawn = brush.paint_to(&mut layer, &mut rng, pos2(150.0, 150.0), &settings);
        assert_eq!(drawn.len(), 20);
        let heading = |s: &Strand| {
            let p = s.body.pieces[0];
            p.to - p.from
        };
        assert!(drawn.iter().any(|s| heading(s).x < 0.0));
        assert!(drawn.iter().any(|s| heading(s).x > 0.0));

        // a real move still steers every strand
        let moved = brush.paint_to(&mut layer, &mut rng, pos2(200.0, 150.0), &settings);
        assert!(moved.iter().all(|s| heading(s).x > 0.0));
    }

    #[test]
    fn test_paint_without_begin_is_ignored() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layer = DrawingLayer::new(64, 64);
        let mut brush = HairBrush::default();
        let drawn = brush.paint_to(&mut layer, &mut rng, pos2(30.0, 30.0), &StrokeSettings::default());
        assert!(drawn.is_empty());
        assert!(!layer.has_content());
    }

    #[test]
    fn test_eraser_removes_paint() {
        let mut layer = DrawingLayer::new(100, 100);
        for y in 40..60 {
            for x in 0..100 {
                layer.pixels.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let mut history = HistoryManager::default();
        let mut eraser = HairBrush::new(Tool::Eraser);
        let mut rng = StdRng::seed_from_u64(0);
        let settings = StrokeSettings { brush_size: 100.0, ..Default::default() };
        eraser.begin(&layer, pos2(50.0, 10.0));
        eraser.paint_to(&mut layer, &mut rng, pos2(50.0, 90.0), &settings);
        assert!(eraser.end(&layer, &mut history));
        assert_eq!(layer.pixels.get_pixel(50, 50).0, [0, 0, 0, 0]);
        assert_eq!(layer.pixels.get_pixel(5, 50).0[3], 255);
    }

    #[test]
    fn test_eraser_width_scales_with_canvas() {
        assert_eq!(eraser_width(40.0, 1000, 500), 40.0);
        assert_eq!(eraser_width(5.0, 10, 10), 1.0);
    }

    #[test]
    fn test_clear_drawing_is_undoable() {
        let mut layer = DrawingLayer::new(32, 32);
        let mut history = HistoryManager::default();
        assert!(!clear_drawing(&mut layer, &mut history));
        layer.pixels.put_pixel(3, 3, Rgba([1, 2, 3, 255]));
        assert!(clear_drawing(&mut layer, &mut history));
        assert!(!layer.has_content());
        history.undo(&mut layer);
        assert_eq!(layer.pixels.get_pixel(3, 3).0, [1, 2, 3, 255]);
    }

    #[test]
    fn test_cancel_restores_layer() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut layer = DrawingLayer::new(120, 120);
        let mut brush = HairBrush::default();
        brush.begin(&layer, pos2(60.0, 60.0));
        brush.paint_to(&mut layer, &mut rng, pos2(70.0, 60.0), &StrokeSettings::default());
        brush.cancel(&mut layer);
        assert!(!layer.has_content());
        assert!(!brush.is_active());
    }

    #[test]
    fn test_translate_shape() {
        let mut shape = circle_around(pos2(10.0, 10.0), 5.0);
        translate_shape(&mut shape, 1.0, -2.0);
        assert_eq!(shape.anchors()[0], pos2(11.0, 8.0));
    }
}
