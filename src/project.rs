use std::collections::HashMap;
use std::path::Path;

use egui::Pos2;
use image::RgbaImage;
use rand::Rng;
use uuid::Uuid;

use crate::assets::AppSettings;
use crate::canvas::DrawingLayer;
use crate::components::colors;
use crate::components::history::HistoryManager;
use crate::components::tools::{self, AnchorEditor, HairBrush, Tool};
use crate::error::Result;
use crate::io;
use crate::ops::mask::{self, MaskBackground};
use crate::ops::overlay::{self, OverlayStyle};
use crate::ops::shapes::{FaceBounds, HairlineDesign, PatternKind, RegionState};
use crate::ops::strands::{Strand, StrokeSettings};
use crate::ops::submission::{
    FaceDetectionResponse, FilePart, GenerationForm, HairlinePoints, MarkMode, Timeframe, validate_free_mark,
};

/// JPEG quality used for the `image` field.
const ORIGINAL_JPEG_QUALITY: u8 = 92;

/// Identifies one asynchronous load; results carrying an older token are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadToken(u64);

/// Drawing surface and undo stack for one timeframe.
pub struct TimeframeCanvas {
    pub layer: DrawingLayer,
    pub history: HistoryManager,
    pub density: f32,
}

impl TimeframeCanvas {
    fn new(width: u32, height: u32, timeframe: Timeframe, max_undo: usize) -> Self {
        Self {
            layer: DrawingLayer::new(width, height),
            history: HistoryManager::new(max_undo),
            density: timeframe.default_density(),
        }
    }
}

/// Editing state for one loaded portrait.
pub struct ImageSession {
    pub id: Uuid,
    /// Display name (file name, or "Untitled").
    pub name: String,
    original: RgbaImage,
    pub region: RegionState,
    pub editor: AnchorEditor,
    pub mode: MarkMode,
    /// Base brush settings; density and opacity come from the active timeframe.
    pub brush_settings: StrokeSettings,
    pub mask_background: MaskBackground,
    active: Timeframe,
    /// Indexed by [`slot`].
    canvases: [TimeframeCanvas; 2],
    /// Binary masks captured when a timeframe was last flushed.
    stored_masks: HashMap<Timeframe, RgbaImage>,
    brush: HairBrush,
    face_detected: bool,
    load_seq: u64,
}

impl ImageSession {
    pub fn new(name: impl Into<String>, original: RgbaImage, settings: &AppSettings) -> Self {
        let (w, h) = original.dimensions();
        let canvases = Timeframe::all().map(|tf| TimeframeCanvas::new(w, h, tf, settings.max_undo_steps));

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            original,
            region: RegionState::default(),
            editor: AnchorEditor::new(settings.hit_radius),
            mode: MarkMode::Region(PatternKind::Hairline),
            brush_settings: StrokeSettings::default(),
            mask_background: settings.mask_background,
            active: Timeframe::ThreeMonths,
            canvases,
            stored_masks: HashMap::new(),
            brush: HairBrush::default(),
            face_detected: false,
            load_seq: 0,
        }
    }

    pub fn from_file(path: &Path, settings: &AppSettings) -> Result<Self> {
        let original = io::load_image(path)?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string());
        Ok(Self::new(name, original, settings))
    }

    pub fn original(&self) -> &RgbaImage {
        &self.original
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.original.dimensions()
    }

    // -- Face detection / region ---------------------------------------

    /// Start an asynchronous load (face detection, stored drawing, ...).
    /// Any earlier token becomes stale.
    pub fn begin_load(&mut self) -> LoadToken {
        self.load_seq += 1;
        LoadToken(self.load_seq)
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        token.0 == self.load_seq
    }

    /// Apply a face detection reply. Returns false when the token is stale.
    pub fn complete_face_detection(&mut self, token: LoadToken, response: &FaceDetectionResponse) -> bool {
        if !self.is_current(token) {
            crate::log_warn!("session {}: dropping stale face detection result", self.id);
            return false;
        }
        if let Some(ref err) = response.face_detection.error {
            crate::log_warn!("face detection reported: {}", err);
        }
        self.face_detected = response.face_detection.face_detected;
        self.set_face(response.bounds());
        true
    }

    pub fn set_face(&mut self, face: Option<FaceBounds>) -> bool {
        let (kind, design) = (self.region.kind, self.region.design);
        self.region.sync(face, kind, design)
    }

    pub fn face_detected(&self) -> bool {
        self.face_detected
    }

    /// Switch the region kind/design. Also leaves free-mark mode.
    pub fn select_pattern(&mut self, kind: PatternKind, design: HairlineDesign) -> bool {
        self.mode = MarkMode::Region(kind);
        let face = self.region.face().copied();
        self.region.sync(face, kind, design)
    }

    pub fn region_pointer_down(&mut self, pos: Pos2) -> bool {
        self.editor.pointer_down(pos, self.region.shape())
    }

    pub fn region_pointer_move(&mut self, pos: Pos2) -> bool {
        self.editor.pointer_move(pos, &mut self.region)
    }

    pub fn region_pointer_up(&mut self) {
        self.editor.pointer_up();
    }

    /// Shift the whole region, e.g. from arrow keys. Counts as a user edit.
    pub fn nudge_region(&mut self, dx: f32, dy: f32) -> bool {
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        let Some(shape) = self.region.shape_mut() else {
            crate::log_warn!("nudge ignored: no region shape");
            return false;
        };
        tools::translate_shape(shape, dx, dy);
        self.region.mark_edited();
        true
    }

    /// Overlay raster with the editing style for the current design.
    pub fn region_overlay(&self) -> RgbaImage {
        let (w, h) = self.dimensions();
        let mut canvas = RgbaImage::new(w, h);
        overlay::render(&mut canvas, self.region.shape(), &OverlayStyle::for_design(self.region.design));
        canvas
    }

    /// Binary mask of the selected region, `None` until a shape exists.
    pub fn region_mask(&self) -> Option<RgbaImage> {
        self.region_mask_on(self.mask_background)
    }

    fn region_mask_on(&self, background: MaskBackground) -> Option<RgbaImage> {
        let shape = self.region.shape()?;
        let (w, h) = self.dimensions();
        let mut canvas = RgbaImage::new(w, h);
        let style = OverlayStyle { smooth: self.region.design == HairlineDesign::Curve, ..OverlayStyle::mask_only() };
        overlay::render(&mut canvas, Some(shape), &style);
        Some(mask::binary_mask(&canvas, background))
    }

    // -- Timeframes ----------------------------------------------------

    pub fn active_timeframe(&self) -> Timeframe {
        self.active
    }

    fn canvas(&self, timeframe: Timeframe) -> &TimeframeCanvas {
        &self.canvases[slot(timeframe)]
    }

    fn canvas_mut(&mut self, timeframe: Timeframe) -> &mut TimeframeCanvas {
        &mut self.canvases[slot(timeframe)]
    }

    pub fn layer(&self, timeframe: Timeframe) -> &DrawingLayer {
        &self.canvas(timeframe).layer
    }

    pub fn history(&self, timeframe: Timeframe) -> &HistoryManager {
        &self.canvas(timeframe).history
    }

    /// Close any open gesture and store the active layer's mask.
    pub fn flush(&mut self) {
        let tf = self.active;
        if self.brush.is_active() {
            self.stroke_end();
        }
        match self.timeframe_mask(tf) {
            Some(m) => {
                self.stored_masks.insert(tf, m);
            }
            None => {
                self.stored_masks.remove(&tf);
            }
        }
    }

    /// Flush the current layer, then make `timeframe` active.
    pub fn switch_timeframe(&mut self, timeframe: Timeframe) {
        if timeframe == self.active {
            return;
        }
        self.flush();
        self.active = timeframe;
        crate::log_info!("session {}: switched to {}", self.id, timeframe.wire_name());
    }

    /// White-on-transparent mask for a timeframe. The active layer is read
    /// live; others come from their last flush.
    pub fn timeframe_mask(&self, timeframe: Timeframe) -> Option<RgbaImage> {
        if timeframe == self.active {
            let layer = &self.canvas(timeframe).layer;
            return layer
                .has_content()
                .then(|| mask::binary_mask_tiled(&layer.pixels, MaskBackground::Transparent));
        }
        self.stored_masks.get(&timeframe).cloned()
    }

    pub fn density_for(&self, timeframe: Timeframe) -> f32 {
        self.canvas(timeframe).density
    }

    pub fn set_density(&mut self, timeframe: Timeframe, density: f32) {
        let d = if density.is_finite() { density.clamp(1.0, 80.0) } else { timeframe.default_density() };
        self.canvas_mut(timeframe).density = d;
    }

    /// Strand alpha multiplier for a timeframe.
    pub fn brush_opacity(&self, timeframe: Timeframe) -> f32 {
        brush_opacity(self.density_for(timeframe))
    }

    /// Brush settings with the active timeframe's density and opacity.
    pub fn stroke_settings(&self) -> StrokeSettings {
        StrokeSettings {
            density: self.density_for(self.active),
            opacity: self.brush_opacity(self.active),
            ..self.brush_settings.clone()
        }
    }

    // -- Free-draw -----------------------------------------------------

    pub fn set_tool(&mut self, tool: Tool) {
        if self.brush.is_active() {
            self.stroke_end();
        }
        self.brush.tool = tool;
    }

    pub fn tool(&self) -> Tool {
        self.brush.tool
    }

    pub fn stroke_begin(&mut self, pos: Pos2) {
        self.mode = MarkMode::FreeMark;
        let layer = &self.canvases[slot(self.active)].layer;
        self.brush.begin(layer, pos);
    }

    pub fn stroke_to<R: Rng + ?Sized>(&mut self, rng: &mut R, pos: Pos2) -> Vec<Strand> {
        let settings = self.stroke_settings();
        let canvas = &mut self.canvases[slot(self.active)];
        self.brush.paint_to(&mut canvas.layer, rng, pos, &settings)
    }

    /// Returns true when the gesture produced a history entry.
    pub fn stroke_end(&mut self) -> bool {
        let canvas = &mut self.canvases[slot(self.active)];
        self.brush.end(&canvas.layer, &mut canvas.history)
    }

    pub fn undo(&mut self) -> Option<String> {
        let canvas = self.canvas_mut(self.active);
        canvas.history.undo(&mut canvas.layer)
    }

    pub fn redo(&mut self) -> Option<String> {
        let canvas = self.canvas_mut(self.active);
        canvas.history.redo(&mut canvas.layer)
    }

    /// Wipe the active drawing as one undoable step.
    pub fn clear_drawing(&mut self) -> bool {
        let canvas = self.canvas_mut(self.active);
        tools::clear_drawing(&mut canvas.layer, &mut canvas.history)
    }

    /// Restore a stored drawing (PNG data URL) into a timeframe, replacing
    /// its content and history.
    pub fn restore_drawing(&mut self, token: LoadToken, timeframe: Timeframe, data_url: &str) -> Result<bool> {
        if !self.is_current(token) {
            crate::log_warn!("session {}: dropping stale drawing for {}", self.id, timeframe.wire_name());
            return Ok(false);
        }
        let img = io::decode_data_url(data_url)?;
        self.restore_drawing_image(timeframe, &img)?;
        Ok(true)
    }

    pub fn restore_drawing_image(&mut self, timeframe: Timeframe, img: &RgbaImage) -> Result<()> {
        let (w, h) = self.dimensions();
        let layer = DrawingLayer::from_image(img, w, h)?;
        let canvas = self.canvas_mut(timeframe);
        canvas.layer = layer;
        canvas.history.clear();
        if timeframe != self.active {
            let m = mask::binary_mask(img, MaskBackground::Transparent);
            if mask::has_content(&m) {
                self.stored_masks.insert(timeframe, m);
            } else {
                self.stored_masks.remove(&timeframe);
            }
        }
        Ok(())
    }

    // -- Previews and submission ---------------------------------------

    /// Original with the marked area painted in the accent color.
    pub fn combined_preview(&self, timeframe: Timeframe) -> Option<RgbaImage> {
        let m = match self.mode {
            MarkMode::Region(_) => self.region_mask_on(MaskBackground::Transparent)?,
            MarkMode::FreeMark => self.timeframe_mask(timeframe)?,
        };
        Some(mask::overlay_composite(&self.original, &m))
    }

    /// Assemble the generation request for `timeframe`.
    pub fn build_form(&mut self, timeframe: Timeframe, hair_color: Option<&str>) -> Result<GenerationForm> {
        self.flush();

        let mask_3m = self.timeframe_mask(Timeframe::ThreeMonths);
        let mask_8m = self.timeframe_mask(Timeframe::EightMonths);
        if self.mode == MarkMode::FreeMark {
            validate_free_mark(timeframe, mask_3m.is_some(), mask_8m.is_some())?;
        }

        let hair_color = match (hair_color, self.brush_settings.color) {
            (Some(hex), _) => colors::color_name_hex(hex),
            (None, Some(rgb)) => colors::color_name(rgb),
            (None, None) => colors::color_name([0, 0, 0]),
        };

        let image = FilePart::jpeg("original_image.jpg", io::encode_jpeg(&self.original, ORIGINAL_JPEG_QUALITY)?);
        let (mut hairline_mask, mut hairline_points, mut hairline_pattern) = (None, None, None);

        let (combined_3m, combined_8m) = match self.mode {
            MarkMode::Region(_) => {
                hairline_pattern = Some(self.region.design);
                hairline_points = self.region.shape().map(HairlinePoints::from_shape);
                if let Some(m) = self.region_mask() {
                    hairline_mask = Some(FilePart::png("hairline_pattern_mask.png", io::encode_png(&m)?));
                }
                let combined = match self.region_mask_on(MaskBackground::Transparent) {
                    Some(m) => mask::overlay_composite(&self.original, &m),
                    None => self.original.clone(),
                };
                let png = io::encode_png(&combined)?;
                (FilePart::png("combined_3months.png", png.clone()), FilePart::png("combined_8months.png", png))
            }
            MarkMode::FreeMark => {
                let combined_for = |tf: Timeframe, m: &Option<RgbaImage>| -> Result<FilePart> {
                    let stem = format!("combined_{}", tf.wire_name());
                    Ok(match m {
                        Some(m) => {
                            let combined = mask::overlay_composite(&self.original, m);
                            FilePart::png(format!("{}.png", stem), io::encode_png(&combined)?)
                        }
                        None => FilePart::png(format!("{}_nomask.png", stem), io::encode_png(&self.original)?),
                    })
                };
                (combined_for(Timeframe::ThreeMonths, &mask_3m)?, combined_for(Timeframe::EightMonths, &mask_8m)?)
            }
        };

        let mask_part = |name: &str, m: &Option<RgbaImage>| -> Result<Option<FilePart>> {
            m.as_ref().map(|m| io::encode_png(m).map(|png| FilePart::png(name, png))).transpose()
        };

        Ok(GenerationForm {
            image,
            combined_3months: combined_3m,
            combined_8months: combined_8m,
            mask_3months: mask_part("mask_3months.png", &mask_3m)?,
            mask_8months: mask_part("mask_8months.png", &mask_8m)?,
            hairline_mask,
            hairline_pattern,
            hairline_points,
            hair_color,
            hair_type: self.brush_settings.texture,
            mode: self.mode,
            density_3m: self.density_for(Timeframe::ThreeMonths),
            density_8m: self.density_for(Timeframe::EightMonths),
            timeframe,
            face_detected: self.face_detected,
        })
    }
}

fn slot(timeframe: Timeframe) -> usize {
    match timeframe {
        Timeframe::ThreeMonths => 0,
        Timeframe::EightMonths => 1,
    }
}

/// `clamp(density / 80, 0.1, 1)`.
pub fn brush_opacity(density: f32) -> f32 {
    (density / 80.0).clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::submission::{Part, PartBody};
    use egui::pos2;
    use image::Rgba;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn face() -> FaceBounds {
        FaceBounds { left: 100.0, right: 300.0, top: 150.0, width: 200.0, height: 250.0, center_x: 200.0 }
    }

    fn session() -> ImageSession {
        let img = RgbaImage::from_pixel(400, 400, Rgba([90, 80, 70, 255]));
        ImageSession::new("portrait.png", img, &AppSettings::default())
    }

    fn paint(s: &mut ImageSession, rng: &mut StdRng, y: f32) {
        s.stroke_begin(pos2(150.0, y));
        s.stroke_to(rng, pos2(170.0, y));
        s.stroke_to(rng, pos2(190.0, y));
        s.stroke_end();
    }

    fn names(parts: &[Part]) -> Vec<&str> {
        parts.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_brush_opacity_clamps() {
        assert_eq!(brush_opacity(40.0), 0.5);
        assert_eq!(brush_opacity(1.0), 0.1);
        assert_eq!(brush_opacity(200.0), 1.0);
    }

    #[test]
    fn test_density_defaults_per_timeframe() {
        let mut s = session();
        assert_eq!(s.density_for(Timeframe::ThreeMonths), 25.0);
        assert_eq!(s.density_for(Timeframe::EightMonths), 50.0);
        s.set_density(Timeframe::EightMonths, f32::NAN);
        assert_eq!(s.density_for(Timeframe::EightMonths), 50.0);
        s.set_density(Timeframe::ThreeMonths, 500.0);
        assert_eq!(s.stroke_settings().density, 80.0);
        assert_eq!(s.stroke_settings().opacity, 1.0);
    }

    #[test]
    fn test_timeframes_keep_separate_drawings() {
        let mut s = session();
        let mut rng = StdRng::seed_from_u64(3);
        paint(&mut s, &mut rng, 100.0);
        assert!(s.layer(Timeframe::ThreeMonths).has_content());

        s.switch_timeframe(Timeframe::EightMonths);
        assert!(!s.layer(Timeframe::EightMonths).has_content());
        assert!(s.timeframe_mask(Timeframe::ThreeMonths).is_some());
        assert!(s.timeframe_mask(Timeframe::EightMonths).is_none());

        // undo only touches the active timeframe
        assert_eq!(s.undo(), None);
        s.switch_timeframe(Timeframe::ThreeMonths);
        assert_eq!(s.undo().as_deref(), Some("Hair Stroke"));
        assert!(!s.layer(Timeframe::ThreeMonths).has_content());
    }

    #[test]
    fn test_switch_mid_stroke_records_it() {
        let mut s = session();
        let mut rng = StdRng::seed_from_u64(5);
        s.stroke_begin(pos2(100.0, 100.0));
        s.stroke_to(&mut rng, pos2(120.0, 100.0));
        s.switch_timeframe(Timeframe::EightMonths);
        assert_eq!(s.history(Timeframe::ThreeMonths).undo_count(), 1);
    }

    #[test]
    fn test_stale_face_detection_dropped() {
        let mut s = session();
        let old = s.begin_load();
        let new = s.begin_load();
        let resp = FaceDetectionResponse {
            face_detection: crate::ops::submission::FaceDetection {
                face_detected: true,
                face_bounds: Some(face()),
                ..Default::default()
            },
        };
        assert!(!s.complete_face_detection(old, &resp));
        assert!(s.region.shape().is_none());
        assert!(s.complete_face_detection(new, &resp));
        assert!(s.region.shape().is_some());
        assert!(s.face_detected());
    }

    #[test]
    fn test_free_mark_form_requires_mask() {
        let mut s = session();
        s.mode = MarkMode::FreeMark;
        assert!(matches!(
            s.build_form(Timeframe::ThreeMonths, None),
            Err(crate::error::HairlineError::Request(_))
        ));

        let mut rng = StdRng::seed_from_u64(9);
        paint(&mut s, &mut rng, 200.0);
        assert!(s.build_form(Timeframe::EightMonths, None).is_err());

        let form = s.build_form(Timeframe::ThreeMonths, Some("#654321")).unwrap();
        assert_eq!(form.hair_color, "Dark Brown");
        assert_eq!(form.combined_3months.filename, "combined_3months.png");
        assert_eq!(form.combined_8months.filename, "combined_8months_nomask.png");
        let parts = form.parts().unwrap();
        assert!(names(&parts).contains(&"mask_3months"));
        assert!(!names(&parts).contains(&"mask_8months"));
    }

    #[test]
    fn test_region_form_shares_combined_image() {
        let mut s = session();
        s.set_face(Some(face()));
        s.select_pattern(PatternKind::Crown, HairlineDesign::MPattern);
        let form = s.build_form(Timeframe::EightMonths, None).unwrap();
        assert_eq!(form.hair_color, "Black");
        assert_eq!(form.combined_3months.data, form.combined_8months.data);
        let parts = form.parts().unwrap();
        let kind = parts.iter().find(|p| p.name == "hair_line_type").map(|p| &p.body);
        assert_eq!(kind, Some(&PartBody::Text("Crown".into())));
        assert!(names(&parts).contains(&"hairline_mask"));
    }

    #[test]
    fn test_nudge_region_survives_face_update() {
        let mut s = session();
        assert!(!s.nudge_region(5.0, 0.0));
        s.set_face(Some(face()));
        s.select_pattern(PatternKind::MidCrown, HairlineDesign::MPattern);
        assert!(!s.nudge_region(0.0, 0.0));
        assert!(s.nudge_region(10.0, 20.0));
        assert_eq!(s.region.shape().unwrap().anchors()[0], Pos2::new(210.0, 70.0));

        let mut moved = face();
        moved.top += 40.0;
        assert!(!s.set_face(Some(moved)));
        assert_eq!(s.region.shape().unwrap().anchors()[0], Pos2::new(210.0, 70.0));
    }

    #[test]
    fn test_combined_preview_marks_region() {
        let mut s = session();
        s.mask_background = MaskBackground::OpaqueBlack;
        s.set_face(Some(face()));
        s.select_pattern(PatternKind::MidCrown, HairlineDesign::MPattern);
        let preview = s.combined_preview(Timeframe::ThreeMonths).unwrap();
        // MidCrown center sits at (200, 50); corners stay untouched
        assert_eq!(preview.get_pixel(200, 50).0, [188, 244, 115, 255]);
        assert_eq!(preview.get_pixel(0, 399).0, [90, 80, 70, 255]);
    }

    #[test]
    fn test_restore_drawing_checks_size_and_token() {
        let mut s = session();
        let token = s.begin_load();
        let small = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]));
        let url = io::encode_png_data_url(&small).unwrap();
        assert!(s.restore_drawing(token, Timeframe::EightMonths, &url).is_err());

        let full = RgbaImage::from_pixel(400, 400, Rgba([1, 2, 3, 255]));
        let url = io::encode_png_data_url(&full).unwrap();
        let stale = s.begin_load();
        s.begin_load();
        assert!(!s.restore_drawing(stale, Timeframe::EightMonths, &url).unwrap());
    }
}
