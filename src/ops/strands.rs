// ============================================================================
// STROKE BRUSH ENGINE: procedural hair strands
// ============================================================================
//
// Each paint sample scatters `density` strands around the pointer. A strand
// is a short random walk whose angular noise depends on the hair texture,
// drawn with a tapering width, a four-stop alpha gradient and a small blur.
// Geometry synthesis and rasterisation are separate so the walk can be
// inspected without touching pixels.

use std::f32::consts::{PI, TAU};

use egui::{Pos2, Rect, pos2, vec2};
use rand::Rng;

use crate::canvas::DrawingLayer;
use crate::ops::filters::{blur_padding, gaussian_blur_rgba};
use crate::ops::raster::{coverage, flatten_quadratic, sdf_segment};

/// Used when no hair color has been chosen.
pub const DEFAULT_VARIANTS: [[u8; 3]; 4] = [
    [0x2a, 0x18, 0x10],
    [0x3d, 0x23, 0x17],
    [0x4a, 0x2c, 0x1a],
    [0x5d, 0x36, 0x21],
];

const VARIANT_FACTORS: [f32; 4] = [0.6, 0.9, 1.2, 1.5];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum HairTexture {
    #[default]
    Straight,
    Wavy,
    Curly,
}

impl HairTexture {
    /// Value sent as `hair_type`.
    pub fn hair_type(self) -> &'static str {
        match self {
            HairTexture::Straight => "Straight Hair",
            HairTexture::Wavy => "Wavy Hair",
            HairTexture::Curly => "Curly Hair",
        }
    }

    /// Accepts `straight` as well as `Straight Hair`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.strip_suffix(" hair").unwrap_or(&s) {
            "straight" => Some(HairTexture::Straight),
            "wavy" => Some(HairTexture::Wavy),
            "curly" => Some(HairTexture::Curly),
            _ => None,
        }
    }

    /// Random spread added to the travel direction per strand (radians).
    fn direction_variation(self) -> f32 {
        match self {
            HairTexture::Straight => 0.3,
            HairTexture::Wavy => 0.5,
            HairTexture::Curly => 0.8,
        }
    }
}

/// Brush parameters read on every paint sample.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeSettings {
    pub brush_size: f32,
    pub hair_length: f32,
    /// 1..=10; higher is fainter and blurrier.
    pub hair_softness: f32,
    /// 0..=10, curly texture only.
    pub curl_intensity: f32,
    pub texture: HairTexture,
    /// Strands per paint sample (1..=80).
    pub density: f32,
    pub color: Option<[u8; 3]>,
    /// Multiplier on strand alpha.
    pub opacity: f32,
}

impl Default for StrokeSettings {
    fn default() -> Self {
        Self {
            brush_size: 40.0,
            hair_length: 80.0,
            hair_softness: 6.0,
            curl_intensity: 0.0,
            texture: HairTexture::Straight,
            density: 25.0,
            color: None,
            opacity: 1.0,
        }
    }
}

impl StrokeSettings {
    /// Copy with every numeric field finite and inside its slider range.
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        let pick = |v: f32, def: f32, lo: f32, hi: f32| if v.is_finite() { v.clamp(lo, hi) } else { def };
        Self {
            brush_size: pick(self.brush_size, d.brush_size, 5.0, 200.0),
            hair_length: pick(self.hair_length, d.hair_length, 10.0, 300.0),
            hair_softness: pick(self.hair_softness, d.hair_softness, 1.0, 10.0),
            curl_intensity: pick(self.curl_intensity, d.curl_intensity, 0.0, 10.0),
            texture: self.texture,
            density: pick(self.density, d.density, 1.0, 80.0),
            color: self.color,
            opacity: pick(self.opacity, d.opacity, 0.0, 1.0),
        }
    }
}

/// Four shades of the base color (×0.6, ×0.9, ×1.2, ×1.5, clamped).
pub fn color_variants(color: Option<[u8; 3]>) -> [[u8; 3]; 4] {
    let Some(base) = color else { return DEFAULT_VARIANTS };
    VARIANT_FACTORS.map(|f| base.map(|c| (c as f32 * f).floor().clamp(0.0, 255.0) as u8))
}

/// Strands drawn for one paint sample.
pub fn strands_per_step(settings: &StrokeSettings) -> usize {
    let base = settings.density.floor().max(1.0);
    let n = match settings.texture {
        HairTexture::Curly => (base * 0.7).ceil(),
        _ => base,
    };
    (n as usize).max(1)
}

pub fn segment_count(texture: HairTexture, length: f32) -> usize {
    let (min, per) = match texture {
        HairTexture::Straight => (4, 20.0),
        HairTexture::Wavy => (8, 15.0),
        HairTexture::Curly => (12, 10.0),
    };
    ((length / per).floor() as usize).max(min)
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Linear gradient with straight-alpha stops sorted by offset.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearGradient {
    pub start: Pos2,
    pub end: Pos2,
    pub stops: Vec<(f32, [u8; 4])>,
}

impl LinearGradient {
    pub fn solid(color: [u8; 4]) -> Self {
        Self { start: Pos2::ZERO, end: Pos2::ZERO, stops: vec![(0.0, color)] }
    }

    pub fn sample(&self, p: Pos2) -> [u8; 4] {
        let Some(&(_, first)) = self.stops.first() else { return [0, 0, 0, 0] };
        let axis = self.end - self.start;
        let len_sq = axis.length_sq();
        let t = if len_sq > 0.0 { ((p - self.start).dot(axis) / len_sq).clamp(0.0, 1.0) } else { 0.0 };

        let mut prev = (0.0f32, first);
        for &(offset, color) in &self.stops {
            if t <= offset {
                let span = offset - prev.0;
                let k = if span > 0.0 { (t - prev.0) / span } else { 1.0 };
                let mut out = [0u8; 4];
                for c in 0..4 {
                    out[c] = (prev.1[c] as f32 + (color[c] as f32 - prev.1[c] as f32) * k).round() as u8;
                }
                return out;
            }
            prev = (offset, color);
        }
        prev.1
    }
}

/// One walk step: a line, or a quadratic curve when `ctrl` is set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathPiece {
    pub from: Pos2,
    pub ctrl: Option<Pos2>,
    pub to: Pos2,
    pub width: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StrokePath {
    pub pieces: Vec<PathPiece>,
    pub gradient: LinearGradient,
    /// Gaussian sigma in pixels, 0 = sharp.
    pub blur: f32,
}

impl StrokePath {
    /// Straight sub-segments with their widths, quadratics flattened.
    fn flattened(&self) -> Vec<(Pos2, Pos2, f32)> {
        let mut out = Vec::with_capacity(self.pieces.len() * 6);
        for piece in &self.pieces {
            match piece.ctrl {
                None => out.push((piece.from, piece.to, piece.width)),
                Some(ctrl) => {
                    let mut prev = piece.from;
                    for p in flatten_quadratic(piece.from, ctrl, piece.to, 6) {
                        out.push((prev, p, piece.width));
                        prev = p;
                    }
                }
            }
        }
        out
    }

    /// Bounding rect of all pieces, including control points.
    pub fn bounds(&self) -> Option<Rect> {
        let first = self.pieces.first()?;
        let mut rect = Rect::from_two_pos(first.from, first.to);
        for piece in &self.pieces {
            rect.extend_with(piece.from);
            rect.extend_with(piece.to);
            if let Some(c) = piece.ctrl {
                rect.extend_with(c);
            }
        }
        Some(rect)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Strand {
    pub origin: Pos2,
    pub length: f32,
    pub texture: HairTexture,
    pub body: StrokePath,
    /// Occasional short glint on curly hair.
    pub highlight: Option<StrokePath>,
}

impl Strand {
    pub fn segment_count(&self) -> usize {
        self.body.pieces.len()
    }
}

/// Build one strand around `(x, y)`. `direction` is the travel angle, or
/// `None` for a random start angle.
pub fn synthesize_strand<R: Rng + ?Sized>(
    rng: &mut R,
    x: f32,
    y: f32,
    settings: &StrokeSettings,
    direction: Option<f32>,
) -> Strand {
    let variants = color_variants(settings.color);
    let base_color = variants[rng.gen_range(0..variants.len())];

    let brush = settings.brush_size;
    let texture = settings.texture;
    let ci = settings.curl_intensity;

    let origin = pos2(
        x + (rng.r#gen::<f32>() - 0.5) * brush * 0.4,
        y + (rng.r#gen::<f32>() - 0.5) * brush * 0.4,
    );
    let length = settings.hair_length * 0.7 + rng.r#gen::<f32>() * settings.hair_length * 0.6;
    let segments = segment_count(texture, length);
    let mut angle = direction.unwrap_or_else(|| rng.r#gen::<f32>() * TAU);
    let base_thickness = 0.8 + (brush / 200.0) * (1.0 + rng.r#gen::<f32>() * 0.8);
    let softness = settings.hair_softness / 10.0;

    // f64: f32 puts 0.9 - 0.4 just under 0.5 and every floored stop one low
    let alpha = (0.9 - f64::from(settings.hair_softness) / 10.0 * 0.4).max(0.2) * f64::from(settings.opacity);
    let stop = |scale: f64| {
        let a = (alpha * scale + 1e-9).floor().clamp(0.0, 255.0) as u8;
        [base_color[0], base_color[1], base_color[2], a]
    };
    let gradient = LinearGradient {
        start: origin,
        end: origin + vec2(length * 0.3, length * 0.3),
        stops: vec![(0.0, stop(100.0)), (0.4, stop(180.0)), (0.8, stop(220.0)), (1.0, stop(120.0))],
    };

    let mut wave_phase = rng.r#gen::<f32>() * TAU;
    let mut curl_phase = rng.r#gen::<f32>() * TAU;
    let step = length / segments as f32;
    let mut cursor = origin;
    let mut pieces = Vec::with_capacity(segments);

    for i in 0..segments {
        let progress = i as f32 / segments as f32;

        angle += match texture {
            HairTexture::Straight => (rng.r#gen::<f32>() - 0.5) * 0.1,
            HairTexture::Wavy => {
                wave_phase += 0.3;
                wave_phase.sin() * 0.4 + (rng.r#gen::<f32>() - 0.5) * 0.2
            }
            HairTexture::Curly => {
                curl_phase += 0.5 + (ci / 10.0) * 0.8;
                (curl_phase.sin() * 0.8 + (curl_phase * 1.5).cos() * 0.6) * (1.0 + ci / 10.0)
            }
        };

        let width = (base_thickness * (1.0 - progress * 0.5) + rng.r#gen::<f32>() * 0.3).max(0.5);

        let mut next = cursor + vec2(angle.cos(), angle.sin()) * step;
        match texture {
            HairTexture::Curly => {
                let spiral = 2.0 + (ci / 10.0) * 8.0;
                next += vec2((curl_phase * 2.0).cos(), (curl_phase * 2.0).sin()) * spiral * progress;
            }
            HairTexture::Wavy => {
                let amplitude = 3.0 + (progress * PI).sin() * 4.0;
                next += vec2(wave_phase.cos() * amplitude * 0.5, wave_phase.sin() * amplitude * 0.3);
            }
            HairTexture::Straight => {}
        }

        if i as f32 > segments as f32 * 0.6 {
            let gravity = if texture == HairTexture::Straight { 0.03 } else { 0.015 };
            angle += gravity * progress;
        }

        let ctrl = (texture != HairTexture::Straight).then(|| {
            let mid = cursor + (next - cursor) * 0.5;
            mid + vec2((rng.r#gen::<f32>() - 0.5) * 3.0, (rng.r#gen::<f32>() - 0.5) * 3.0)
        });
        pieces.push(PathPiece { from: cursor, ctrl, to: next, width });
        cursor = next;
    }

    let body = StrokePath { pieces, gradient, blur: softness * 0.8 };

    let highlight = (texture == HairTexture::Curly && rng.r#gen::<f32>() < 0.15).then(|| {
        let lightest = variants[variants.len() - 1];
        let from = pos2(
            x + (rng.r#gen::<f32>() - 0.5) * brush * 0.2,
            y + (rng.r#gen::<f32>() - 0.5) * brush * 0.2,
        );
        let to = from + vec2(angle.cos(), angle.sin()) * length * 0.2;
        let a = (0x60 as f32 * settings.opacity).round() as u8;
        StrokePath {
            pieces: vec![PathPiece { from, ctrl: None, to, width: base_thickness * 0.3 }],
            gradient: LinearGradient::solid([lightest[0], lightest[1], lightest[2], a]),
            blur: softness * 1.2,
        }
    });

    Strand { origin, length, texture, body, highlight }
}

// ============================================================================
// RASTERISATION
// ============================================================================

/// Rasterise one stroke into a local buffer, blur it, then composite it
/// source-over onto the layer. Pixels already on the layer are never blurred.
pub fn render_stroke(layer: &mut DrawingLayer, path: &StrokePath) {
    let Some(bounds) = path.bounds() else { return };
    let max_half = path.pieces.iter().map(|p| p.width).fold(0.0f32, f32::max) * 0.5;
    let pad = max_half + 1.0 + blur_padding(path.blur) as f32;

    let (lw, lh) = (layer.width() as f32, layer.height() as f32);
    let x0 = (bounds.min.x - pad).floor().max(0.0);
    let y0 = (bounds.min.y - pad).floor().max(0.0);
    let x1 = (bounds.max.x + pad).ceil().min(lw);
    let y1 = (bounds.max.y + pad).ceil().min(lh);
    if !(x0 < x1 && y0 < y1) {
        return;
    }
    let (ox, oy) = (x0 as i32, y0 as i32);
    let (w, h) = ((x1 - x0) as usize, (y1 - y0) as usize);

    // Union coverage: max over sub-segments, each scanned only in its own box.
    let mut cov = vec![0.0f32; w * h];
    for (a, b, width) in path.flattened() {
        let half = width * 0.5;
        let sx0 = ((a.x.min(b.x) - half - 1.0).floor() as i32 - ox).max(0) as usize;
        let sy0 = ((a.y.min(b.y) - half - 1.0).floor() as i32 - oy).max(0) as usize;
        let sx1 = (((a.x.max(b.x) + half + 1.0).ceil() as i32 - ox).max(0) as usize).min(w);
        let sy1 = (((a.y.max(b.y) + half + 1.0).ceil() as i32 - oy).max(0) as usize).min(h);
        for py in sy0..sy1 {
            for px in sx0..sx1 {
                let p = pos2((ox + px as i32) as f32 + 0.5, (oy + py as i32) as f32 + 0.5);
                let c = coverage(sdf_segment(p, a, b) - half);
                let slot = &mut cov[py * w + px];
                if c > *slot {
                    *slot = c;
                }
            }
        }
    }

    // Colour comes from the gradient everywhere so the blur does not pull
    // black in from empty pixels.
    let mut buf = vec![0u8; w * h * 4];
    for py in 0..h {
        for px in 0..w {
            let p = pos2((ox + px as i32) as f32 + 0.5, (oy + py as i32) as f32 + 0.5);
            let color = path.gradient.sample(p);
            let off = (py * w + px) * 4;
            buf[off..off + 3].copy_from_slice(&color[..3]);
            buf[off + 3] = (color[3] as f32 * cov[py * w + px]).round() as u8;
        }
    }

    gaussian_blur_rgba(&mut buf, w, h, path.blur);
    layer.pixels.composite_rgba_at(ox, oy, w as u32, h as u32, &buf);
    layer.mark_dirty(Some(Rect::from_min_max(pos2(x0, y0), pos2(x1, y1))));
}

pub fn render_strand(layer: &mut DrawingLayer, strand: &Strand) {
    render_stroke(layer, &strand.body);
    if let Some(ref highlight) = strand.highlight {
        render_stroke(layer, highlight);
    }
}

/// Draw one paint sample worth of strands at `(x, y)` and return them.
///
/// `prior_direction` is the pointer's travel angle since the last sample;
/// each strand deviates from it by a texture-dependent random amount.
/// Settings are sanitized first, so out-of-range values cannot fail.
pub fn paint_step<R: Rng + ?Sized>(
    layer: &mut DrawingLayer,
    rng: &mut R,
    x: f32,
    y: f32,
    settings: &StrokeSettings,
    prior_direction: Option<f32>,
) -> Vec<Strand> {
    let settings = settings.sanitized();
    let spread = settings.texture.direction_variation();
    let count = strands_per_step(&settings);
    let mut strands = Vec::with_capacity(count);
    for _ in 0..count {
        let direction = prior_direction.map(|d| d + (rng.r#gen::<f32>() - 0.5) * spread);
        let strand = synthesize_strand(rng, x, y, &settings, direction);
        render_strand(layer, &strand);
        strands.push(strand);
    }
    strands
}
