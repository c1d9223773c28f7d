use std::sync::Arc;

use egui::{Pos2, Rect, Vec2, pos2};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::{HairlineError, Result};

// ============================================================================
// COORDINATE MAPPER
// ============================================================================

/// Where the raster is currently shown on screen.
///
/// Hosts rebuild this from the live element rect on every pointer event;
/// nothing here caches a scale factor, so resizes are picked up for free.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasView {
    /// On-screen rect of the element in display pixels.
    pub display_rect: Rect,
    /// Unscaled raster size in image pixels.
    pub native_size: Vec2,
}

impl CanvasView {
    pub fn new(display_rect: Rect, native_width: u32, native_height: u32) -> Self {
        Self {
            display_rect,
            native_size: Vec2::new(native_width as f32, native_height as f32),
        }
    }

    /// An element with no layout yet (zero display size) counts as unmounted.
    pub fn is_mounted(&self) -> bool {
        self.display_rect.width() > 0.0 && self.display_rect.height() > 0.0
    }
}

/// Map a pointer position in display space into image-native pixels.
/// Returns `(0, 0)` while the target element is not mounted.
pub fn to_image_space(pointer: Pos2, view: Option<&CanvasView>) -> Pos2 {
    let Some(view) = view.filter(|v| v.is_mounted()) else {
        return Pos2::ZERO;
    };
    let rect = view.display_rect;
    pos2(
        (pointer.x - rect.min.x) * view.native_size.x / rect.width(),
        (pointer.y - rect.min.y) * view.native_size.y / rect.height(),
    )
}

/// Inverse of [`to_image_space`]: image pixels to display position.
pub fn to_display_space(image_pos: Pos2, view: Option<&CanvasView>) -> Pos2 {
    let Some(view) = view.filter(|v| v.is_mounted() && v.native_size.x > 0.0 && v.native_size.y > 0.0)
    else {
        return Pos2::ZERO;
    };
    let rect = view.display_rect;
    pos2(
        rect.min.x + image_pos.x * rect.width() / view.native_size.x,
        rect.min.y + image_pos.y * rect.height() / view.native_size.y,
    )
}

// ============================================================================
// TILED IMAGE
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

static TRANSPARENT_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Sparse RGBA raster stored as 64×64 chunks.
///
/// Chunks sit behind `Arc`, so `clone()` is a reference-count bump and
/// writes copy only the chunk they touch (`Arc::make_mut`). Undo snapshots
/// of a drawing layer therefore cost almost nothing until the layer changes.
#[derive(Clone)]
pub struct TiledImage {
    pub width: u32,
    pub height: u32,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<RgbaImage>>>,
}

impl TiledImage {
    /// Fully transparent image. Zero or absurd dimensions clamp to 1×1.
    pub fn new(width: u32, height: u32) -> Self {
        let total = width as u64 * height as u64;
        let (width, height) = if total == 0 || total > 256_000_000 {
            crate::log_warn!("TiledImage::new: {}x{} out of range, using 1x1", width, height);
            (1, 1)
        } else {
            (width, height)
        };
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let rows = height.div_ceil(CHUNK_SIZE);
        Self {
            width,
            height,
            chunks_per_row,
            chunks: vec![None; (chunks_per_row * rows) as usize],
        }
    }

    /// Import a flat image; fully transparent chunks are not stored.
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let mut img = Self::new(src.width(), src.height());
        if img.width != src.width() || img.height != src.height() {
            return img;
        }
        let (w, h) = (img.width, img.height);
        let cpr = img.chunks_per_row as usize;
        let raw = src.as_raw();

        let built: Vec<Option<Arc<RgbaImage>>> = (0..img.chunks.len())
            .into_par_iter()
            .map(|flat| {
                let base_x = (flat % cpr) as u32 * CHUNK_SIZE;
                let base_y = (flat / cpr) as u32 * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(w - base_x) as usize;
                let ch = CHUNK_SIZE.min(h - base_y);
                let stride = CHUNK_SIZE as usize * 4;
                let mut data = vec![0u8; stride * CHUNK_SIZE as usize];
                let mut opaque_any = false;
                for ly in 0..ch {
                    let src_off = ((base_y + ly) * w + base_x) as usize * 4;
                    let row = &raw[src_off..src_off + cw * 4];
                    opaque_any |= row.chunks_exact(4).any(|px| px[3] != 0);
                    let dst_off = ly as usize * stride;
                    data[dst_off..dst_off + cw * 4].copy_from_slice(row);
                }
                if !opaque_any {
                    return None;
                }
                RgbaImage::from_raw(CHUNK_SIZE, CHUNK_SIZE, data).map(Arc::new)
            })
            .collect();

        img.chunks = built;
        img
    }

    /// Flatten into a contiguous image.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let stride = self.width as usize * 4;
        let out_raw: &mut [u8] = &mut out;
        for (cx, cy) in self.chunk_keys() {
            let Some(chunk) = self.get_chunk(cx, cy) else { continue };
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            let cw = CHUNK_SIZE.min(self.width - base_x) as usize;
            let ch = CHUNK_SIZE.min(self.height - base_y) as usize;
            let chunk_raw = chunk.as_raw();
            for ly in 0..ch {
                let src = ly * CHUNK_SIZE as usize * 4;
                let dst = (base_y as usize + ly) * stride + base_x as usize * 4;
                out_raw[dst..dst + cw * 4].copy_from_slice(&chunk_raw[src..src + cw * 4]);
            }
        }
        out
    }

    #[inline(always)]
    fn slot(&self, x: u32, y: u32) -> usize {
        ((y / CHUNK_SIZE) * self.chunks_per_row + x / CHUNK_SIZE) as usize
    }

    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> &Rgba<u8> {
        if x >= self.width || y >= self.height {
            return &TRANSPARENT_PIXEL;
        }
        self.chunks[self.slot(x, y)]
            .as_ref()
            .map(|c| c.get_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE))
            .unwrap_or(&TRANSPARENT_PIXEL)
    }

    /// Write a pixel (creates the chunk on demand, COW-clones if shared).
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.slot(x, y);
        let arc = self.chunks[idx].get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
        Arc::make_mut(arc).put_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE, pixel);
    }

    /// Source-over composite of a straight-alpha RGBA buffer placed at
    /// `(dst_x, dst_y)`. Transparent source pixels never allocate chunks.
    pub fn composite_rgba_at(&mut self, dst_x: i32, dst_y: i32, src_w: u32, src_h: u32, data: &[u8]) {
        debug_assert_eq!(data.len(), src_w as usize * src_h as usize * 4);
        for sy in 0..src_h {
            let gy = dst_y + sy as i32;
            if gy < 0 || gy as u32 >= self.height {
                continue;
            }
            let row = sy as usize * src_w as usize * 4;
            for sx in 0..src_w {
                let gx = dst_x + sx as i32;
                if gx < 0 || gx as u32 >= self.width {
                    continue;
                }
                let off = row + sx as usize * 4;
                let src = [data[off], data[off + 1], data[off + 2], data[off + 3]];
                if src[3] == 0 {
                    continue;
                }
                let (gx, gy) = (gx as u32, gy as u32);
                let below = *self.get_pixel(gx, gy);
                self.put_pixel(gx, gy, Rgba(blend_over(below.0, src)));
            }
        }
    }

    pub fn get_chunk(&self, cx: u32, cy: u32) -> Option<&RgbaImage> {
        let idx = (cy * self.chunks_per_row + cx) as usize;
        self.chunks.get(idx).and_then(|c| c.as_deref())
    }

    /// Coordinates of populated chunks.
    pub fn chunk_keys(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let cpr = self.chunks_per_row;
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(move |(i, _)| ((i as u32) % cpr, (i as u32) / cpr))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    /// True when any stored byte is non-zero.
    pub fn has_content(&self) -> bool {
        self.chunks
            .iter()
            .flatten()
            .any(|chunk| chunk.as_raw().iter().any(|&b| b != 0))
    }

    /// Drop all chunks.
    pub fn clear(&mut self) {
        for slot in &mut self.chunks {
            *slot = None;
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Approximate bytes owned by this image. Chunks shared with a
    /// snapshot only count their pointer.
    pub fn memory_bytes(&self) -> usize {
        let chunk_bytes = (CHUNK_SIZE * CHUNK_SIZE * 4) as usize;
        self.chunks
            .iter()
            .flatten()
            .map(|arc| {
                if Arc::strong_count(arc) == 1 {
                    chunk_bytes
                } else {
                    std::mem::size_of::<usize>() * 2
                }
            })
            .sum()
    }

    /// Pixel-exact comparison (sparse vs. explicit transparent chunks compare equal).
    pub fn pixels_eq(&self, other: &TiledImage) -> bool {
        if self.width != other.width || self.height != other.height {
            return false;
        }
        self.chunks.iter().zip(&other.chunks).all(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a.as_raw() == b.as_raw(),
            (Some(c), None) | (None, Some(c)) => c.as_raw().iter().all(|&v| v == 0),
            (None, None) => true,
        })
    }
}

/// Straight-alpha source-over.
#[inline]
pub fn blend_over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

// ============================================================================
// DRAWING LAYER
// ============================================================================

/// Persistent free-draw surface for one timeframe.
#[derive(Clone)]
pub struct DrawingLayer {
    pub pixels: TiledImage,
    /// Bounding box of pixels touched since the last `take_dirty`.
    dirty: Option<Rect>,
}

impl DrawingLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: TiledImage::new(width, height),
            dirty: None,
        }
    }

    /// Restore a stored drawing; it must match the layer size.
    pub fn from_image(src: &RgbaImage, width: u32, height: u32) -> Result<Self> {
        if src.width() != width || src.height() != height {
            return Err(HairlineError::Dimensions {
                expected_w: width,
                expected_h: height,
                actual_w: src.width(),
                actual_h: src.height(),
            });
        }
        Ok(Self {
            pixels: TiledImage::from_rgba_image(src),
            dirty: Some(Rect::from_min_size(Pos2::ZERO, Vec2::new(width as f32, height as f32))),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn has_content(&self) -> bool {
        self.pixels.has_content()
    }

    pub fn clear(&mut self) {
        self.pixels.clear();
        self.mark_dirty(None);
    }

    /// `None` marks the whole layer.
    pub fn mark_dirty(&mut self, rect: Option<Rect>) {
        let full = Rect::from_min_size(Pos2::ZERO, Vec2::new(self.width() as f32, self.height() as f32));
        let rect = rect.map_or(full, |r| r.intersect(full));
        self.dirty = Some(match self.dirty {
            Some(d) => d.union(rect),
            None => rect,
        });
    }

    pub fn take_dirty(&mut self) -> Option<Rect> {
        self.dirty.take()
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        self.pixels.to_rgba_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> CanvasView {
        CanvasView::new(Rect::from_min_size(pos2(10.0, 20.0), Vec2::new(400.0, 300.0)), 800, 600)
    }

    #[test]
    fn test_to_image_space_scales_by_native_over_display() {
        let p = to_image_space(pos2(110.0, 170.0), Some(&view()));
        assert_eq!(p, pos2(200.0, 300.0));
    }

    #[test]
    fn test_to_image_space_unmounted_is_origin() {
        assert_eq!(to_image_space(pos2(50.0, 50.0), None), Pos2::ZERO);
        let collapsed = CanvasView::new(Rect::from_min_size(pos2(0.0, 0.0), Vec2::ZERO), 800, 600);
        assert_eq!(to_image_space(pos2(50.0, 50.0), Some(&collapsed)), Pos2::ZERO);
    }

    #[test]
    fn test_mapper_follows_resize() {
        let mut v = view();
        let before = to_image_space(pos2(410.0, 320.0), Some(&v));
        assert_eq!(before, pos2(800.0, 600.0));
        v.display_rect = Rect::from_min_size(pos2(10.0, 20.0), Vec2::new(800.0, 600.0));
        let after = to_image_space(pos2(410.0, 320.0), Some(&v));
        assert_eq!(after, pos2(400.0, 300.0));
    }

    #[test]
    fn test_display_round_trip() {
        let v = view();
        let img = pos2(123.0, 456.0);
        let back = to_image_space(to_display_space(img, Some(&v)), Some(&v));
        assert!((back.x - img.x).abs() < 1e-3 && (back.y - img.y).abs() < 1e-3);
    }

    #[test]
    fn test_tiled_round_trip_and_sparsity() {
        let mut src = RgbaImage::new(130, 70);
        src.put_pixel(129, 69, Rgba([1, 2, 3, 255]));
        let tiled = TiledImage::from_rgba_image(&src);
        assert_eq!(tiled.chunk_count(), 1);
        assert_eq!(tiled.to_rgba_image(), src);
        assert!(tiled.has_content());
    }

    #[test]
    fn test_clone_is_copy_on_write() {
        let mut a = TiledImage::new(64, 64);
        a.put_pixel(3, 3, Rgba([9, 9, 9, 255]));
        let snapshot = a.clone();
        a.put_pixel(3, 3, Rgba([0, 0, 0, 0]));
        assert_eq!(snapshot.get_pixel(3, 3).0, [9, 9, 9, 255]);
        assert_eq!(a.get_pixel(3, 3).0, [0, 0, 0, 0]);
        assert!(!a.has_content());
    }

    #[test]
    fn test_composite_over_opaque_replaces() {
        let mut img = TiledImage::new(4, 4);
        img.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        let src = [255u8, 0, 0, 255];
        img.composite_rgba_at(1, 1, 1, 1, &src);
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_blend_over_half_alpha() {
        let out = blend_over([0, 0, 0, 255], [255, 255, 255, 128]);
        assert_eq!(out[3], 255);
        assert!((out[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn test_drawing_layer_size_mismatch() {
        let src = RgbaImage::new(5, 5);
        assert!(matches!(
            DrawingLayer::from_image(&src, 6, 5),
            Err(HairlineError::Dimensions { .. })
        ));
    }
}
