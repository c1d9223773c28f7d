// ============================================================================
// MASK COMPOSITOR: binary masks and the colored preview composite
// ============================================================================

use image::{RgbaImage, imageops};
use rayon::prelude::*;

use crate::canvas::{TiledImage, blend_over};
use crate::error::Result;

pub const MASK_WHITE: [u8; 4] = [255, 255, 255, 255];

/// Accent painted over marked pixels in the combined preview.
pub const PREVIEW_ACCENT: [u8; 4] = [188, 244, 115, 255];

/// Mask alpha above this counts as marked in the combined preview.
pub const PREVIEW_ALPHA_THRESHOLD: u8 = 10;

/// What unmarked pixels of a binary mask become. Downstream consumers
/// disagree, so callers pick explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MaskBackground {
    /// `(0, 0, 0, 0)`
    #[default]
    Transparent,
    /// `(0, 0, 0, 255)`
    OpaqueBlack,
}

impl MaskBackground {
    pub fn pixel(self) -> [u8; 4] {
        match self {
            MaskBackground::Transparent => [0, 0, 0, 0],
            MaskBackground::OpaqueBlack => [0, 0, 0, 255],
        }
    }

    pub fn config_name(self) -> &'static str {
        match self {
            MaskBackground::Transparent => "transparent",
            MaskBackground::OpaqueBlack => "opaque_black",
        }
    }

    pub fn from_config_name(s: &str) -> Option<Self> {
        match s {
            "transparent" => Some(MaskBackground::Transparent),
            "opaque_black" | "black" => Some(MaskBackground::OpaqueBlack),
            _ => None,
        }
    }
}

/// White wherever the source has any alpha, `background` elsewhere.
pub fn binary_mask(src: &RgbaImage, background: MaskBackground) -> RgbaImage {
    let bg = background.pixel();
    let mut out = RgbaImage::new(src.width(), src.height());
    let out_raw: &mut [u8] = &mut out;
    out_raw
        .par_chunks_mut(4)
        .zip(src.as_raw().par_chunks(4))
        .for_each(|(dst, px)| dst.copy_from_slice(if px[3] > 0 { &MASK_WHITE } else { &bg }));
    out
}

/// Binary mask straight from a tiled drawing layer.
pub fn binary_mask_tiled(layer: &TiledImage, background: MaskBackground) -> RgbaImage {
    binary_mask(&layer.to_rgba_image(), background)
}

/// Original image with every marked mask pixel replaced by the accent.
///
/// The mask is reduced to accent-or-transparent first, then composited
/// over the original. A mask of another size is resampled to the
/// original's native resolution.
pub fn overlay_composite(original: &RgbaImage, mask: &RgbaImage) -> RgbaImage {
    let scaled;
    let mask = if mask.dimensions() == original.dimensions() {
        mask
    } else {
        crate::log_info!(
            "overlay_composite: scaling mask {}x{} to {}x{}",
            mask.width(),
            mask.height(),
            original.width(),
            original.height()
        );
        scaled = imageops::resize(mask, original.width(), original.height(), imageops::FilterType::Nearest);
        &scaled
    };

    let mut out = original.clone();
    let out_raw: &mut [u8] = &mut out;
    out_raw
        .par_chunks_mut(4)
        .zip(mask.as_raw().par_chunks(4))
        .for_each(|(dst, m)| {
            let top = if m[3] > PREVIEW_ALPHA_THRESHOLD { PREVIEW_ACCENT } else { [0, 0, 0, 0] };
            if top[3] == 0 {
                return;
            }
            let below = [dst[0], dst[1], dst[2], dst[3]];
            dst.copy_from_slice(&blend_over(below, top));
        });
    out
}

/// [`overlay_composite`] with the mask supplied as a data URL.
pub fn overlay_composite_from_data_url(original: &RgbaImage, mask_url: &str) -> Result<RgbaImage> {
    let mask = crate::io::decode_data_url(mask_url)?;
    Ok(overlay_composite(original, &mask))
}

/// Count of fully white pixels, handy for reporting mask coverage.
pub fn marked_pixel_count(mask: &RgbaImage) -> usize {
    mask.pixels().filter(|p| p.0 == MASK_WHITE).count()
}

/// True when any byte of the raster is non-zero.
pub fn has_content(img: &RgbaImage) -> bool {
    img.as_raw().iter().any(|&b| b != 0)
}
