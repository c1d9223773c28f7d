use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};

use crate::error::{HairlineError, Result};

/// Raster formats accepted as input photos (lowercase extensions).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Load any supported photo as straight-alpha RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path)?.to_rgba8();
    crate::log_info!("loaded {} ({}x{})", path.display(), img.width(), img.height());
    Ok(img)
}

pub fn load_image_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

// ============================================================================
// Encoding
// ============================================================================

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
    Ok(buf)
}

/// JPEG has no alpha; the image is flattened to RGB first.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(buf)
}

/// Encode as PNG and write to `path`.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    let bytes = encode_png(image)?;
    write_bytes(&bytes, path)
}

pub fn write_bytes(bytes: &[u8], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

// ============================================================================
// Data URLs
// ============================================================================

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// `data:image/png;base64,...` for the image.
pub fn encode_png_data_url(image: &RgbaImage) -> Result<String> {
    let png = encode_png(image)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Split a base64 data URL into its mime type and payload bytes.
pub fn decode_data_url_bytes(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .trim()
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| HairlineError::DataUrl("missing 'data:' prefix".into()))?;
    let (mime, payload) = rest
        .split_once(BASE64_MARKER)
        .ok_or_else(|| HairlineError::DataUrl("only base64 payloads are supported".into()))?;
    if !mime.starts_with("image/") {
        return Err(HairlineError::DataUrl(format!("not an image: '{}'", mime)));
    }
    let bytes = STANDARD.decode(payload.trim())?;
    Ok((mime.to_string(), bytes))
}

/// Decode an `image/*` base64 data URL into RGBA.
pub fn decode_data_url(url: &str) -> Result<RgbaImage> {
    let (_, bytes) = decode_data_url_bytes(url)?;
    load_image_bytes(&bytes)
}

/// Guess an image mime type from the leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Decode an encoded image held in memory and report its dimensions only.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = image::io::Reader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}
