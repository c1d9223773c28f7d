// ============================================================================
// GENERATION SUBMISSION: multipart form, backend responses, status messages
// ============================================================================
//
// The compositing engine only prepares what the remote generator consumes:
// a multipart/form-data body plus typed views over its JSON replies. The
// transport itself lives with the host.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{HairlineError, Result};
use crate::ops::shapes::{FaceBounds, HairlineDesign, PatternKind, RegionShape};
use crate::ops::strands::HairTexture;

/// Densities are slider values in 1..=80; the backend wants 0..=1.
pub const DENSITY_SCALE: f64 = 80.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Timeframe {
    #[default]
    ThreeMonths,
    EightMonths,
}

impl Timeframe {
    pub fn wire_name(self) -> &'static str {
        match self {
            Timeframe::ThreeMonths => "3months",
            Timeframe::EightMonths => "8months",
        }
    }

    /// Accepts `3months`, `3 months` and `3 Months` (same for 8).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(' ', "").as_str() {
            "3months" => Some(Timeframe::ThreeMonths),
            "8months" => Some(Timeframe::EightMonths),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Timeframe::ThreeMonths => Timeframe::EightMonths,
            Timeframe::EightMonths => Timeframe::ThreeMonths,
        }
    }

    /// Slider default for this timeframe.
    pub fn default_density(self) -> f32 {
        match self {
            Timeframe::ThreeMonths => 25.0,
            Timeframe::EightMonths => 50.0,
        }
    }

    pub fn all() -> [Timeframe; 2] {
        [Timeframe::ThreeMonths, Timeframe::EightMonths]
    }
}

pub fn normalize_density(density: f32) -> f64 {
    density as f64 / DENSITY_SCALE
}

/// How the user marked the area to fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkMode {
    FreeMark,
    Region(PatternKind),
}

impl MarkMode {
    /// Value of `hair_line_type`.
    pub fn hair_line_type(self) -> &'static str {
        match self {
            MarkMode::FreeMark => "FreeMark",
            MarkMode::Region(kind) => kind.wire_name(),
        }
    }
}

/// `hairline_points` payload: `[x, y]` pairs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HairlinePoints {
    pub inner: Vec<[f32; 2]>,
    pub outer: Vec<[f32; 2]>,
}

impl HairlinePoints {
    pub fn from_shape(shape: &RegionShape) -> Self {
        let (inner, outer) = shape.inner_outer();
        let pairs = |pts: Vec<egui::Pos2>| -> Vec<[f32; 2]> { pts.into_iter().map(|p| [p.x, p.y]).collect() };
        Self { inner: pairs(inner), outer: pairs(outer) }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Form model
// ============================================================================

/// An encoded file attached to the form.
#[derive(Clone, Debug, PartialEq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FilePart {
    pub fn png(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self { filename: filename.into(), content_type: "image/png".into(), data }
    }

    pub fn jpeg(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self { filename: filename.into(), content_type: "image/jpeg".into(), data }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PartBody {
    Text(String),
    File(FilePart),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub name: String,
    pub body: PartBody,
}

/// Everything one generation request carries.
#[derive(Clone, Debug)]
pub struct GenerationForm {
    pub image: FilePart,
    pub combined_3months: FilePart,
    pub combined_8months: FilePart,
    pub mask_3months: Option<FilePart>,
    pub mask_8months: Option<FilePart>,
    pub hairline_mask: Option<FilePart>,
    pub hairline_pattern: Option<HairlineDesign>,
    pub hairline_points: Option<HairlinePoints>,
    pub hair_color: String,
    pub hair_type: HairTexture,
    pub mode: MarkMode,
    pub density_3m: f32,
    pub density_8m: f32,
    pub timeframe: Timeframe,
    pub face_detected: bool,
}

impl GenerationForm {
    /// Fields in submission order.
    pub fn parts(&self) -> Result<Vec<Part>> {
        let mut parts = Vec::with_capacity(16);
        let text = |name: &str, value: String| Part { name: name.into(), body: PartBody::Text(value) };
        let file = |name: &str, f: &FilePart| Part { name: name.into(), body: PartBody::File(f.clone()) };

        parts.push(file("image", &self.image));
        parts.push(text("hair_color", self.hair_color.clone()));
        parts.push(text("hair_type", self.hair_type.hair_type().into()));
        parts.push(text("hair_line_type", self.mode.hair_line_type().into()));
        parts.push(text("hair_density_3m", normalize_density(self.density_3m).to_string()));
        parts.push(text("hair_density_8m", normalize_density(self.density_8m).to_string()));
        parts.push(text("timeframe", self.timeframe.wire_name().into()));
        parts.push(text("face_detected", self.face_detected.to_string()));

        if let MarkMode::Region(_) = self.mode {
            let design = self.hairline_pattern.unwrap_or_default();
            parts.push(text("hairline_pattern", design.wire_name().into()));
            if let Some(ref mask) = self.hairline_mask {
                parts.push(file("hairline_mask", mask));
            } else if let Some(ref points) = self.hairline_points {
                parts.push(text("hairline_points", points.to_json()?));
            }
        }

        if let Some(ref m) = self.mask_3months {
            parts.push(file("mask_3months", m));
        }
        if let Some(ref m) = self.mask_8months {
            parts.push(file("mask_8months", m));
        }

        parts.push(file("image_3months", &self.combined_3months));
        parts.push(file("image_8months", &self.combined_8months));
        Ok(parts)
    }

    /// Encode as `multipart/form-data`. Returns `(content_type, body)`.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let boundary = new_boundary();
        let body = encode_multipart(&self.parts()?, &boundary);
        Ok((content_type(&boundary), body))
    }
}

/// Free-mark requests need a mask for the requested timeframe.
pub fn validate_free_mark(timeframe: Timeframe, has_3m: bool, has_8m: bool) -> Result<()> {
    if !has_3m && !has_8m {
        return Err(HairlineError::Request(
            "FreeMark mode requires at least one mask. Please draw masks for the desired timeframes.".into(),
        ));
    }
    let has_required = match timeframe {
        Timeframe::ThreeMonths => has_3m,
        Timeframe::EightMonths => has_8m,
    };
    if !has_required {
        return Err(HairlineError::Request(format!(
            "No mask found for {}. Please create a mask for this timeframe first.",
            timeframe.wire_name()
        )));
    }
    Ok(())
}

// ============================================================================
// multipart/form-data encoding
// ============================================================================

pub fn new_boundary() -> String {
    format!("----HairlineFEBoundary{}", uuid::Uuid::new_v4().simple())
}

pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace(['\r', '\n'], " ")
}

pub fn encode_multipart(parts: &[Part], boundary: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match part.body {
            PartBody::Text(ref value) => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape_quoted(&part.name))
                        .as_bytes(),
                );
                out.extend_from_slice(value.as_bytes());
            }
            PartBody::File(ref f) => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        escape_quoted(&part.name),
                        escape_quoted(&f.filename),
                        f.content_type
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(&f.data);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    out
}

// ============================================================================
// Backend responses
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationResponse {
    pub success: Option<bool>,
    pub image: Option<String>,
    pub filename: Option<String>,
    pub request_id: Option<String>,
    pub generation_method: Option<String>,
    pub timeframe: Option<String>,
    pub hair_type: Option<String>,
    pub hair_color: Option<String>,
    pub hair_density_3m: Option<f64>,
    pub hair_density_8m: Option<f64>,
    pub current_hair_density: Option<f64>,
    pub error: Option<String>,
    pub code: Option<String>,
}

/// Where the generated picture can be found.
#[derive(Clone, Debug, PartialEq)]
pub enum GeneratedImage {
    /// Inline PNG as a data URL.
    DataUrl(String),
    /// To be fetched from the backend's image route.
    Remote(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationResult {
    pub image: GeneratedImage,
    pub request_id: Option<String>,
    pub generation_method: Option<String>,
    pub timeframe: Option<Timeframe>,
}

impl GenerationResponse {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Normalise a successful reply. Bare base64 is wrapped as a PNG data URL;
    /// a `filename` reply points at `<base_url>/images/<filename>`.
    pub fn into_result(self, base_url: &str) -> Result<GenerationResult> {
        if self.success == Some(false) {
            let msg = self.error.unwrap_or_else(|| "Hair generation failed".into());
            return Err(HairlineError::Request(msg));
        }
        let image = match (self.image, self.filename) {
            (Some(img), _) if img.starts_with("data:") => GeneratedImage::DataUrl(img),
            (Some(img), _) => GeneratedImage::DataUrl(format!("data:image/png;base64,{}", img)),
            (None, Some(name)) => {
                GeneratedImage::Remote(format!("{}/images/{}", base_url.trim_end_matches('/'), name))
            }
            (None, None) => {
                return Err(HairlineError::Request(
                    "Invalid response: No image data received from server".into(),
                ));
            }
        };
        Ok(GenerationResult {
            image,
            request_id: self.request_id,
            generation_method: self.generation_method,
            timeframe: self.timeframe.as_deref().and_then(Timeframe::parse),
        })
    }
}

/// User-facing message for a failed HTTP reply.
///
/// A JSON `detail` or `message` string wins, then any non-empty body text,
/// then a per-status default.
pub fn error_message(status: u16, reason: &str, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message"] {
            if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
                return s.to_string();
            }
        }
    }
    if !body.trim().is_empty() {
        return body.to_string();
    }
    match status {
        400 => "Invalid request parameters. Please check your settings.".into(),
        413 => "Image file too large. Please use a smaller image.".into(),
        429 => "Too many requests. Please wait a moment and try again.".into(),
        500 => "Server error occurred. Please try again later.".into(),
        503 => "Service temporarily unavailable. Please try again later.".into(),
        _ => format!("Server error ({}): {}", status, reason),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    #[serde(default)]
    pub face_detected: bool,
    #[serde(default)]
    pub face_bounds: Option<FaceBounds>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceDetectionResponse {
    #[serde(default)]
    pub face_detection: FaceDetection,
}

impl FaceDetectionResponse {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Bounds only when a face was actually detected.
    pub fn bounds(&self) -> Option<FaceBounds> {
        let fd = &self.face_detection;
        if fd.face_detected { fd.face_bounds } else { None }
    }
}

// ============================================================================
// Health check cache
// ============================================================================

/// Remembers the last health probe for a while so every request does not
/// hit `/health` first.
#[derive(Clone, Debug, Default)]
pub struct HealthCache {
    last: Option<(Instant, bool)>,
}

impl HealthCache {
    /// Cached verdict if younger than `ttl`.
    pub fn get(&self, now: Instant, ttl: Duration) -> Option<bool> {
        self.last
            .filter(|(at, _)| now.saturating_duration_since(*at) < ttl)
            .map(|(_, healthy)| healthy)
    }

    pub fn record(&mut self, now: Instant, healthy: bool) {
        self.last = Some((now, healthy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::shapes::circle_around;
    use egui::pos2;

    fn form() -> GenerationForm {
        GenerationForm {
            image: FilePart::jpeg("original_image.jpg", vec![1, 2, 3]),
            combined_3months: FilePart::png("combined_3months.png", vec![4]),
            combined_8months: FilePart::png("combined_8months.png", vec![5]),
            mask_3months: None,
            mask_8months: None,
            hairline_mask: None,
            hairline_pattern: Some(HairlineDesign::ZPattern),
            hairline_points: Some(HairlinePoints { inner: vec![[1.0, 2.0]], outer: vec![] }),
            hair_color: "Dark Brown".into(),
            hair_type: HairTexture::Wavy,
            mode: MarkMode::Region(PatternKind::Hairline),
            density_3m: 25.0,
            density_8m: 50.0,
            timeframe: Timeframe::EightMonths,
            face_detected: true,
        }
    }

    fn text_value<'a>(parts: &'a [Part], name: &str) -> Option<&'a str> {
        parts.iter().find(|p| p.name == name).and_then(|p| match p.body {
            PartBody::Text(ref s) => Some(s.as_str()),
            PartBody::File(_) => None,
        })
    }

    #[test]
    fn test_form_fields() {
        let parts = form().parts().unwrap();
        assert_eq!(text_value(&parts, "hair_density_3m"), Some("0.3125"));
        assert_eq!(text_value(&parts, "hair_density_8m"), Some("0.625"));
        assert_eq!(text_value(&parts, "hair_type"), Some("Wavy Hair"));
        assert_eq!(text_value(&parts, "hair_line_type"), Some("Hairline"));
        assert_eq!(text_value(&parts, "hairline_pattern"), Some("Z Pattern"));
        assert_eq!(text_value(&parts, "timeframe"), Some("8months"));
        assert_eq!(text_value(&parts, "face_detected"), Some("true"));
        assert_eq!(text_value(&parts, "hairline_points"), Some(r#"{"inner":[[1.0,2.0]],"outer":[]}"#));
    }

    #[test]
    fn test_mask_replaces_points_and_free_mark_skips_pattern() {
        let mut f = form();
        f.hairline_mask = Some(FilePart::png("hairline_pattern_mask.png", vec![9]));
        let parts = f.parts().unwrap();
        assert!(parts.iter().any(|p| p.name == "hairline_mask"));
        assert!(!parts.iter().any(|p| p.name == "hairline_points"));

        f.mode = MarkMode::FreeMark;
        f.mask_8months = Some(FilePart::png("mask_8months.png", vec![7]));
        let parts = f.parts().unwrap();
        assert_eq!(text_value(&parts, "hair_line_type"), Some("FreeMark"));
        assert!(!parts.iter().any(|p| p.name.starts_with("hairline")));
        assert!(parts.iter().any(|p| p.name == "mask_8months"));
    }

    #[test]
    fn test_multipart_layout() {
        let parts = vec![
            Part { name: "timeframe".into(), body: PartBody::Text("3months".into()) },
            Part { name: "image".into(), body: PartBody::File(FilePart::png("a.png", b"PNG".to_vec())) },
        ];
        let body = String::from_utf8(encode_multipart(&parts, "XYZ")).unwrap();
        assert_eq!(
            body,
            "--XYZ\r\nContent-Disposition: form-data; name=\"timeframe\"\r\n\r\n3months\r\n\
             --XYZ\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNG\r\n--XYZ--\r\n"
        );
    }

    #[test]
    fn test_boundary_is_unique() {
        assert_ne!(new_boundary(), new_boundary());
        assert!(content_type("b").ends_with("boundary=b"));
    }

    #[test]
    fn test_free_mark_validation() {
        assert!(validate_free_mark(Timeframe::ThreeMonths, false, false).is_err());
        assert!(validate_free_mark(Timeframe::ThreeMonths, false, true).is_err());
        assert!(validate_free_mark(Timeframe::EightMonths, false, true).is_ok());
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!(Timeframe::parse("3 Months"), Some(Timeframe::ThreeMonths));
        assert_eq!(Timeframe::parse("8months"), Some(Timeframe::EightMonths));
        assert_eq!(Timeframe::parse("1 year"), None);
        assert_eq!(Timeframe::ThreeMonths.other(), Timeframe::EightMonths);
    }

    #[test]
    fn test_response_normalisation() {
        let r = GenerationResponse::parse(r#"{"image":"QUJD","request_id":"r1","timeframe":"3months"}"#).unwrap();
        let res = r.into_result("http://x").unwrap();
        assert_eq!(res.image, GeneratedImage::DataUrl("data:image/png;base64,QUJD".into()));
        assert_eq!(res.timeframe, Some(Timeframe::ThreeMonths));

        let r = GenerationResponse::parse(r#"{"filename":"out.png"}"#).unwrap();
        assert_eq!(r.into_result("http://x/").unwrap().image, GeneratedImage::Remote("http://x/images/out.png".into()));

        let r = GenerationResponse::parse(r#"{"success":true}"#).unwrap();
        assert!(r.into_result("http://x").is_err());
        let r = GenerationResponse::parse(r#"{"success":false,"error":"bad mask"}"#).unwrap();
        assert!(matches!(r.into_result("http://x"), Err(HairlineError::Request(m)) if m == "bad mask"));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(error_message(500, "ISE", r#"{"detail":"GPU out of memory"}"#), "GPU out of memory");
        assert_eq!(error_message(400, "Bad", r#"{"message":"bad density"}"#), "bad density");
        assert_eq!(error_message(502, "Bad Gateway", "upstream down"), "upstream down");
        assert_eq!(error_message(413, "", ""), "Image file too large. Please use a smaller image.");
        assert_eq!(error_message(429, "", "  "), "Too many requests. Please wait a moment and try again.");
        assert_eq!(error_message(418, "I'm a teapot", ""), "Server error (418): I'm a teapot");
    }

    #[test]
    fn test_face_detection_parse() {
        let json = r#"{"face_detection":{"face_detected":true,"confidence":0.97,
            "face_bounds":{"left":100,"right":300,"top":50,"width":200,"height":250,"center_x":200}}}"#;
        let resp = FaceDetectionResponse::parse(json).unwrap();
        assert_eq!(resp.bounds().map(|b| b.center_x), Some(200.0));

        let resp = FaceDetectionResponse::parse(r#"{"face_detection":{"face_detected":false,"error":"no face"}}"#).unwrap();
        assert_eq!(resp.bounds(), None);
        assert!(FaceDetectionResponse::parse("{oops").is_err());
    }

    #[test]
    fn test_points_from_circle() {
        let pts = HairlinePoints::from_shape(&circle_around(pos2(10.0, 20.0), 5.0));
        assert_eq!(pts.inner.len(), 5);
        assert_eq!(pts.inner[0], [10.0, 20.0]);
        assert!(pts.outer.is_empty());
    }

    #[test]
    fn test_health_cache_expires() {
        let mut cache = HealthCache::default();
        let t0 = Instant::now();
        assert_eq!(cache.get(t0, Duration::from_secs(30)), None);
        cache.record(t0, true);
        assert_eq!(cache.get(t0 + Duration::from_secs(10), Duration::from_secs(30)), Some(true));
        assert_eq!(cache.get(t0 + Duration::from_secs(31), Duration::from_secs(30)), None);
    }
}
