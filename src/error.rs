use thiserror::Error;

#[derive(Error, Debug)]
pub enum HairlineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid data URL: {0}")]
    DataUrl(String),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dimension mismatch: expected {expected_w}x{expected_h}, got {actual_w}x{actual_h}")]
    Dimensions {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    #[error("Invalid request: {0}")]
    Request(String),

    #[error("Invalid setting '{key}': {reason}")]
    Settings { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, HairlineError>;
