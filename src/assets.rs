use std::path::{Path, PathBuf};

use crate::ops::mask::MaskBackground;

// ============================================================================
// STATIC TABLES
// ============================================================================

/// Swatches offered next to the color picker.
pub const PREDEFINED_COLORS: &[(&str, &str)] = &[
    ("#F0E2B6", "Blonde"),
    ("#6F4E37", "Coffee Brown"),
    ("#808080", "Gray"),
    ("#964B00", "Brown"),
    ("#654321", "Dark Brown"),
    ("#000000", "Black"),
];

pub const HAIR_TYPES: &[&str] = &["Curly Hair", "Straight Hair", "Wavy Hair"];

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Backend routes, relative to the configured base URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    GenerateIndividual,
    Generate3Months,
    Generate8Months,
    DetectFace,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Health => "/health",
            Endpoint::GenerateIndividual => "/generate/individual",
            Endpoint::Generate3Months => "/generate-3months",
            Endpoint::Generate8Months => "/generate-8months",
            Endpoint::DetectFace => "/detect-face",
        }
    }
}

// ============================================================================
// APP SETTINGS
// ============================================================================

/// User configuration persisted as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    pub backend_url: String,
    /// History depth per timeframe layer.
    pub max_undo_steps: usize,
    /// Background written under unmarked pixels of binary masks.
    pub mask_background: MaskBackground,
    pub generation_timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub health_cache_secs: u64,
    /// Anchor hit-test radius in image pixels.
    pub hit_radius: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            max_undo_steps: 50,
            mask_background: MaskBackground::Transparent,
            generation_timeout_secs: 60,
            health_timeout_secs: 10,
            health_cache_secs: 30,
            hit_radius: 80.0,
        }
    }
}

impl AppSettings {
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("HairlineFE").join("hairlinefe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("HairlineFE")
                    .join("hairlinefe_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("hairlinefe").join("hairlinefe_settings.cfg"))
        }
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.backend_url.trim_end_matches('/'), endpoint.path())
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "backend_url={}\n\
             max_undo_steps={}\n\
             mask_background={}\n\
             generation_timeout_secs={}\n\
             health_timeout_secs={}\n\
             health_cache_secs={}\n\
             hit_radius={}\n",
            self.backend_url,
            self.max_undo_steps,
            self.mask_background.config_name(),
            self.generation_timeout_secs,
            self.health_timeout_secs,
            self.health_cache_secs,
            self.hit_radius,
        )
    }

    /// Parse config text. Unknown keys and unparsable values keep defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "backend_url" if !val.is_empty() => s.backend_url = val.to_string(),
                "max_undo_steps" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.max_undo_steps = v.clamp(1, 500);
                    }
                }
                "mask_background" => {
                    if let Some(bg) = MaskBackground::from_config_name(val) {
                        s.mask_background = bg;
                    }
                }
                "generation_timeout_secs" => {
                    if let Ok(v) = val.parse() {
                        s.generation_timeout_secs = v;
                    }
                }
                "health_timeout_secs" => {
                    if let Ok(v) = val.parse() {
                        s.health_timeout_secs = v;
                    }
                }
                "health_cache_secs" => {
                    if let Ok(v) = val.parse() {
                        s.health_cache_secs = v;
                    }
                }
                "hit_radius" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                        && v > 0.0
                    {
                        s.hit_radius = v;
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("could not save settings to {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }
}
