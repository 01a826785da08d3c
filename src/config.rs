//! Configuration module.
//!
//! Handles loading, validating, and merging `photomark.toml`. Stock defaults
//! are the base layer; a user file overrides any subset of keys; command-line
//! flags override both.
//!
//! ## Config File Location
//!
//! `--config PATH` names the file explicitly. Otherwise
//! `<config_dir>/photomark/photomark.toml` is used when it exists
//! (`~/.config/photomark/photomark.toml` on Linux).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [watermark]
//! text = "{{date}}"          # {{date}} is replaced by the capture date
//! # logo = "logo.png"        # Stamp an image instead of text
//! scale = 100                # Logo scale, percent
//! font_size = 80
//! color = "#ff0000"
//! opacity = 100              # 0-100
//! stroke = false
//! shadow = false
//! rotation = 0.0             # Degrees, counter-clockwise
//! position = "bottom-right"  # Preset name, or "X,Y" fractions
//!
//! [date]
//! use_file_date = false      # Fall back to file modification date
//! # default = "2024-01-01"   # Last-resort date
//! on_missing = "skip"        # skip | empty
//!
//! [export]
//! format = "jpeg"            # jpeg | png
//! quality = 90               # JPEG quality (1-100)
//! naming = "keep-original"   # keep-original | prefix:<text> | suffix:<text>
//! resize = "none"            # none | width:N | height:N | percent:N
//! recursive = true
//!
//! [fonts]
//! # path = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
//!
//! [templates]
//! # path = "~/.config/photomark/templates.json"
//!
//! [processing]
//! max_processes = 4          # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::date::{self, DateOptions, MissingDatePolicy};
use crate::imaging::{OutputFormat, Quality, ResizeSpec};
use crate::naming::NamingRule;
use crate::types::{Color, DATE_TOKEN, Placement, WatermarkKind, WatermarkSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `photomark.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Watermark content and style.
    pub watermark: WatermarkConfig,
    /// Date resolution fallbacks.
    pub date: DateConfig,
    /// Output format, naming and resizing.
    pub export: ExportConfig,
    pub fonts: FontsConfig,
    pub templates: TemplatesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: String| ConfigError::Validation(e);
        self.watermark_spec()
            .validate()
            .map_err(|e| invalid(format!("watermark: {e}")))?;
        self.watermark
            .position
            .parse::<Placement>()
            .map_err(|e| invalid(format!("watermark.position: {e}")))?;
        if let Some(default) = &self.date.default {
            date::parse_default_date(default).map_err(|e| invalid(format!("date.default: {e}")))?;
        }
        if self.export.quality == 0 || self.export.quality > 100 {
            return Err(invalid("export.quality must be 1-100".into()));
        }
        if self.processing.max_processes == Some(0) {
            return Err(invalid("processing.max_processes must be positive".into()));
        }
        Ok(())
    }

    /// The watermark described by the `[watermark]` table.
    ///
    /// A configured logo wins over text.
    pub fn watermark_spec(&self) -> WatermarkSpec {
        let w = &self.watermark;
        let kind = match &w.logo {
            Some(source) => WatermarkKind::Image {
                source: source.clone(),
                scale_percent: w.scale,
            },
            None => WatermarkKind::Text {
                text: w.text.clone(),
            },
        };
        WatermarkSpec {
            kind,
            font_size: w.font_size,
            color: w.color,
            opacity: w.opacity,
            stroke: w.stroke,
            shadow: w.shadow,
            rotation_degrees: w.rotation,
        }
        .with_rotation(w.rotation)
    }

    /// Parsed `watermark.position`. Falls back to the default placement when
    /// called on an unvalidated config.
    pub fn placement(&self) -> Placement {
        self.watermark.position.parse().unwrap_or_default()
    }

    pub fn date_options(&self) -> Result<DateOptions, ConfigError> {
        let default_date = self
            .date
            .default
            .as_deref()
            .map(date::parse_default_date)
            .transpose()
            .map_err(ConfigError::Validation)?;
        Ok(DateOptions {
            use_file_date: self.date.use_file_date,
            default_date,
        })
    }
}

/// `[watermark]` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    pub text: String,
    pub logo: Option<PathBuf>,
    /// Logo scale, percent of its natural size.
    pub scale: u32,
    pub font_size: u32,
    pub color: Color,
    pub opacity: u8,
    pub stroke: bool,
    pub shadow: bool,
    pub rotation: f64,
    pub position: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: DATE_TOKEN.to_string(),
            logo: None,
            scale: 100,
            font_size: 80,
            color: Color::rgb(255, 0, 0),
            opacity: 100,
            stroke: false,
            shadow: false,
            rotation: 0.0,
            position: Placement::default().to_string(),
        }
    }
}

/// `[date]` settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DateConfig {
    pub use_file_date: bool,
    /// `YYYY-MM-DD`, checked by [`AppConfig::validate`].
    pub default: Option<String>,
    pub on_missing: MissingDatePolicy,
}

/// `[export]` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub format: OutputFormat,
    pub quality: u32,
    pub naming: NamingRule,
    pub resize: ResizeSpec,
    pub recursive: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: Quality::default().value(),
            naming: NamingRule::default(),
            resize: ResizeSpec::default(),
            recursive: true,
        }
    }
}

/// `[fonts]` settings. Without a path, platform font directories are searched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontsConfig {
    pub path: Option<PathBuf>,
}

/// `[templates]` settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Template store file; defaults to the platform config directory.
    pub path: Option<PathBuf>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(AppConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Where the config file lives when `--config` is not given.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("photomark").join("photomark.toml"))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the default location is used if
/// present and stock defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };
    let overlay = match path {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `photomark.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# photomark configuration
# =======================
#
# Every key is optional; the values below are the defaults.
# Command-line flags override anything set here.

[watermark]
# Text to stamp. {{date}} is replaced by the photo's capture date (YYYY-MM-DD).
text = "{{date}}"

# Stamp an image (e.g. a PNG logo with transparency) instead of text.
# logo = "/path/to/logo.png"

# Logo size as a percentage of its natural size.
scale = 100

# Text size in pixels.
font_size = 80

# Text color: #rgb, #rrggbb, #rrggbbaa or a name (red, white, black, ...).
color = "#ff0000"

# 0 (invisible) to 100 (fully opaque).
opacity = 100

# Outline the text in black or white, whichever contrasts with the color.
stroke = false

# Soft drop shadow beneath the text.
shadow = false

# Counter-clockwise rotation in degrees.
rotation = 0.0

# One of: top-left, top-center, top-right, center-left, center, center-right,
# bottom-left, bottom-center, bottom-right. Or "X,Y": the watermark center as
# fractions of the image size, e.g. "0.5,0.9".
position = "bottom-right"

[date]
# When a photo has no EXIF capture date, use the file's modification date.
use_file_date = false

# Last-resort date, YYYY-MM-DD.
# default = "2024-01-01"

# What to do when no date can be found:
#   skip  - leave the photo out and warn
#   empty - export it with the date left blank
on_missing = "skip"

[export]
# jpeg or png.
format = "jpeg"

# JPEG quality, 1-100. Ignored for PNG.
quality = 90

# keep-original, prefix:<text> or suffix:<text>.
naming = "keep-original"

# none, width:N, height:N or percent:N. Applied after the watermark.
resize = "none"

# Descend into subdirectories; the output mirrors the input tree.
recursive = true

[fonts]
# Font file for text watermarks. When unset, DejaVu Sans, Liberation Sans,
# Arial, Noto Sans and Helvetica are looked up in the system font folders.
# path = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"

[templates]
# Saved watermark templates. Defaults to templates.json in the photomark
# config directory.
# path = "/path/to/templates.json"

[processing]
# Maximum parallel workers. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_processes = 4
"##
}
