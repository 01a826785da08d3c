//! Parameter types for image operations.
//!
//! These describe *what* the encode and resize steps should do, not *how*.
//! The exporter builds them from configuration; the
//! [`backend`](super::backend) and [`calculations`](super::calculations)
//! consume them.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`OutputFormat`]: Encoded file format, `jpeg` or `png`.
//! - [`ResizeSpec`]: Post-composite resize: `none`, `width:<px>`, `height:<px>` or `percent:<p>`.
//!
//! Each has a textual form (`FromStr` + `Display`) shared by the CLI, the
//! config file and saved templates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest width or height an exported image may have.
pub const MAX_DIMENSION: u32 = 65_535;

/// Largest accepted `percent:N` resize.
pub const MAX_RESIZE_PERCENT: u32 = 1_000;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

/// Output file format. Every output carries an alpha-free JPEG or an RGBA PNG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(format!("unknown output format '{other}': expected jpeg or png")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        })
    }
}

/// Resize applied after compositing. Width and height keep the aspect ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResizeSpec {
    #[default]
    None,
    Width(u32),
    Height(u32),
    Percent(u32),
}

impl ResizeSpec {
    /// Reject zero and sizes beyond [`MAX_DIMENSION`] / [`MAX_RESIZE_PERCENT`].
    pub fn validate(self) -> Result<Self, String> {
        let (value, max) = match self {
            ResizeSpec::None => return Ok(self),
            ResizeSpec::Width(px) | ResizeSpec::Height(px) => (px, MAX_DIMENSION),
            ResizeSpec::Percent(p) => (p, MAX_RESIZE_PERCENT),
        };
        if value == 0 || value > max {
            return Err(format!("invalid resize '{self}': value must be 1-{max}"));
        }
        Ok(self)
    }
}

impl FromStr for ResizeSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(ResizeSpec::None);
        }
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid resize '{s}': expected none, width:N, height:N or percent:N"))?;
        let value: u32 = value
            .trim()
            .parse()
            .map_err(|_| format!("invalid resize '{s}': '{value}' is not a whole number"))?;
        let spec = match kind.trim().to_ascii_lowercase().as_str() {
            "width" => ResizeSpec::Width(value),
            "height" => ResizeSpec::Height(value),
            "percent" => ResizeSpec::Percent(value),
            other => return Err(format!("invalid resize '{s}': unknown kind '{other}'")),
        };
        spec.validate()
    }
}

impl fmt::Display for ResizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeSpec::None => f.write_str("none"),
            ResizeSpec::Width(px) => write!(f, "width:{px}"),
            ResizeSpec::Height(px) => write!(f, "height:{px}"),
            ResizeSpec::Percent(p) => write!(f, "percent:{p}"),
        }
    }
}

impl TryFrom<String> for ResizeSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResizeSpec> for String {
    fn from(spec: ResizeSpec) -> Self {
        spec.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn output_format_accepts_jpg_alias() {
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("JPEG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert!("gif".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Png.to_string(), "png");
    }

    #[test]
    fn resize_parses_every_form() {
        assert_eq!("none".parse::<ResizeSpec>().unwrap(), ResizeSpec::None);
        assert_eq!("width:800".parse::<ResizeSpec>().unwrap(), ResizeSpec::Width(800));
        assert_eq!("height: 600".parse::<ResizeSpec>().unwrap(), ResizeSpec::Height(600));
        assert_eq!("percent:50".parse::<ResizeSpec>().unwrap(), ResizeSpec::Percent(50));
    }

    #[test]
    fn resize_rejects_bad_input() {
        for bad in ["", "width", "width:", "width:-3", "width:0", "depth:10", "percent:x"] {
            assert!(bad.parse::<ResizeSpec>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn resize_is_capped() {
        assert_eq!("width:65535".parse::<ResizeSpec>().unwrap(), ResizeSpec::Width(MAX_DIMENSION));
        assert!("width:65536".parse::<ResizeSpec>().is_err());
        assert!("height:4294967295".parse::<ResizeSpec>().is_err());
        assert!("percent:1001".parse::<ResizeSpec>().is_err());
        assert!(ResizeSpec::Percent(u32::MAX).validate().is_err());
        assert!(ResizeSpec::Percent(MAX_RESIZE_PERCENT).validate().is_ok());
        assert!(ResizeSpec::None.validate().is_ok());
    }

    #[test]
    fn resize_display_parses_back() {
        for spec in [
            ResizeSpec::None,
            ResizeSpec::Width(1),
            ResizeSpec::Height(1080),
            ResizeSpec::Percent(25),
        ] {
            assert_eq!(spec.to_string().parse::<ResizeSpec>().unwrap(), spec);
        }
    }
}
