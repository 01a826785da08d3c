//! Watermark value types shared by the layout engine, the compositor, the
//! template store and the exporter.
//!
//! Everything here is plain data: cheap to clone, serializable, and validated
//! on construction or through [`WatermarkSpec::validate`]. Templates persist
//! these types verbatim, so their serde shape is part of the on-disk format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Text token replaced by the resolved capture date.
pub const DATE_TOKEN: &str = "{{date}}";

/// Largest accepted font size, in pixels.
pub const MAX_FONT_SIZE: u32 = 2_000;

/// Largest accepted logo scale, in percent.
pub const MAX_SCALE_PERCENT: u32 = 1_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("invalid color '{0}': use a name (red, white, ...) or #RGB, #RRGGBB, #RRGGBBAA")]
    Color(String),
    #[error("unknown position '{0}': expected one of {1}")]
    Position(String, String),
    #[error("invalid freeform position '{0}': expected X,Y with both in 0..=1")]
    Freeform(String),
    #[error("invalid watermark: {0}")]
    Spec(String),
}

// ============================================================================
// Color
// ============================================================================

/// An RGBA color. Alpha is independent of the watermark opacity; the two
/// multiply when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("blue", [0, 0, 255]),
    ("white", [255, 255, 255]),
    ("black", [0, 0, 0]),
    ("yellow", [255, 255, 0]),
    ("cyan", [0, 255, 255]),
    ("magenta", [255, 0, 255]),
    ("orange", [255, 165, 0]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
];

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub const fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    /// Relative luminance in `[0, 1]` (Rec. 709 weights on sRGB values).
    pub fn luminance(self) -> f32 {
        (0.2126 * self.r as f32 + 0.7152 * self.g as f32 + 0.0722 * self.b as f32) / 255.0
    }

    /// Black for light colors, white for dark ones.
    pub fn contrasting(self) -> Self {
        if self.luminance() > 0.5 {
            Self::black()
        } else {
            Self::white()
        }
    }
}

impl FromStr for Color {
    type Err = ValueError;

    /// Parse a named color or a hex string.
    ///
    /// Supports `#RGB` (each digit doubled), `#RRGGBB` and `#RRGGBBAA`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        if let Some((_, [r, g, b])) = NAMED_COLORS.iter().find(|(name, _)| *name == lower) {
            return Ok(Self::rgb(*r, *g, *b));
        }

        let err = || ValueError::Color(s.to_string());
        let hex = lower.strip_prefix('#').ok_or_else(err)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        match hex.len() {
            3 => {
                let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map_err(|_| err());
                Ok(Self::rgb(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17))
            }
            6 => Ok(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

impl TryFrom<String> for Color {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

// ============================================================================
// Placement
// ============================================================================

/// The nine grid anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Preset {
    pub const ALL: [Preset; 9] = [
        Preset::TopLeft,
        Preset::TopCenter,
        Preset::TopRight,
        Preset::CenterLeft,
        Preset::Center,
        Preset::CenterRight,
        Preset::BottomLeft,
        Preset::BottomCenter,
        Preset::BottomRight,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Preset::TopLeft => "top-left",
            Preset::TopCenter => "top-center",
            Preset::TopRight => "top-right",
            Preset::CenterLeft => "center-left",
            Preset::Center => "center",
            Preset::CenterRight => "center-right",
            Preset::BottomLeft => "bottom-left",
            Preset::BottomCenter => "bottom-center",
            Preset::BottomRight => "bottom-right",
        }
    }
}

impl FromStr for Preset {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Preset::ALL
            .into_iter()
            .find(|p| p.token() == wanted)
            .ok_or_else(|| {
                let tokens: Vec<&str> = Preset::ALL.iter().map(|p| p.token()).collect();
                ValueError::Position(s.to_string(), tokens.join(", "))
            })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Where a watermark goes on the canvas.
///
/// Freeform coordinates are fractions of the canvas size, so a template saved
/// against one photo lands in the same relative spot on any other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Placement {
    Preset { anchor: Preset },
    Freeform { x: f64, y: f64 },
}

impl Placement {
    /// Freeform center point; both coordinates must lie in `[0, 1]`.
    pub fn freeform(x: f64, y: f64) -> Result<Self, ValueError> {
        let valid = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if valid(x) && valid(y) {
            Ok(Placement::Freeform { x, y })
        } else {
            Err(ValueError::Freeform(format!("{x},{y}")))
        }
    }

    pub fn validate(&self) -> Result<(), ValueError> {
        match *self {
            Placement::Preset { .. } => Ok(()),
            Placement::Freeform { x, y } => Placement::freeform(x, y).map(|_| ()),
        }
    }
}

impl From<Preset> for Placement {
    fn from(anchor: Preset) -> Self {
        Placement::Preset { anchor }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Preset::BottomRight.into()
    }
}

impl FromStr for Placement {
    type Err = ValueError;

    /// Either a preset token (`bottom-right`) or `X,Y` fractions (`0.25,0.8`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((x, y)) = s.split_once(',') {
            let parse = |v: &str| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|_| ValueError::Freeform(s.to_string()))
            };
            return Placement::freeform(parse(x)?, parse(y)?);
        }
        s.parse::<Preset>().map(Placement::from)
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Preset { anchor } => write!(f, "{anchor}"),
            Placement::Freeform { x, y } => write!(f, "{x},{y}"),
        }
    }
}

// ============================================================================
// Watermark specification
// ============================================================================

/// What the watermark shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WatermarkKind {
    /// Literal text; [`DATE_TOKEN`] is replaced by the resolved capture date.
    Text { text: String },
    /// A logo decoded from `source`, scaled by `scale_percent`.
    Image {
        source: PathBuf,
        #[serde(default = "default_scale_percent")]
        scale_percent: u32,
    },
}

fn default_scale_percent() -> u32 {
    100
}

/// One complete watermark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    #[serde(flatten)]
    pub kind: WatermarkKind,
    pub font_size: u32,
    pub color: Color,
    /// Percent, 0 (invisible) to 100 (as drawn).
    pub opacity: u8,
    #[serde(default)]
    pub stroke: bool,
    #[serde(default)]
    pub shadow: bool,
    #[serde(default)]
    pub rotation_degrees: f64,
}

impl WatermarkSpec {
    /// A date watermark styled like the command-line default.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: WatermarkKind::Text { text: text.into() },
            font_size: 80,
            color: Color::rgb(255, 0, 0),
            opacity: 100,
            stroke: false,
            shadow: false,
            rotation_degrees: 0.0,
        }
    }

    pub fn image(source: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatermarkKind::Image {
                source: source.into(),
                scale_percent: default_scale_percent(),
            },
            ..Self::text(String::new())
        }
    }

    /// Set the rotation, normalized into `[0, 360)`.
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_degrees = normalize_degrees(degrees);
        self
    }

    /// Rotation in `[0, 360)`, whatever was stored.
    pub fn rotation(&self) -> f64 {
        normalize_degrees(self.rotation_degrees)
    }

    /// Opacity as a factor in `[0, 1]`.
    pub fn opacity_factor(&self) -> f32 {
        self.opacity.min(100) as f32 / 100.0
    }

    /// True when the text needs a resolved date.
    pub fn wants_date(&self) -> bool {
        matches!(&self.kind, WatermarkKind::Text { text } if text.contains(DATE_TOKEN))
    }

    pub fn validate(&self) -> Result<(), ValueError> {
        let fail = |msg: &str| Err(ValueError::Spec(msg.to_string()));
        match &self.kind {
            WatermarkKind::Text { text } if text.trim().is_empty() => {
                return fail("text must not be empty");
            }
            WatermarkKind::Image { scale_percent, .. }
                if *scale_percent == 0 || *scale_percent > MAX_SCALE_PERCENT =>
            {
                return Err(ValueError::Spec(format!(
                    "scale_percent must be 1-{MAX_SCALE_PERCENT}"
                )));
            }
            WatermarkKind::Image { source, .. } if source.as_os_str().is_empty() => {
                return fail("image source path must not be empty");
            }
            _ => {}
        }
        if self.font_size == 0 || self.font_size > MAX_FONT_SIZE {
            return Err(ValueError::Spec(format!("font_size must be 1-{MAX_FONT_SIZE}")));
        }
        if self.opacity > 100 {
            return fail("opacity must be 0-100");
        }
        if !self.rotation_degrees.is_finite() {
            return fail("rotation must be a finite number of degrees");
        }
        Ok(())
    }
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid of a tiny negative value can round up to exactly 360.0
    if normalized >= 360.0 { 0.0 } else { normalized }
}
