//! Glyph rasterization for text watermarks.
//!
//! The compositor only needs two things from a font: how big a line of text
//! is, and an 8-bit coverage mask of it. [`GlyphRasterizer`] is that seam.
//! [`FontRasterizer`] implements it with `ab_glyph` outlines; tests swap in
//! a deterministic block-glyph rasterizer.
//!
//! Fonts come from an explicit path or, failing that, from the platform font
//! directories. Layout is a single line with kerning and no shaping.

use crate::compose::RenderError;
use ab_glyph::{Font, FontVec, GlyphId, PxScale, ScaleFont, point};
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Turns a line of text into a coverage mask.
pub trait GlyphRasterizer: Sync {
    /// Size in pixels of `text` laid out at `px` pixels per em.
    fn measure(&self, text: &str, px: f32) -> (u32, u32);

    /// Coverage mask of `text`, sized exactly as [`measure`](Self::measure).
    fn coverage(&self, text: &str, px: f32) -> GrayImage;
}

/// Files tried during discovery, in order of preference.
const PREFERRED_FONTS: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "Arial.ttf",
    "arial.ttf",
    "NotoSans-Regular.ttf",
    "Helvetica.ttc",
    "helvetica.ttf",
];

/// A TrueType/OpenType font loaded into memory.
pub struct FontRasterizer {
    font: FontVec,
    path: PathBuf,
}

impl std::fmt::Debug for FontRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontRasterizer")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FontRasterizer {
    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path).map_err(|e| RenderError::Font {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| RenderError::Font {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            font,
            path: path.to_path_buf(),
        })
    }

    /// Load `explicit` if given, otherwise the first discoverable system font.
    pub fn load(explicit: Option<&Path>) -> Result<Self, RenderError> {
        match explicit {
            Some(path) => Self::from_path(path),
            None => {
                let dirs = font_dirs();
                let Some(path) = discover_font(&dirs) else {
                    warn!(searched = dirs.len(), "no usable font in platform font directories");
                    return Err(RenderError::NoFont);
                };
                debug!(font = %path.display(), "using discovered font");
                Self::from_path(&path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Glyph ids with the pen position of each, plus the total advance.
    fn layout(&self, text: &str, px: f32) -> (Vec<(GlyphId, f32)>, f32) {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let mut cursor = 0.0f32;
        let mut prev: Option<GlyphId> = None;
        let mut glyphs = Vec::with_capacity(text.len());
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                cursor += scaled.kern(prev, id);
            }
            glyphs.push((id, cursor));
            cursor += scaled.h_advance(id);
            prev = Some(id);
        }
        (glyphs, cursor)
    }
}

impl GlyphRasterizer for FontRasterizer {
    fn measure(&self, text: &str, px: f32) -> (u32, u32) {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let (_, advance) = self.layout(text, px);
        let height = scaled.ascent() - scaled.descent();
        (advance.ceil().max(1.0) as u32, height.ceil().max(1.0) as u32)
    }

    fn coverage(&self, text: &str, px: f32) -> GrayImage {
        let (width, height) = self.measure(text, px);
        let mut mask = GrayImage::new(width, height);
        let scale = PxScale::from(px);
        let baseline = self.font.as_scaled(scale).ascent();

        for (id, x) in self.layout(text, px).0 {
            let glyph = id.with_scale_and_position(scale, point(x, baseline));
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, c| {
                let x = gx as i64 + bounds.min.x as i64;
                let y = gy as i64 + bounds.min.y as i64;
                if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                    return;
                }
                let value = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
                let pixel = mask.get_pixel_mut(x as u32, y as u32);
                // Overlapping glyphs keep the stronger coverage.
                if value > pixel[0] {
                    *pixel = Luma([value]);
                }
            });
        }
        mask
    }
}

/// Platform font directories, most specific first.
pub fn font_dirs() -> Vec<PathBuf> {
    let mut dirs_out: Vec<PathBuf> = Vec::new();
    if let Some(user) = dirs::font_dir() {
        dirs_out.push(user);
    }
    if let Some(home) = dirs::home_dir() {
        dirs_out.push(home.join(".fonts"));
    }
    for system in [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/Library/Fonts",
        "/System/Library/Fonts",
        "C:\\Windows\\Fonts",
    ] {
        dirs_out.push(PathBuf::from(system));
    }
    dirs_out
}

/// First preferred font found under any of `roots`.
///
/// Preference order wins over directory order: a DejaVu Sans anywhere beats
/// an Arial in the user's own font directory.
pub fn discover_font(roots: &[PathBuf]) -> Option<PathBuf> {
    let found: Vec<PathBuf> = roots
        .iter()
        .filter(|root| root.is_dir())
        .flat_map(|root| {
            WalkDir::new(root)
                .follow_links(true)
                .max_depth(4)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| PREFERRED_FONTS.contains(&n))
                })
        })
        .collect();

    PREFERRED_FONTS.iter().find_map(|wanted| {
        found
            .iter()
            .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(*wanted))
            .cloned()
    })
}
