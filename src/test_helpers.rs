//! Shared test utilities.
//!
//! [`BlockRasterizer`] stands in for a real font so text layers have exact,
//! predictable sizes. The fixture writers put small real images on disk for
//! tests that go through [`RustBackend`](crate::imaging::RustBackend).

use crate::text::GlyphRasterizer;
use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use std::path::Path;

// =========================================================================
// Glyphs
// =========================================================================

/// Draws every character as a solid block.
///
/// A glyph cell is `ceil(px / 2)` wide and `ceil(px)` tall. Each cell is
/// fully covered except its last column, which stays empty as a gap.
pub struct BlockRasterizer;

impl BlockRasterizer {
    fn cell(px: f32) -> (u32, u32) {
        ((px / 2.0).ceil().max(1.0) as u32, px.ceil().max(1.0) as u32)
    }
}

impl GlyphRasterizer for BlockRasterizer {
    fn measure(&self, text: &str, px: f32) -> (u32, u32) {
        let (cell_w, cell_h) = Self::cell(px);
        let chars = text.chars().count().max(1) as u32;
        (chars * cell_w, cell_h)
    }

    fn coverage(&self, text: &str, px: f32) -> GrayImage {
        let (width, height) = self.measure(text, px);
        let (cell_w, _) = Self::cell(px);
        GrayImage::from_fn(width, height, |x, _| {
            if x % cell_w == cell_w - 1 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }
}

// =========================================================================
// Fixture files
// =========================================================================

/// Write a solid-color image; the format follows the extension.
pub fn write_solid_image(path: &Path, size: (u32, u32), color: Rgba<u8>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let image = RgbaImage::from_pixel(size.0, size.1, color);
    let format = ImageFormat::from_path(path).unwrap();
    if format == ImageFormat::Jpeg {
        image::DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .save_with_format(path, format)
            .unwrap();
    } else {
        image.save_with_format(path, format).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_glyphs_have_fixed_cells() {
        let raster = BlockRasterizer;
        assert_eq!(raster.measure("abc", 20.0), (30, 20));
        assert_eq!(raster.measure("", 20.0), (10, 20));
        let mask = raster.coverage("ab", 20.0);
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(9, 0)[0], 0);
        assert_eq!(mask.get_pixel(10, 19)[0], 255);
    }
}
