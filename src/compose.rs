//! Watermark compositing.
//!
//! Two steps, split so the layout engine can sit between them:
//!
//! 1. **Prepare** the unrotated watermark layer: [`prepare_text`] rasterizes
//!    text with optional shadow and stroke; [`prepare_image`] scales a logo.
//!    Opacity is baked into the layer's alpha here. The layer's size is the
//!    box handed to [`layout::compute_geometry`](crate::layout::compute_geometry).
//! 2. **Render** the layer onto a copy of the source with [`render`]: rotate
//!    about the layer's center, then Porter-Duff "over" at the computed
//!    offset, clipped to the canvas.
//!
//! The source image is never modified.

use crate::imaging::{MAX_DIMENSION, within_max_dimension};
use crate::layout::{self, Geometry};
use crate::text::GlyphRasterizer;
use crate::types::{Color, Placement, WatermarkKind, WatermarkSpec};
use image::{GrayImage, Rgba, RgbaImage, imageops};
use imageproc::distance_transform::Norm;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot load logo {path}: {reason}")]
    Logo { path: PathBuf, reason: String },
    #[error("no usable font found: set [fonts] path or pass --font")]
    NoFont,
    #[error("cannot load font {path}: {reason}")]
    Font { path: PathBuf, reason: String },
    #[error("{what} would be {width}x{height}, over the {} px limit", MAX_DIMENSION)]
    TooLarge {
        what: &'static str,
        width: u32,
        height: u32,
    },
}

/// Fail with [`RenderError::TooLarge`] when `size` is over the limit.
pub fn ensure_within_limit(what: &'static str, size: (u32, u32)) -> Result<(), RenderError> {
    if within_max_dimension(size) {
        Ok(())
    } else {
        Err(RenderError::TooLarge {
            what,
            width: size.0,
            height: size.1,
        })
    }
}

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Stroke width for a font size: a tenth of it, rounded up.
pub fn stroke_width(font_size: u32) -> u32 {
    font_size.div_ceil(10)
}

/// Shadow offset (right and down) for a font size.
pub fn shadow_offset(font_size: u32) -> u32 {
    (font_size / 12).max(2)
}

fn shadow_sigma(font_size: u32) -> f32 {
    (shadow_offset(font_size) as f32 / 2.0).max(1.0)
}

/// Rasterize `text` into an unrotated RGBA layer styled by `spec`.
///
/// Layers are stacked shadow, stroke, fill (bottom to top) and padded so
/// none of them is clipped. `text` is the final string with any date token
/// already substituted. The text is measured before anything is drawn, so
/// an oversized layer fails without allocating it.
pub fn prepare_text(
    spec: &WatermarkSpec,
    text: &str,
    rasterizer: &dyn GlyphRasterizer,
) -> Result<RgbaImage, RenderError> {
    let px = spec.font_size as f32;
    ensure_within_limit("text layer", rasterizer.measure(text, px))?;
    let glyphs = rasterizer.coverage(text, px);

    let stroke = if spec.stroke { stroke_width(spec.font_size) } else { 0 };
    let (offset, blur_pad) = if spec.shadow {
        let sigma = shadow_sigma(spec.font_size);
        (shadow_offset(spec.font_size), (2.0 * sigma).ceil() as u32)
    } else {
        (0, 0)
    };
    let lead = stroke + blur_pad;
    let trail = lead + offset;
    let padded = (
        glyphs.width().saturating_add(lead + trail),
        glyphs.height().saturating_add(lead + trail),
    );
    ensure_within_limit("text layer", padded)?;

    let mut fill = GrayImage::new(padded.0, padded.1);
    imageops::replace(&mut fill, &glyphs, lead as i64, lead as i64);

    let outline = (stroke > 0).then(|| {
        imageproc::morphology::dilate(&fill, Norm::LInf, stroke.min(u8::MAX as u32) as u8)
    });

    let shadow = spec.shadow.then(|| {
        let base = outline.as_ref().unwrap_or(&fill);
        let mut shifted = GrayImage::new(base.width(), base.height());
        imageops::replace(&mut shifted, base, offset as i64, offset as i64);
        imageops::blur(&shifted, shadow_sigma(spec.font_size))
    });

    let alpha = spec.color.a as f32 / 255.0 * spec.opacity_factor();
    let stroke_color = spec.color.contrasting();

    Ok(RgbaImage::from_fn(fill.width(), fill.height(), |x, y| {
        let mut pixel = TRANSPARENT;
        if let Some(shadow) = &shadow {
            let cover = shadow.get_pixel(x, y)[0];
            pixel = blend_over(pixel, tinted(Color::black(), cover, alpha * 0.5));
        }
        if let Some(outline) = &outline {
            let cover = outline.get_pixel(x, y)[0];
            pixel = blend_over(pixel, tinted(stroke_color, cover, alpha));
        }
        let cover = fill.get_pixel(x, y)[0];
        blend_over(pixel, tinted(spec.color, cover, alpha))
    }))
}

/// Scale a decoded logo by `scale_percent` and bake in opacity.
///
/// Non-image specs pass the logo through at its own size.
pub fn prepare_image(spec: &WatermarkSpec, logo: &RgbaImage) -> Result<RgbaImage, RenderError> {
    let percent = match spec.kind {
        WatermarkKind::Image { scale_percent, .. } => scale_percent,
        WatermarkKind::Text { .. } => 100,
    };
    let mut layer = if percent == 100 {
        logo.clone()
    } else {
        let (width, height) = scaled_size(logo.dimensions(), percent);
        ensure_within_limit("scaled logo", (width, height))?;
        imageops::resize(logo, width, height, imageops::FilterType::Lanczos3)
    };

    let factor = spec.opacity_factor();
    if factor < 1.0 {
        for pixel in layer.pixels_mut() {
            pixel[3] = (pixel[3] as f32 * factor).round() as u8;
        }
    }
    Ok(layer)
}

/// `size` scaled by `percent`, never below one pixel per axis.
pub fn scaled_size(size: (u32, u32), percent: u32) -> (u32, u32) {
    let scale = |v: u32| ((v as f64 * percent as f64 / 100.0).round() as u32).max(1);
    (scale(size.0), scale(size.1))
}

/// Composite `layer` onto a copy of `source` at `geometry`.
pub fn render(source: &RgbaImage, layer: &RgbaImage, geometry: &Geometry) -> RgbaImage {
    let rotated = rotate_layer(layer, geometry);
    let mut output = source.clone();
    blend_at(&mut output, &rotated, geometry.x, geometry.y);
    output
}

/// Layout and render in one call.
pub fn apply(source: &RgbaImage, layer: &RgbaImage, placement: &Placement, rotation_degrees: f64) -> RgbaImage {
    let geometry = layout::compute_geometry(
        source.dimensions(),
        layer.dimensions(),
        placement,
        rotation_degrees,
    );
    render(source, layer, &geometry)
}

/// Rotate counter-clockwise about the center into a `geometry`-sized box.
fn rotate_layer(layer: &RgbaImage, geometry: &Geometry) -> RgbaImage {
    if geometry.rotation == 0.0 {
        return layer.clone();
    }

    // Square-ish canvas large enough for both the layer and its rotated box,
    // so nothing is cut before the final crop.
    let side_w = layer.width().max(geometry.width);
    let side_h = layer.height().max(geometry.height);
    let mut padded = RgbaImage::from_pixel(side_w, side_h, TRANSPARENT);
    imageops::replace(
        &mut padded,
        layer,
        ((side_w - layer.width()) / 2) as i64,
        ((side_h - layer.height()) / 2) as i64,
    );

    // imageproc turns clockwise for positive angles.
    let theta = -(geometry.rotation.to_radians() as f32);
    let rotated = rotate_about_center(&padded, theta, Interpolation::Bilinear, TRANSPARENT);

    imageops::crop_imm(
        &rotated,
        (side_w - geometry.width) / 2,
        (side_h - geometry.height) / 2,
        geometry.width,
        geometry.height,
    )
    .to_image()
}

fn blend_at(target: &mut RgbaImage, layer: &RgbaImage, x: i64, y: i64) {
    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + layer.width() as i64).min(target.width() as i64);
    let y_end = (y + layer.height() as i64).min(target.height() as i64);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let src = *layer.get_pixel((tx - x) as u32, (ty - y) as u32);
            let dst = target.get_pixel_mut(tx as u32, ty as u32);
            *dst = blend_over(*dst, src);
        }
    }
}

fn tinted(color: Color, coverage: u8, alpha: f32) -> Rgba<u8> {
    let a = (coverage as f32 * alpha).round().clamp(0.0, 255.0) as u8;
    Rgba([color.r, color.g, color.b, a])
}

/// Porter-Duff "over" on straight-alpha pixels.
///
/// A fully transparent foreground leaves the background untouched.
pub fn blend_over(background: Rgba<u8>, foreground: Rgba<u8>) -> Rgba<u8> {
    if foreground[3] == 0 {
        return background;
    }
    let fg_alpha = foreground[3] as f32 / 255.0;
    let bg_alpha = background[3] as f32 / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    let channel = |fg: u8, bg: u8| -> u8 {
        let value = (fg as f32 * fg_alpha + bg as f32 * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(foreground[0], background[0]),
        channel(foreground[1], background[1]),
        channel(foreground[2], background[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::BlockRasterizer;
    use crate::types::Preset;

    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn canvas(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, BLUE)
    }

    fn text_spec(font_size: u32) -> WatermarkSpec {
        WatermarkSpec {
            font_size,
            ..WatermarkSpec::text("x")
        }
    }

    fn opaque_count(layer: &RgbaImage) -> usize {
        layer.pixels().filter(|p| p[3] > 0).count()
    }

    // =========================================================================
    // Blending
    // =========================================================================

    #[test]
    fn transparent_foreground_leaves_background() {
        let bg = Rgba([10, 20, 30, 40]);
        assert_eq!(blend_over(bg, Rgba([255, 255, 255, 0])), bg);
    }

    #[test]
    fn opaque_foreground_replaces_background() {
        assert_eq!(blend_over(BLUE, Rgba([255, 0, 0, 255])), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn half_alpha_mixes_evenly() {
        let out = blend_over(BLUE, Rgba([255, 0, 0, 128]));
        assert_eq!(out[3], 255);
        assert!((out[0] as i32 - 128).abs() <= 1, "{out:?}");
        assert!((out[2] as i32 - 127).abs() <= 1, "{out:?}");
    }

    // =========================================================================
    // Text layers
    // =========================================================================

    #[test]
    fn plain_text_layer_matches_measured_size() {
        let raster = BlockRasterizer;
        let layer = prepare_text(&text_spec(20), "ab", &raster).unwrap();
        assert_eq!(layer.dimensions(), raster.measure("ab", 20.0));
        assert_eq!(*layer.get_pixel(1, 1), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn opacity_scales_layer_alpha() {
        let spec = WatermarkSpec {
            opacity: 50,
            ..text_spec(20)
        };
        let layer = prepare_text(&spec, "a", &BlockRasterizer).unwrap();
        assert_eq!(layer.get_pixel(1, 1)[3], 128);

        let spec = WatermarkSpec {
            opacity: 0,
            ..text_spec(20)
        };
        let layer = prepare_text(&spec, "a", &BlockRasterizer).unwrap();
        assert_eq!(opaque_count(&layer), 0);
    }

    #[test]
    fn stroke_pads_layer_and_uses_contrast_color() {
        let plain = prepare_text(&text_spec(20), "a", &BlockRasterizer).unwrap();
        let spec = WatermarkSpec {
            stroke: true,
            ..text_spec(20)
        };
        let stroked = prepare_text(&spec, "a", &BlockRasterizer).unwrap();
        let pad = stroke_width(20);
        assert_eq!(pad, 2);
        assert_eq!(stroked.width(), plain.width() + 2 * pad);
        assert_eq!(stroked.height(), plain.height() + 2 * pad);

        // Red fill is dark, so its stroke is white.
        assert_eq!(*stroked.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*stroked.get_pixel(pad + 1, pad + 1), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn light_fill_gets_black_stroke() {
        let spec = WatermarkSpec {
            stroke: true,
            color: Color::white(),
            ..text_spec(20)
        };
        let stroked = prepare_text(&spec, "a", &BlockRasterizer).unwrap();
        assert_eq!(*stroked.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn shadow_extends_down_and_right_and_is_softer() {
        let plain = prepare_text(&text_spec(24), "a", &BlockRasterizer).unwrap();
        let spec = WatermarkSpec {
            shadow: true,
            ..text_spec(24)
        };
        let shadowed = prepare_text(&spec, "a", &BlockRasterizer).unwrap();
        assert!(shadowed.width() > plain.width());
        assert!(shadowed.height() > plain.height());

        // Last column and row hold only shadow: dark and at most half opaque.
        let (w, h) = shadowed.dimensions();
        let corner_region: Vec<Rgba<u8>> = (0..h)
            .map(|y| *shadowed.get_pixel(w - 1 - shadow_sigma(24).ceil() as u32 * 2, y))
            .filter(|p| p[3] > 0)
            .collect();
        assert!(!corner_region.is_empty());
        for p in corner_region {
            assert_eq!((p[0], p[1], p[2]), (0, 0, 0));
            assert!(p[3] <= 128);
        }
    }

    #[test]
    fn stroke_and_shadow_offsets_follow_font_size() {
        assert_eq!(stroke_width(80), 8);
        assert_eq!(stroke_width(81), 9);
        assert_eq!(shadow_offset(12), 2);
        assert_eq!(shadow_offset(80), 6);
    }

    // =========================================================================
    // Image layers
    // =========================================================================

    #[test]
    fn logo_scales_by_percent() {
        let logo = RgbaImage::from_pixel(100, 50, Rgba([0, 255, 0, 255]));
        let spec = WatermarkSpec {
            kind: WatermarkKind::Image {
                source: "logo.png".into(),
                scale_percent: 50,
            },
            ..WatermarkSpec::image("logo.png")
        };
        assert_eq!(prepare_image(&spec, &logo).unwrap().dimensions(), (50, 25));
    }

    #[test]
    fn tiny_scale_keeps_one_pixel() {
        assert_eq!(scaled_size((100, 50), 1), (1, 1));
        assert_eq!(scaled_size((3, 3), 10), (1, 1));
    }

    #[test]
    fn oversized_layers_are_render_errors() {
        struct WideGlyphs;
        impl GlyphRasterizer for WideGlyphs {
            fn measure(&self, _text: &str, _px: f32) -> (u32, u32) {
                (u32::MAX, 10)
            }
            fn coverage(&self, _text: &str, _px: f32) -> GrayImage {
                unreachable!("oversized text must not be rasterized")
            }
        }
        assert!(matches!(
            prepare_text(&text_spec(20), "x", &WideGlyphs),
            Err(RenderError::TooLarge { width: u32::MAX, .. })
        ));

        let logo = RgbaImage::from_pixel(1_000, 10, Rgba([0, 255, 0, 255]));
        let spec = WatermarkSpec {
            kind: WatermarkKind::Image {
                source: "logo.png".into(),
                scale_percent: 10_000,
            },
            ..WatermarkSpec::image("logo.png")
        };
        assert!(matches!(
            prepare_image(&spec, &logo),
            Err(RenderError::TooLarge { width: 100_000, height: 1_000, .. })
        ));
    }

    #[test]
    fn logo_opacity_multiplies_alpha() {
        let mut logo = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 200]));
        logo.put_pixel(0, 0, TRANSPARENT);
        let spec = WatermarkSpec {
            opacity: 50,
            ..WatermarkSpec::image("logo.png")
        };
        let layer = prepare_image(&spec, &logo).unwrap();
        assert_eq!(layer.get_pixel(1, 1)[3], 100);
        assert_eq!(layer.get_pixel(0, 0)[3], 0);
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    #[test]
    fn render_keeps_source_untouched_and_size() {
        let source = canvas(200, 100);
        let before = source.clone();
        let layer = prepare_text(&text_spec(20), "ab", &BlockRasterizer).unwrap();
        let out = apply(&source, &layer, &Preset::Center.into(), 0.0);
        assert_eq!(source, before);
        assert_eq!(out.dimensions(), (200, 100));
        assert!(out.pixels().any(|p| *p == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn zero_opacity_renders_identical_pixels() {
        let source = canvas(200, 100);
        let spec = WatermarkSpec {
            opacity: 0,
            shadow: true,
            stroke: true,
            ..text_spec(20)
        };
        let layer = prepare_text(&spec, "abc", &BlockRasterizer).unwrap();
        for rotation in [0.0, 33.0] {
            let out = apply(&source, &layer, &Preset::Center.into(), rotation);
            assert_eq!(out, source);
        }
    }

    #[test]
    fn quarter_turn_swaps_layer_extent() {
        let layer = RgbaImage::from_pixel(40, 10, Rgba([255, 0, 0, 255]));
        let source = canvas(100, 100);
        let geometry = layout::compute_geometry((100, 100), (40, 10), &Preset::Center.into(), 90.0);
        assert_eq!((geometry.width, geometry.height), (10, 40));

        let out = render(&source, &layer, &geometry);
        // Inside the rotated bar: red. Beside it, where the unrotated bar would reach: blue.
        assert_eq!(*out.get_pixel(50, 35), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(35, 50), BLUE);
    }

    #[test]
    fn offcanvas_geometry_is_clipped() {
        let source = canvas(50, 50);
        let layer = RgbaImage::from_pixel(80, 20, Rgba([255, 0, 0, 255]));
        let out = apply(&source, &layer, &Preset::TopLeft.into(), 0.0);
        assert_eq!(out.dimensions(), (50, 50));
        assert_eq!(*out.get_pixel(0, 5), Rgba([255, 0, 0, 255]));
    }
}
