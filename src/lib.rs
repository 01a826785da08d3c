//! # photomark
//!
//! Batch watermarking for photo collections. Point it at a directory and
//! every photo gets a copy stamped with its capture date, a line of text, or
//! a logo. The originals are never touched.
//!
//! # Architecture: Per-Image Pipeline
//!
//! ```text
//! scan      directory  →  [SourceImage]            (sorted, hidden + output dir skipped)
//! decode    path       →  pixels + EXIF + mtime    (imaging backend)
//! date      metadata   →  "YYYY-MM-DD"             (exif → file date → default)
//! compose   spec       →  watermark layer          (text or logo, opacity baked in)
//! layout    placement  →  pixel geometry           (preset anchors or freeform, rotation)
//! render    layer      →  watermarked copy         (Porter-Duff over)
//! export    copy       →  output_dir/…             (resize, encode, temp file + rename)
//! ```
//!
//! Images run in parallel on rayon; a failure in one image never stops the
//! batch. The whole batch is refused up front if it would write into a
//! directory that holds source images.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Watermark value types: `WatermarkSpec`, `Placement`, `Color` |
//! | [`date`] | Capture-date resolution with file-date and default fallbacks |
//! | [`layout`] | Placement + rotation → pixel geometry |
//! | [`text`] | Glyph rasterization and font discovery |
//! | [`compose`] | Watermark layers and alpha compositing |
//! | [`imaging`] | Decode/encode backend, resize math, output parameters |
//! | [`naming`] | Output filename rules |
//! | [`scan`] | Source image discovery |
//! | [`export`] | Parallel batch export with progress events |
//! | [`templates`] | Named watermark templates in a JSON store |
//! | [`config`] | `photomark.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, EXIF, glyph rendering and encoding are all pure Rust (`image`,
//! `kamadak-exif`, `ab_glyph`, `imageproc`). No system libraries, so the
//! binary runs anywhere it is copied. Fonts are the only outside input.
//!
//! ## Relative Placement
//!
//! Freeform positions are fractions of the canvas, not pixels. A template
//! saved while looking at a 6000px photo puts the watermark in the same
//! place on a 1200px one.

pub mod compose;
pub mod config;
pub mod date;
pub mod export;
pub mod imaging;
pub mod layout;
pub mod naming;
pub mod output;
pub mod scan;
pub mod templates;
pub mod text;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
