//! Pure Rust image I/O backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP) | `image::ImageReader` with format sniffing |
//! | Capture timestamp | `kamadak-exif` container reader |
//! | Logo decode | `image::ImageReader` → RGBA8 |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (RGB8, quality 1–100) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (RGBA8) |

use super::backend::{BackendError, DecodedImage, ImageBackend, ImageMetadata};
use super::params::{OutputFormat, Quality};
use exif::{In, Tag};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("bmp", ImageFormat::Bmp),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Capture-time tags, most specific first.
const CAPTURE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk, trusting content over extension.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| BackendError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Read the raw capture timestamp from EXIF, if the file carries one.
///
/// Unreadable or missing EXIF is not an error: most PNGs have none.
fn read_capture_timestamp(path: &Path) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = std::io::BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    CAPTURE_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        match &field.value {
            exif::Value::Ascii(parts) => parts
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
                .filter(|s| !s.is_empty()),
            _ => None,
        }
    })
}

impl ImageBackend for RustBackend {
    fn decode(&self, path: &Path) -> Result<DecodedImage, BackendError> {
        let pixels = load_image(path)?;
        let modified_at = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        Ok(DecodedImage {
            pixels,
            metadata: ImageMetadata {
                captured_at: read_capture_timestamp(path),
            },
            modified_at,
        })
    }

    fn load_overlay(&self, path: &Path) -> Result<RgbaImage, BackendError> {
        Ok(load_image(path)?.to_rgba8())
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        let mut bytes = Vec::new();
        let (width, height) = (image.width(), image.height());
        let result = match format {
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = image.to_rgb8();
                JpegEncoder::new_with_quality(&mut bytes, quality.value() as u8).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )
            }
            OutputFormat::Png => {
                let rgba = image.to_rgba8();
                PngEncoder::new(&mut bytes).write_image(
                    rgba.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgba8,
                )
            }
        };
        result.map_err(|e| BackendError::Encode {
            format,
            reason: e.to_string(),
        })?;
        Ok(bytes)
    }
}
