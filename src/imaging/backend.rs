//! Image decode/encode backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between the exporter and pixel I/O:
//! decode a photo with its capture metadata, load a watermark logo, and
//! encode a finished buffer.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! and `kamadak-exif` crates. Tests use [`tests::MockBackend`], which
//! synthesizes pixels and records every call.

use super::params::{OutputFormat, Quality};
use image::{DynamicImage, RgbaImage};
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("cannot encode {format}: {reason}")]
    Encode { format: OutputFormat, reason: String },
}

/// Capture metadata read alongside the pixels.
///
/// `captured_at` is the raw EXIF timestamp string, unparsed; the date
/// resolver decides whether it is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub captured_at: Option<String>,
}

/// A decoded source photo.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: DynamicImage,
    pub metadata: ImageMetadata,
    /// Filesystem modification time, when the platform reports one.
    pub modified_at: Option<SystemTime>,
}

/// Trait for image I/O backends.
///
/// `Sync` so one backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// Decode a source photo and its capture metadata.
    fn decode(&self, path: &Path) -> Result<DecodedImage, BackendError>;

    /// Decode a watermark logo as RGBA.
    fn load_overlay(&self, path: &Path) -> Result<RgbaImage, BackendError>;

    /// Encode a finished image.
    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}
