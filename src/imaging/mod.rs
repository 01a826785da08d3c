//! Image I/O: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (JPEG, PNG, TIFF, WebP, BMP) |
//! | **Capture date** | `kamadak-exif` (`DateTimeOriginal` → `DateTimeDigitized` → `DateTime`) |
//! | **Resize** | Lanczos3 via `image::imageops` |
//! | **Encode** | JPEG with quality, or PNG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing encode/resize settings
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, DecodedImage, ImageBackend, ImageMetadata};
pub use calculations::{calculate_resize_dimensions, within_max_dimension};
pub use params::{MAX_DIMENSION, MAX_RESIZE_PERCENT, OutputFormat, Quality, ResizeSpec};
pub use rust_backend::{RustBackend, supported_input_extensions};
