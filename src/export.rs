//! Batch watermark export.
//!
//! Takes the scanned source images and one watermark job, and writes a
//! watermarked copy of every image into the output directory.
//!
//! ## Per-image pipeline
//!
//! ```text
//! decode → resolve date (text with {{date}} only) → prepare layer
//!        → layout → composite → resize → encode → write (temp + rename)
//! ```
//!
//! ## Guarantees
//!
//! - **No overwrite.** If the output directory is the parent directory of any
//!   source image the whole batch is refused with [`ExportError::Config`]
//!   before a single file is touched. A computed output path that equals its
//!   own source, or one already claimed by an earlier image, fails only that
//!   image.
//! - **Isolation.** Decode, render, encode and write failures are captured in
//!   that image's [`ImageOutcome`]; the batch carries on.
//! - **Order.** Outcomes come back in input order, each carrying its source
//!   path. Cancelled images are left out.
//! - **Complete files.** Output is written to a hidden sibling and renamed
//!   into place, so a finished name never holds a half-written image.
//!
//! ## Parallel Processing
//!
//! Images are processed in parallel using [rayon](https://docs.rs/rayon).
//! Progress is reported through an optional [`ExportEvent`] channel so the
//! CLI can print from a single thread.

use crate::compose::{self, RenderError};
use crate::date::{self, DateInfo, DateOptions, MissingDatePolicy};
use crate::imaging::{
    BackendError, ImageBackend, OutputFormat, Quality, ResizeSpec, RustBackend,
    calculate_resize_dimensions,
};
use crate::naming::NamingRule;
use crate::scan::SourceImage;
use crate::text::GlyphRasterizer;
use crate::types::{DATE_TOKEN, Placement, WatermarkKind, WatermarkSpec};
use image::{DynamicImage, RgbaImage, imageops};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Batch-level failures. Nothing has been written when one of these is returned.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a per-image failure, for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Decode,
    Render,
    Encode,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Render => "render",
            ErrorKind::Encode => "encode",
            ErrorKind::Io => "io",
        })
    }
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("decode failed: {0}")]
    Decode(BackendError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("encode failed: {0}")]
    Encode(BackendError),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("refusing to write {0}: it is a source image or another image's output")]
    Overwrite(PathBuf),
}

impl ImageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageError::Decode(_) => ErrorKind::Decode,
            ImageError::Render(_) => ErrorKind::Render,
            ImageError::Encode(_) => ErrorKind::Encode,
            ImageError::Io(_) | ImageError::Overwrite(_) => ErrorKind::Io,
        }
    }
}

/// Naming, format, quality, resize and destination of exported files.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRule {
    pub naming: NamingRule,
    pub format: OutputFormat,
    /// JPEG only; PNG is lossless.
    pub quality: Quality,
    pub resize: ResizeSpec,
    pub output_dir: PathBuf,
}

impl ExportRule {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            naming: NamingRule::default(),
            format: OutputFormat::default(),
            quality: Quality::default(),
            resize: ResizeSpec::default(),
            output_dir: output_dir.into(),
        }
    }

    /// Where `image` will be written.
    pub fn output_path(&self, image: &SourceImage) -> PathBuf {
        self.output_dir
            .join(&image.relative_dir)
            .join(self.naming.file_name(&image.path, self.format))
    }
}

/// Everything that is the same for every image in a batch.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub spec: WatermarkSpec,
    pub placement: Placement,
    pub rule: ExportRule,
    pub dates: DateOptions,
    pub missing_date: MissingDatePolicy,
}

impl ExportJob {
    pub fn new(spec: WatermarkSpec, placement: Placement, rule: ExportRule) -> Self {
        Self {
            spec,
            placement,
            rule,
            dates: DateOptions::default(),
            missing_date: MissingDatePolicy::default(),
        }
    }

    fn validate(&self) -> Result<(), ExportError> {
        self.spec
            .validate()
            .and_then(|_| self.placement.validate())
            .map_err(|e| ExportError::Config(e.to_string()))?;
        self.rule.resize.validate().map_err(ExportError::Config)?;
        Ok(())
    }
}

/// A successfully written image.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedImage {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Present when the watermark text asked for a date.
    pub date: Option<DateInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageStatus {
    Written(ExportedImage),
    /// No date could be resolved and the policy is [`MissingDatePolicy::Skip`].
    SkippedNoDate,
}

/// Result for one source image.
#[derive(Debug)]
pub struct ImageOutcome {
    pub source: PathBuf,
    pub result: Result<ImageStatus, ImageError>,
}

impl ImageOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self.result, Ok(ImageStatus::Written(_)))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.result, Ok(ImageStatus::SkippedNoDate))
    }

    pub fn error(&self) -> Option<&ImageError> {
        self.result.as_ref().err()
    }
}

/// Progress events sent while a batch runs.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    Started {
        total: usize,
        output_dir: PathBuf,
    },
    Written {
        /// 1-based position in the input.
        index: usize,
        total: usize,
        source: PathBuf,
        output: PathBuf,
        date: Option<DateInfo>,
    },
    Skipped {
        index: usize,
        total: usize,
        source: PathBuf,
    },
    Failed {
        index: usize,
        total: usize,
        source: PathBuf,
        kind: ErrorKind,
        message: String,
    },
}

/// Aggregated counts for the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub skipped: usize,
    pub failures: Vec<(PathBuf, ErrorKind, String)>,
}

impl ExportSummary {
    pub fn from_outcomes(outcomes: &[ImageOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match &outcome.result {
                Ok(ImageStatus::Written(_)) => summary.written += 1,
                Ok(ImageStatus::SkippedNoDate) => summary.skipped += 1,
                Err(e) => summary
                    .failures
                    .push((outcome.source.clone(), e.kind(), e.to_string())),
            }
        }
        summary
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Cooperative stop signal shared between a batch and its controller.
///
/// Checked before each image and between pipeline stages; work already past
/// the last check finishes normally.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Refuse an output directory that is the parent of any source image.
///
/// Compares canonical paths, so `./photos/.` and `photos` are the same
/// directory. An output directory that does not exist yet cannot clash.
pub fn check_output_dir(images: &[SourceImage], output_dir: &Path) -> Result<(), ExportError> {
    let Ok(output) = output_dir.canonicalize() else {
        return Ok(());
    };
    for image in images {
        let parent = image.path.parent().unwrap_or(Path::new("."));
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if parent.canonicalize().is_ok_and(|p| p == output) {
            return Err(ExportError::Config(format!(
                "output directory {} contains source image {}; choose a different output directory",
                output_dir.display(),
                image.path.display()
            )));
        }
    }
    Ok(())
}

/// Run a batch with the production backend.
pub fn run(
    images: &[SourceImage],
    job: &ExportJob,
    rasterizer: Option<&dyn GlyphRasterizer>,
) -> Result<Vec<ImageOutcome>, ExportError> {
    let backend = RustBackend::new();
    let mut exporter = Exporter::new(&backend);
    if let Some(rasterizer) = rasterizer {
        exporter = exporter.with_rasterizer(rasterizer);
    }
    exporter.run(images, job)
}

/// Batch runner over any [`ImageBackend`] (allows testing with a mock).
pub struct Exporter<'a, B: ImageBackend> {
    backend: &'a B,
    rasterizer: Option<&'a dyn GlyphRasterizer>,
    events: Option<Sender<ExportEvent>>,
    cancel: CancelFlag,
}

impl<'a, B: ImageBackend> Exporter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            rasterizer: None,
            events: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Glyph source for text watermarks. Without one, text images fail with
    /// [`RenderError::NoFont`].
    pub fn with_rasterizer(mut self, rasterizer: &'a dyn GlyphRasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn with_events(mut self, events: Sender<ExportEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn emit(&self, event: ExportEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    pub fn run(&self, images: &[SourceImage], job: &ExportJob) -> Result<Vec<ImageOutcome>, ExportError> {
        job.validate()?;
        check_output_dir(images, &job.rule.output_dir)?;
        std::fs::create_dir_all(&job.rule.output_dir)?;

        let total = images.len();
        info!(total, output_dir = %job.rule.output_dir.display(), "export started");
        self.emit(ExportEvent::Started {
            total,
            output_dir: job.rule.output_dir.clone(),
        });

        let targets = claim_targets(images, &job.rule);
        let logos = LogoCache::default();

        let outcomes: Vec<ImageOutcome> = images
            .par_iter()
            .zip(targets.par_iter())
            .enumerate()
            .filter_map(|(i, (image, target))| {
                let result = self.process_one(image, target, job, &logos)?;
                self.report(i + 1, total, &image.path, &result);
                Some(ImageOutcome {
                    source: image.path.clone(),
                    result,
                })
            })
            .collect();

        let summary = ExportSummary::from_outcomes(&outcomes);
        info!(
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed(),
            cancelled = total - outcomes.len(),
            "export finished"
        );
        Ok(outcomes)
    }

    fn report(&self, index: usize, total: usize, source: &Path, result: &Result<ImageStatus, ImageError>) {
        let source = source.to_path_buf();
        let event = match result {
            Ok(ImageStatus::Written(done)) => ExportEvent::Written {
                index,
                total,
                source,
                output: done.output.clone(),
                date: done.date.clone(),
            },
            Ok(ImageStatus::SkippedNoDate) => {
                warn!(source = %source.display(), "no date available, image skipped");
                ExportEvent::Skipped {
                    index,
                    total,
                    source,
                }
            }
            Err(e) => {
                warn!(source = %source.display(), kind = %e.kind(), error = %e, "image failed");
                ExportEvent::Failed {
                    index,
                    total,
                    source,
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        self.emit(event);
    }

    /// `None` means cancelled before anything was written.
    fn process_one(
        &self,
        image: &SourceImage,
        target: &Result<PathBuf, PathBuf>,
        job: &ExportJob,
        logos: &LogoCache,
    ) -> Option<Result<ImageStatus, ImageError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let target = match target {
            Ok(path) => path,
            Err(path) => return Some(Err(ImageError::Overwrite(path.clone()))),
        };

        debug!(source = %image.path.display(), "decoding");
        let decoded = match self.backend.decode(&image.path) {
            Ok(decoded) => decoded,
            Err(e) => return Some(Err(ImageError::Decode(e))),
        };

        let date = job.spec.wants_date().then(|| {
            date::resolve(&decoded.metadata, decoded.modified_at, &job.dates)
        });
        if let Some(info) = &date {
            debug!(source = %image.path.display(), date = %info.text, from = %info.source, "resolved date");
            if !info.is_resolved() && job.missing_date == MissingDatePolicy::Skip {
                return Some(Ok(ImageStatus::SkippedNoDate));
            }
        }

        if self.cancel.is_cancelled() {
            return None;
        }
        let composed = match self.compose(decoded.pixels.to_rgba8(), job, date.as_ref(), logos) {
            Ok(composed) => composed,
            Err(e) => return Some(Err(e.into())),
        };

        let finished = match calculate_resize_dimensions(composed.dimensions(), job.rule.resize) {
            Some(size) => {
                if let Err(e) = compose::ensure_within_limit("resized image", size) {
                    return Some(Err(e.into()));
                }
                imageops::resize(&composed, size.0, size.1, imageops::FilterType::Lanczos3)
            }
            None => composed,
        };
        let (width, height) = finished.dimensions();

        if self.cancel.is_cancelled() {
            return None;
        }
        let bytes = match self.backend.encode(
            &DynamicImage::ImageRgba8(finished),
            job.rule.format,
            job.rule.quality,
        ) {
            Ok(bytes) => bytes,
            Err(e) => return Some(Err(ImageError::Encode(e))),
        };

        Some(
            write_output(target, &image.path, &bytes)
                .map(|_| {
                    ImageStatus::Written(ExportedImage {
                        output: target.clone(),
                        width,
                        height,
                        date,
                    })
                }),
        )
    }

    /// Build the watermark layer and composite it onto `source`.
    fn compose(
        &self,
        source: RgbaImage,
        job: &ExportJob,
        date: Option<&DateInfo>,
        logos: &LogoCache,
    ) -> Result<RgbaImage, RenderError> {
        let spec = &job.spec;
        let layer = match &spec.kind {
            WatermarkKind::Text { text } => {
                let text = match date {
                    Some(info) => text.replace(DATE_TOKEN, &info.text),
                    None => text.clone(),
                };
                if text.trim().is_empty() {
                    // Empty-date policy with a date-only text: nothing to draw.
                    return Ok(source);
                }
                let rasterizer = self.rasterizer.ok_or(RenderError::NoFont)?;
                Arc::new(compose::prepare_text(spec, &text, rasterizer)?)
            }
            WatermarkKind::Image { source: logo, .. } => logos.layer(self.backend, logo, spec)?,
        };
        Ok(compose::apply(&source, &layer, &job.placement, spec.rotation()))
    }
}

/// Prepared logo layers for one batch, keyed by logo path.
///
/// Only successes are kept: a logo that fails to load is retried by the next
/// image and every affected image reports its own [`RenderError::Logo`].
#[derive(Default)]
struct LogoCache {
    layers: Mutex<HashMap<PathBuf, Arc<RgbaImage>>>,
}

impl LogoCache {
    fn layer<B: ImageBackend>(
        &self,
        backend: &B,
        path: &Path,
        spec: &WatermarkSpec,
    ) -> Result<Arc<RgbaImage>, RenderError> {
        // Held across the load so concurrent images wait for one decode.
        let mut layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(layer) = layers.get(path) {
            return Ok(Arc::clone(layer));
        }
        let decoded = backend.load_overlay(path).map_err(|e| RenderError::Logo {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let layer = Arc::new(compose::prepare_image(spec, &decoded)?);
        debug!(logo = %path.display(), width = layer.width(), height = layer.height(), "prepared logo");
        layers.insert(path.to_path_buf(), Arc::clone(&layer));
        Ok(layer)
    }
}

/// Output path per image, in input order. `Err` holds a path that is the
/// image's own source or was already claimed by an earlier image.
fn claim_targets(images: &[SourceImage], rule: &ExportRule) -> Vec<Result<PathBuf, PathBuf>> {
    let sources: HashSet<PathBuf> = images.iter().map(|i| normalized(&i.path)).collect();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    images
        .iter()
        .map(|image| {
            let target = rule.output_path(image);
            let key = normalized(&target);
            if sources.contains(&key) || !claimed.insert(key) {
                Err(target)
            } else {
                Ok(target)
            }
        })
        .collect()
}

/// Canonical form of a possibly not-yet-existing file path.
fn normalized(path: &Path) -> PathBuf {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Write `bytes` to `target` through a hidden sibling and a rename.
fn write_output(target: &Path, source: &Path, bytes: &[u8]) -> Result<(), ImageError> {
    let dir = target.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    if normalized(target) == normalized(source) {
        return Err(ImageError::Overwrite(target.to_path_buf()));
    }
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = dir.join(format!(".{name}.partial"));
    std::fs::write(&partial, bytes)?;
    std::fs::rename(&partial, target).inspect_err(|_| {
        let _ = std::fs::remove_file(&partial);
    })?;
    Ok(())
}
