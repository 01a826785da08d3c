//! Source image discovery.
//!
//! Walks an input directory and returns every decodable photo in a stable
//! order, each with its directory relative to the root so the exporter can
//! mirror the input tree:
//!
//! ```text
//! holiday/                    # root
//! ├── 001.jpg                 # relative_dir = ""
//! ├── beach/
//! │   └── 002.png             # relative_dir = "beach"
//! ├── .thumbnails/            # hidden: skipped
//! └── holiday_watermark/      # output directory: excluded
//! ```
//!
//! Hidden files and directories are skipped. Directories listed in
//! [`ScanOptions::exclude`] are never entered, which keeps a re-run from
//! watermarking its own output.

use crate::imaging::supported_input_extensions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("cannot read directory tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One photo to watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub path: PathBuf,
    /// Containing directory relative to the scan root; empty at top level.
    pub relative_dir: PathBuf,
}

impl SourceImage {
    /// A lone file with no tree to mirror.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            relative_dir: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    pub exclude: Vec<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            exclude: Vec::new(),
        }
    }
}

/// Find all supported images under `root`, sorted by path.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<Vec<SourceImage>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let excluded: Vec<PathBuf> = options
        .exclude
        .iter()
        .filter_map(|p| p.canonicalize().ok())
        .collect();
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    let mut images = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (!is_hidden(e) && !is_excluded(e, &excluded)));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let relative_dir = entry
            .path()
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        images.push(SourceImage {
            path: entry.into_path(),
            relative_dir,
        });
    }

    Ok(images)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_excluded(entry: &DirEntry, excluded: &[PathBuf]) -> bool {
    if excluded.is_empty() || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .path()
        .canonicalize()
        .is_ok_and(|canonical| excluded.contains(&canonical))
}

pub fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    supported_input_extensions().contains(&ext.as_str())
}
