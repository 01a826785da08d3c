//! Named watermark templates.
//!
//! A template is a saved [`WatermarkSpec`] + [`Placement`] pair under a
//! unique, case-sensitive name. The store also remembers which template was
//! used last, so `--last-used` can repeat the previous run.
//!
//! ## Storage
//!
//! One JSON file per installation, by default
//! `<config dir>/photomark/templates.json`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "last_used": "signature",
//!   "templates": [
//!     { "name": "signature", "spec": { "kind": "text", ... },
//!       "placement": { "mode": "preset", "anchor": "bottom-right" },
//!       "created_at": "...", "updated_at": "..." }
//!   ]
//! }
//! ```
//!
//! Reads are served from the state loaded at [`TemplateStore::open`] or
//! after the last change. Every change is a read-modify-write of the file
//! itself: under the store's mutex and an exclusive advisory lock on
//! `<file>.lock`, the file is re-read, changed, written to a sibling temp
//! file and renamed into place. Other stores on the same file, in this
//! process or another, never lose each other's updates, and readers never
//! see a torn file. In-memory state only changes after the write succeeded.
//!
//! Every successful [`save`](TemplateStore::save) also marks the saved
//! template as last used, as does [`mark_last_used`](TemplateStore::mark_last_used).

use crate::types::{Placement, ValueError, WatermarkSpec};
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// On-disk format version written by this build.
pub const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),
    #[error("invalid template name '{0}': names must not be blank")]
    InvalidName(String),
    #[error("invalid template: {0}")]
    Invalid(#[from] ValueError),
    #[error("template store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("template store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("template store version {found} is not supported (expected {})", STORE_VERSION)]
    Version { found: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub spec: WatermarkSpec,
    pub placement: Placement,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// A fresh template stamped with the current time.
    pub fn new(name: impl Into<String>, spec: WatermarkSpec, placement: Placement) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            spec,
            placement,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    last_used: Option<String>,
    #[serde(default)]
    templates: Vec<Template>,
}

impl StoreFile {
    fn empty() -> Self {
        Self {
            version: STORE_VERSION,
            ..Self::default()
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.name == name)
    }

    /// The store at `path`; a missing file is an empty store.
    fn read(path: &Path) -> Result<Self, TemplateError> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let content = fs::read_to_string(path)?;
        let file: StoreFile = serde_json::from_str(&content)?;
        if file.version != STORE_VERSION {
            return Err(TemplateError::Version {
                found: file.version,
            });
        }
        Ok(file)
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[derive(Debug)]
pub struct TemplateStore {
    path: PathBuf,
    state: Mutex<StoreFile>,
}

/// Default store location under the platform config directory.
pub fn default_store_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("photomark").join("templates.json"))
}

impl TemplateStore {
    /// Open the store at `path`. A missing file is an empty store; it is
    /// created on the first change.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let path = path.into();
        let state = StoreFile::read(&path)?;
        debug!(path = %path.display(), templates = state.templates.len(), "opened template store");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, StoreFile> {
        // A panic mid-update never commits, so the data is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `change` to the current contents of the file and write the
    /// result back, holding the file lock throughout. Nothing is written
    /// when `change` fails.
    fn update<T>(
        &self,
        change: impl FnOnce(&mut StoreFile) -> Result<T, TemplateError>,
    ) -> Result<T, TemplateError> {
        let mut state = self.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(sibling(&self.path, ".lock"))?;
        let mut file_lock = RwLock::new(lock_file);
        let _held = file_lock.write()?;

        let mut next = StoreFile::read(&self.path)?;
        let value = change(&mut next)?;
        let json = serde_json::to_string_pretty(&next)?;
        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        *state = next;
        Ok(value)
    }

    /// Insert or overwrite a template and mark it last used.
    ///
    /// Overwriting keeps the existing list position and `created_at` and
    /// bumps `updated_at`. Returns the template as stored.
    pub fn save(&self, template: Template) -> Result<Template, TemplateError> {
        if template.name.trim().is_empty() {
            return Err(TemplateError::InvalidName(template.name));
        }
        template.spec.validate()?;
        template.placement.validate()?;

        let stored = self.update(|file| {
            let stored = match file.position(&template.name) {
                Some(index) => {
                    let existing = &mut file.templates[index];
                    *existing = Template {
                        created_at: existing.created_at,
                        updated_at: Utc::now().max(existing.updated_at),
                        ..template
                    };
                    existing.clone()
                }
                None => {
                    file.templates.push(template.clone());
                    template
                }
            };
            file.last_used = Some(stored.name.clone());
            Ok(stored)
        })?;
        debug!(name = %stored.name, "saved template");
        Ok(stored)
    }

    pub fn load(&self, name: &str) -> Result<Template, TemplateError> {
        let state = self.lock();
        state
            .position(name)
            .map(|i| state.templates[i].clone())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    /// All templates in insertion order.
    pub fn list(&self) -> Vec<Template> {
        self.lock().templates.clone()
    }

    /// Remove a template; clears the last-used marker if it pointed here.
    pub fn delete(&self, name: &str) -> Result<Template, TemplateError> {
        let removed = self.update(|file| {
            let index = file
                .position(name)
                .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
            if file.last_used.as_deref() == Some(name) {
                file.last_used = None;
            }
            Ok(file.templates.remove(index))
        })?;
        debug!(name, "deleted template");
        Ok(removed)
    }

    pub fn load_last_used(&self) -> Option<Template> {
        let state = self.lock();
        let name = state.last_used.as_deref()?;
        state.position(name).map(|i| state.templates[i].clone())
    }

    pub fn mark_last_used(&self, name: &str) -> Result<(), TemplateError> {
        self.update(|file| {
            if file.position(name).is_none() {
                return Err(TemplateError::NotFound(name.to_string()));
            }
            file.last_used = Some(name.to_string());
            Ok(())
        })
    }
}
