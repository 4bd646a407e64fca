//! Portable gallery archives.
//!
//! An archive is a ZIP container holding:
//! - `gallery.json`: one [`IndexRecord`] per exported image,
//! - `photos/[<folder>/]<file>`: the image bytes, named after the item's content key,
//! - `index.html`: a static page for browsing the export without the app.
//!
//! Import is lenient about layout: the index is found by name suffix and each
//! image by file-name suffix, so archives re-zipped inside another directory
//! still import.

pub mod export;
pub mod import;
mod viewer;


use crate::models::item::Fingerprint;
use serde::{Deserialize, Serialize};

pub use export::export_archive;
pub use import::{import_archive, ImportReport};

/// Metadata for one image inside an archive index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub flipped: bool,
    /// File name of the paired image entry.
    pub filename: String,
    /// Original display name; older exports omit it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl IndexRecord {
    /// Name shown for the imported item, falling back to the entry file name.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.filename.as_str()
        } else {
            self.name.as_str()
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.display_name(), &self.notes)
    }
}

/// Running count reported while a batch is processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }
}

/// Turn a folder label into a single safe path segment.
pub(crate) fn sanitize_segment(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}
