//! Core domain library for PhotoFlip (stores, archive codec, gallery sync).

/// Portable export/import archives.
pub mod archive;
/// Configuration loading and defaults.
pub mod config;
/// Shared constants.
pub mod constants;
/// Blob storage and render-URL materialization.
pub mod content;
/// Record storage backends.
pub mod db;
/// Drag gesture resolution.
pub mod drag;
/// Application error types.
pub mod error;
/// Optimistic in-memory gallery state and its store synchronization.
pub mod gallery;
/// Persisted data models.
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use constants::{MAIN_GALLERY_TARGET_ID, TRASH_TARGET_ID};
pub use content::ContentStore;
pub use db::{Database, RecordStore};
pub use error::AppError;
pub use gallery::{Gallery, GalleryEvent};
pub use models::{
    folder::Folder,
    item::{ContentKey, Item, ItemField, OwnerId},
};
