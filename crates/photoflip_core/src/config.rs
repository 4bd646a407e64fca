//! Configuration loading from environment variables.

use crate::constants::{
    BLOBS_DIR_NAME, DEFAULT_DROP_FEEDBACK_MS, DEFAULT_MAX_UPLOAD_SIZE,
    DEFAULT_NOTES_DEBOUNCE_MS, DEFAULT_SAVED_INDICATOR_MS, DEFAULT_URL_CACHE_CAPACITY,
    DOCUMENTS_FILE_NAME, RECORDS_FILE_NAME, RENDER_CACHE_DIR_NAME,
};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for PhotoFlip.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub notes_debounce_ms: u64,
    pub saved_indicator_ms: u64,
    pub drop_feedback_ms: u64,
    pub url_cache_capacity: usize,
    pub max_upload_size: usize,
    pub document_store: bool,
}

/// Timing knobs injected into the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalleryTiming {
    /// Quiet period before a notes edit is written.
    pub notes_debounce: Duration,
    /// How long the "saved" indicator stays up after a notes write.
    pub saved_indicator: Duration,
    /// How long the trash "dropping" indicator stays up.
    pub drop_feedback: Duration,
}

impl Default for GalleryTiming {
    fn default() -> Self {
        Self {
            notes_debounce: Duration::from_millis(DEFAULT_NOTES_DEBOUNCE_MS),
            saved_indicator: Duration::from_millis(DEFAULT_SAVED_INDICATOR_MS),
            drop_feedback: Duration::from_millis(DEFAULT_DROP_FEEDBACK_MS),
        }
    }
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: String) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn resolve_home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }

    // Windows USERPROFILE (standard)
    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Some(PathBuf::from(profile));
        }
    }

    std::env::current_dir().ok()
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing.
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("PHOTOFLIP_DATA_DIR")
                .map(expand_tilde)
                .unwrap_or_else(|_| {
                    let home = resolve_home_dir().unwrap_or_else(|| PathBuf::from("."));
                    home.join(".cache").join("photoflip")
                }),
            notes_debounce_ms: env_number("PHOTOFLIP_NOTES_DEBOUNCE_MS", DEFAULT_NOTES_DEBOUNCE_MS),
            saved_indicator_ms: env_number(
                "PHOTOFLIP_SAVED_INDICATOR_MS",
                DEFAULT_SAVED_INDICATOR_MS,
            ),
            drop_feedback_ms: env_number("PHOTOFLIP_DROP_FEEDBACK_MS", DEFAULT_DROP_FEEDBACK_MS),
            url_cache_capacity: env_number(
                "PHOTOFLIP_URL_CACHE_CAPACITY",
                DEFAULT_URL_CACHE_CAPACITY,
            ),
            max_upload_size: env_number("PHOTOFLIP_MAX_UPLOAD_SIZE", DEFAULT_MAX_UPLOAD_SIZE),
            // Row store by default; the JSON document store mirrors the key-value layout.
            document_store: env_flag_enabled("PHOTOFLIP_DOCUMENT_STORE"),
        }
    }

    /// Configuration rooted at an explicit data directory with default tuning.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            notes_debounce_ms: DEFAULT_NOTES_DEBOUNCE_MS,
            saved_indicator_ms: DEFAULT_SAVED_INDICATOR_MS,
            drop_feedback_ms: DEFAULT_DROP_FEEDBACK_MS,
            url_cache_capacity: DEFAULT_URL_CACHE_CAPACITY,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            document_store: false,
        }
    }

    /// Path of the record database file.
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(RECORDS_FILE_NAME)
    }

    /// Path of the JSON document written by the document record store.
    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join(DOCUMENTS_FILE_NAME)
    }

    /// Root directory of the filesystem blob store.
    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join(BLOBS_DIR_NAME)
    }

    /// Directory for materialized render copies.
    pub fn render_cache_dir(&self) -> PathBuf {
        self.data_dir.join(RENDER_CACHE_DIR_NAME)
    }

    /// Timing knobs for the gallery derived from this config.
    pub fn timing(&self) -> GalleryTiming {
        GalleryTiming {
            notes_debounce: Duration::from_millis(self.notes_debounce_ms),
            saved_indicator: Duration::from_millis(self.saved_indicator_ms),
            drop_feedback: Duration::from_millis(self.drop_feedback_ms),
        }
    }
}
