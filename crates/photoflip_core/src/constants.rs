//! Shared constants used across PhotoFlip crates.

/// Drop-target identifier of the trash zone.
pub const TRASH_TARGET_ID: &str = "TRASH_BIN";

/// Drop-target identifier of the main gallery (unfiled items).
pub const MAIN_GALLERY_TARGET_ID: &str = "Select Folder";

/// Default quiet period before a notes edit is persisted, in milliseconds.
pub const DEFAULT_NOTES_DEBOUNCE_MS: u64 = 1_000;

/// Default lifetime of the "saved" indicator, in milliseconds.
pub const DEFAULT_SAVED_INDICATOR_MS: u64 = 4_000;

/// Default lifetime of the trash "dropping" indicator, in milliseconds.
pub const DEFAULT_DROP_FEEDBACK_MS: u64 = 500;

/// Default number of memoized render URLs kept before eviction.
pub const DEFAULT_URL_CACHE_CAPACITY: usize = 256;

/// Default per-file upload cap.
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// File name of the record database inside the data directory.
pub const RECORDS_FILE_NAME: &str = "records.redb";

/// Directory holding owner-namespaced blobs inside the data directory.
pub const BLOBS_DIR_NAME: &str = "blobs";

/// Directory holding materialized render copies inside the data directory.
pub const RENDER_CACHE_DIR_NAME: &str = "render-cache";

/// Metadata index entry name inside exported archives.
pub const ARCHIVE_INDEX_NAME: &str = "gallery.json";

/// Offline viewer entry name inside exported archives.
pub const ARCHIVE_VIEWER_NAME: &str = "index.html";

/// Directory prefix for image entries inside exported archives.
pub const ARCHIVE_PHOTOS_DIR: &str = "photos";

/// File name of the JSON document store inside the data directory.
pub const DOCUMENTS_FILE_NAME: &str = "gallery-items.json";
