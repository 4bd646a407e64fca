//! Photo item models, owner identity and content keys.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of the user owning a set of items.
///
/// Every record-store read and write takes one of these; there is no
/// unscoped access path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Build an owner id from an authentication-provided identifier.
    ///
    /// # Errors
    /// Returns [`AppError::Validation`] for empty ids or ids containing `/`,
    /// which would break owner-namespaced content keys.
    pub fn new(id: impl Into<String>) -> Result<Self, AppError> {
        let id = id.into();
        if id.trim().is_empty() || id.contains('/') || id.contains('\\') {
            return Err(AppError::Validation(format!("Invalid owner id '{}'", id)));
        }
        Ok(Self(id))
    }

    /// Return this owner id as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner-namespaced key of a blob in the content store (`<owner>/<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    /// Generate a fresh key for `owner`, keeping the extension of `original_name`.
    pub fn generate(owner: &OwnerId, original_name: &str) -> Self {
        Self(format!(
            "{}/{}.{}",
            owner,
            Uuid::new_v4(),
            extension_for(original_name)
        ))
    }

    /// Wrap an existing key string after validating its shape.
    ///
    /// # Errors
    /// Returns [`AppError::Validation`] when the key is absolute, has empty
    /// segments, or contains `.`/`..` segments.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AppError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && !raw.contains('\\')
            && raw
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
        if !valid {
            return Err(AppError::Validation(format!("Invalid content key '{}'", raw)));
        }
        Ok(Self(raw))
    }

    /// Return the key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Last path segment of the key, unique per key within one owner.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(self.0.as_str())
    }

    /// Whether this key lives in `owner`'s namespace.
    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        self.0
            .split_once('/')
            .map(|(prefix, _)| prefix == owner.as_str())
            .unwrap_or(false)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased alphanumeric extension of `name`, defaulting to `jpg`.
pub fn extension_for(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string())
}

/// A single photo record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub owner_id: OwnerId,
    pub content_ref: ContentKey,
    /// Display name of the uploaded file.
    pub name: String,
    pub notes: String,
    /// Folder label; the empty string means the main gallery.
    #[serde(default)]
    pub folder: String,
    pub flipped: bool,
    pub created_at: DateTime<Utc>,
    /// Locally materialized URL for the current process. Never persisted.
    #[serde(skip)]
    pub render_url: Option<String>,
}

impl Item {
    /// Create a fresh item with a client-side id and default metadata.
    pub fn new(owner_id: OwnerId, content_ref: ContentKey, name: String, folder: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            content_ref,
            name,
            notes: String::new(),
            folder,
            flipped: false,
            created_at: Utc::now(),
            render_url: None,
        }
    }

    /// Whether this item is unfiled (shown in the main gallery).
    pub fn is_unfiled(&self) -> bool {
        self.folder.is_empty()
    }

    /// Display name, falling back to the content key's file name when blank.
    ///
    /// Archive index records fall back the same way, so an exported item and
    /// its re-imported entry always share a fingerprint.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.content_ref.file_name()
        } else {
            self.name.as_str()
        }
    }

    /// Duplicate-detection key used by archive import.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.display_name(), &self.notes)
    }
}

/// Comparison key used to detect that an import entry already exists.
///
/// Two entries match when both the original file name and the notes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    name: String,
    notes: String,
}

impl Fingerprint {
    /// Build a fingerprint from a file name and notes text.
    pub fn new(name: &str, notes: &str) -> Self {
        Self {
            name: name.to_string(),
            notes: notes.to_string(),
        }
    }
}

/// Single-field update applied to one or more items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemField {
    Notes(String),
    Flipped(bool),
    Folder(String),
}

impl ItemField {
    /// Apply this field value to `item`.
    pub fn apply(&self, item: &mut Item) {
        match self {
            Self::Notes(notes) => item.notes = notes.clone(),
            Self::Flipped(flipped) => item.flipped = *flipped,
            Self::Folder(folder) => item.folder = folder.clone(),
        }
    }

    /// Short field name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Notes(_) => "notes",
            Self::Flipped(_) => "flipped",
            Self::Folder(_) => "folder",
        }
    }
}
