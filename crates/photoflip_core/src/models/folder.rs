//! Folder label models and name validation.

use super::item::OwnerId;
use crate::constants::{MAIN_GALLERY_TARGET_ID, TRASH_TARGET_ID};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named bucket for items. Items refer to folders by name only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Folder {
    pub owner_id: OwnerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Folder {
    /// Create a folder row for `owner` with an already validated name.
    pub fn new(owner_id: OwnerId, name: String) -> Self {
        Self {
            owner_id,
            name,
            created_at: Utc::now(),
        }
    }
}

/// Validate a user-supplied folder name.
///
/// Names are trimmed; empty names and the drop-target identifiers reserved
/// for the trash and the main gallery are rejected.
///
/// # Returns
/// The trimmed name.
///
/// # Errors
/// Returns [`AppError::Validation`] for empty or reserved names.
pub fn validate_folder_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "Folder name cannot be empty".to_string(),
        ));
    }
    if trimmed == TRASH_TARGET_ID || trimmed == MAIN_GALLERY_TARGET_ID {
        return Err(AppError::Validation(format!(
            "Folder name '{}' is reserved",
            trimmed
        )));
    }
    Ok(trimmed.to_string())
}
