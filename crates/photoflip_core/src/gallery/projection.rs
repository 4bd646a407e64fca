//! Derived "visible set" of the gallery: folder filter plus notes search.

use crate::constants::MAIN_GALLERY_TARGET_ID;
use crate::models::item::Item;

/// Which folder the gallery is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FolderFilter {
    /// Unfiled items (empty folder label).
    #[default]
    Main,
    Named(String),
}

impl FolderFilter {
    /// Interpret a folder picker value; the main-gallery sentinel and `""` select [`FolderFilter::Main`].
    pub fn from_target(target: &str) -> Self {
        if target.is_empty() || target == MAIN_GALLERY_TARGET_ID {
            Self::Main
        } else {
            Self::Named(target.to_string())
        }
    }

    /// Folder label carried by items in this view.
    pub fn label(&self) -> &str {
        match self {
            Self::Main => "",
            Self::Named(name) => name.as_str(),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::Main => item.is_unfiled(),
            Self::Named(name) => item.folder == *name,
        }
    }
}

/// Items shown for `filter` and `search`.
///
/// A non-blank search matches notes case-insensitively across every folder;
/// otherwise only the active folder's items are shown. Store order is kept.
pub fn visible<'a>(items: &'a [Item], filter: &FolderFilter, search: &str) -> Vec<&'a Item> {
    let query = search.trim().to_lowercase();
    if query.is_empty() {
        items.iter().filter(|item| filter.matches(item)).collect()
    } else {
        items
            .iter()
            .filter(|item| item.notes.to_lowercase().contains(&query))
            .collect()
    }
}
