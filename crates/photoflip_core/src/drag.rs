//! Drop-target resolution for drag gestures over the gallery.

use crate::constants::{MAIN_GALLERY_TARGET_ID, TRASH_TARGET_ID};
use crate::models::folder::Folder;
use std::collections::BTreeSet;

/// A drag in progress, captured at drag start.
///
/// The selection is a snapshot: changes to the live selection while the
/// gesture is active do not affect what it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragGesture {
    pub active_id: String,
    /// Folder label of the dragged item when the drag started.
    pub active_folder: String,
    pub selection: BTreeSet<String>,
}

impl DragGesture {
    pub fn new(
        active_id: impl Into<String>,
        active_folder: impl Into<String>,
        selection: BTreeSet<String>,
    ) -> Self {
        Self {
            active_id: active_id.into(),
            active_folder: active_folder.into(),
            selection,
        }
    }

    /// Ids the gesture acts on.
    ///
    /// Dragging a selected item while more than one item is selected drags the
    /// whole selection; otherwise only the dragged item moves.
    pub fn dragged_ids(&self) -> Vec<String> {
        if self.selection.len() > 1 && self.selection.contains(&self.active_id) {
            self.selection.iter().cloned().collect()
        } else {
            vec![self.active_id.clone()]
        }
    }
}

/// What a finished drag should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragAction {
    /// Relabel `ids` with `folder` (`""` for the main gallery).
    Move { ids: Vec<String>, folder: String },
    /// Remove `ids` and their blobs.
    Delete { ids: Vec<String> },
    NoOp,
}

/// Resolve a drop of `gesture` over `over` into an action.
///
/// Targets are the trash, the main gallery, or a known folder name. Anything
/// else (no target, another card, an unknown label) and drops onto the dragged
/// item's own folder resolve to [`DragAction::NoOp`].
pub fn resolve(gesture: &DragGesture, over: Option<&str>, folders: &[Folder]) -> DragAction {
    let Some(target) = over else {
        return DragAction::NoOp;
    };

    if target == TRASH_TARGET_ID {
        return DragAction::Delete {
            ids: gesture.dragged_ids(),
        };
    }

    let folder = if target == MAIN_GALLERY_TARGET_ID {
        ""
    } else if folders.iter().any(|folder| folder.name == target) {
        target
    } else {
        return DragAction::NoOp;
    };

    if folder == gesture.active_folder {
        return DragAction::NoOp;
    }

    DragAction::Move {
        ids: gesture.dragged_ids(),
        folder: folder.to_string(),
    }
}
