//! Optimistic writes still on their way to the record store.
//!
//! A refresh replays these over the fresh listing so a reconcile triggered
//! by one failed write cannot undo another write that has not landed yet.

use crate::models::{folder::Folder, item::Item};

/// One optimistic mutation, as applied to the in-memory collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingWrite {
    Move { ids: Vec<String>, folder: String },
    Delete { ids: Vec<String> },
    Flip { id: String, flipped: bool },
    CreateFolder(Folder),
    DeleteFolder(String),
}

impl PendingWrite {
    fn apply(&self, items: &mut Vec<Item>, folders: &mut Vec<Folder>) {
        match self {
            Self::Move { ids, folder } => {
                for item in items.iter_mut().filter(|item| ids.contains(&item.id)) {
                    item.folder = folder.clone();
                }
            }
            Self::Delete { ids } => items.retain(|item| !ids.contains(&item.id)),
            Self::Flip { id, flipped } => {
                if let Some(item) = items.iter_mut().find(|item| &item.id == id) {
                    item.flipped = *flipped;
                }
            }
            Self::CreateFolder(folder) => {
                if !folders.iter().any(|existing| existing.name == folder.name) {
                    let position = folders.partition_point(|existing| existing.name < folder.name);
                    folders.insert(position, folder.clone());
                }
            }
            Self::DeleteFolder(name) => {
                for item in items.iter_mut().filter(|item| &item.folder == name) {
                    item.folder.clear();
                }
                folders.retain(|folder| &folder.name != name);
            }
        }
    }
}

/// In-flight writes in issue order, each under a token.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    next_token: u64,
    entries: Vec<(u64, PendingWrite)>,
}

impl PendingWrites {
    /// Record a write that was just applied optimistically.
    pub(crate) fn begin(&mut self, write: PendingWrite) -> u64 {
        self.next_token += 1;
        self.entries.push((self.next_token, write));
        self.next_token
    }

    /// Forget the write under `token` once the store has answered.
    pub(crate) fn finish(&mut self, token: u64) {
        self.entries.retain(|(pending, _)| *pending != token);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Re-apply every in-flight write, oldest first.
    pub(crate) fn replay(&self, items: &mut Vec<Item>, folders: &mut Vec<Folder>) {
        for (_, write) in &self.entries {
            write.apply(items, folders);
        }
    }
}
