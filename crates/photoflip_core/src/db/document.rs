//! Document-style record store: one JSON document per owner.
//!
//! The whole collection lives in memory and is mirrored to a single JSON file
//! after each mutation, the same shape a browser key-value store would hold.

use super::{ensure_owned, RecordStore};
use crate::error::AppError;
use crate::models::{
    folder::Folder,
    item::{Item, ItemField, OwnerId},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct OwnerDocument {
    /// Newest first.
    items: Vec<Item>,
    folders: Vec<Folder>,
}

type Documents = BTreeMap<String, OwnerDocument>;

/// Record store keeping one JSON document per owner.
pub struct DocumentRecordStore {
    path: Option<PathBuf>,
    documents: Mutex<Documents>,
    /// Orders file mirroring so snapshots land on disk in mutation order.
    write_lock: tokio::sync::Mutex<()>,
}

impl DocumentRecordStore {
    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            documents: Mutex::new(Documents::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the document file at `path`, starting empty when it does not exist.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let documents = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Documents::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: Some(path),
            documents: Mutex::new(documents),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn documents(&self) -> Result<MutexGuard<'_, Documents>, AppError> {
        self.documents
            .lock()
            .map_err(|_| AppError::Storage("Document store lock poisoned".to_string()))
    }

    /// Apply `mutate` to `owner`'s document and mirror the result to disk.
    async fn mutate<T, F>(&self, owner: &OwnerId, mutate: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut OwnerDocument) -> Result<T, AppError>,
    {
        let _write_guard = self.write_lock.lock().await;
        let (result, snapshot) = {
            let mut documents = self.documents()?;
            let doc = documents.entry(owner.as_str().to_string()).or_default();
            // Work on a copy so a failed mutation leaves the document untouched.
            let mut draft = doc.clone();
            let result = mutate(&mut draft)?;
            *doc = draft;
            let snapshot = match self.path {
                Some(_) => Some(serde_json::to_vec_pretty(&*documents)?),
                None => None,
            };
            (result, snapshot)
        };

        if let (Some(path), Some(bytes)) = (self.path.as_ref(), snapshot) {
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, path).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl RecordStore for DocumentRecordStore {
    async fn list_items(&self, owner: &OwnerId) -> Result<Vec<Item>, AppError> {
        let documents = self.documents()?;
        Ok(documents
            .get(owner.as_str())
            .map(|doc| doc.items.clone())
            .unwrap_or_default())
    }

    async fn upsert(&self, owner: &OwnerId, item: &Item) -> Result<(), AppError> {
        ensure_owned(item, owner)?;
        let item = item.clone();
        self.mutate(owner, move |doc| {
            match doc.items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => *existing = item,
                None => {
                    let position = doc
                        .items
                        .iter()
                        .position(|existing| existing.created_at <= item.created_at)
                        .unwrap_or(doc.items.len());
                    doc.items.insert(position, item);
                }
            }
            Ok(())
        })
        .await
    }

    async fn update_field_many(
        &self,
        owner: &OwnerId,
        ids: &[String],
        field: &ItemField,
    ) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.mutate(owner, |doc| {
            for id in ids {
                let item = doc
                    .items
                    .iter_mut()
                    .find(|item| &item.id == id)
                    .ok_or_else(|| AppError::NotFound(format!("item '{}'", id)))?;
                field.apply(item);
            }
            Ok(())
        })
        .await
    }

    async fn delete_many(&self, owner: &OwnerId, ids: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.mutate(owner, |doc| {
            doc.items.retain(|item| !ids.contains(&item.id));
            Ok(())
        })
        .await
    }

    async fn list_folders(&self, owner: &OwnerId) -> Result<Vec<Folder>, AppError> {
        let documents = self.documents()?;
        let mut folders = documents
            .get(owner.as_str())
            .map(|doc| doc.folders.clone())
            .unwrap_or_default();
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    async fn create_folder(&self, owner: &OwnerId, name: &str) -> Result<Folder, AppError> {
        let folder = Folder::new(owner.clone(), name.to_string());
        let created = folder.clone();
        self.mutate(owner, move |doc| {
            if doc.folders.iter().any(|existing| existing.name == folder.name) {
                return Err(AppError::Validation(format!(
                    "Folder '{}' already exists",
                    folder.name
                )));
            }
            doc.folders.push(folder);
            Ok(())
        })
        .await?;
        Ok(created)
    }

    async fn delete_folder(&self, owner: &OwnerId, name: &str) -> Result<Vec<String>, AppError> {
        self.mutate(owner, |doc| {
            if !doc.folders.iter().any(|folder| folder.name == name) {
                return Err(AppError::NotFound(format!("folder '{}'", name)));
            }
            let mut reassigned = Vec::new();
            for item in doc.items.iter_mut().filter(|item| item.folder == name) {
                item.folder.clear();
                reassigned.push(item.id.clone());
            }
            doc.folders.retain(|folder| folder.name != name);
            Ok(reassigned)
        })
        .await
    }
}
