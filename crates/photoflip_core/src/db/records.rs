//! Item and folder storage backed by redb.

use super::tables::{FOLDERS, ITEMS, ITEMS_BY_CREATED};
use super::{ensure_owned, RecordStore};
use crate::error::AppError;
use crate::models::{
    folder::Folder,
    item::{Item, ItemField, OwnerId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use std::path::PathBuf;
use std::sync::Arc;

/// Reverse-millis recency key so ascending iteration yields newest first.
pub(crate) fn reverse_timestamp_key(created_at: DateTime<Utc>) -> u64 {
    // Pre-epoch timestamps are clamped to keep the key non-negative.
    let millis = created_at.timestamp_millis().max(0) as u64;
    u64::MAX.saturating_sub(millis)
}

fn deserialize_item(bytes: &[u8]) -> Result<Item, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Row-based record store in a single redb file.
pub struct RedbRecordStore {
    db: Arc<redb::Database>,
}

impl RedbRecordStore {
    /// Open (or create) the database file and initialize its tables.
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened or tables cannot be created.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let db = tokio::task::spawn_blocking(move || -> Result<redb::Database, AppError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let db = redb::Database::create(&path)?;
            let write_txn = db.begin_write()?;
            write_txn.open_table(ITEMS)?;
            write_txn.open_table(ITEMS_BY_CREATED)?;
            write_txn.open_table(FOLDERS)?;
            write_txn.commit()?;
            Ok(db)
        })
        .await??;
        Ok(Self { db: Arc::new(db) })
    }

    /// Run a blocking redb operation off the async executor.
    async fn blocking<T, F>(&self, op: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&redb::Database) -> Result<T, AppError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db)).await?
    }
}

fn list_items_blocking(db: &redb::Database, owner: &OwnerId) -> Result<Vec<Item>, AppError> {
    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(ITEMS_BY_CREATED)?;
    let items_table = read_txn.open_table(ITEMS)?;
    let mut items = Vec::new();

    for entry in index.range((owner.as_str(), 0u64, "")..)? {
        let (key, _) = entry?;
        let (key_owner, _, id) = key.value();
        if key_owner != owner.as_str() {
            break;
        }
        let Some(row) = items_table.get(id)? else {
            tracing::warn!(item_id = id, "recency index points at a missing item row");
            continue;
        };
        let item = deserialize_item(row.value())?;
        if &item.owner_id == owner {
            items.push(item);
        }
    }

    Ok(items)
}

fn upsert_blocking(db: &redb::Database, owner: &OwnerId, item: &Item) -> Result<(), AppError> {
    ensure_owned(item, owner)?;
    let encoded = bincode::serialize(item)?;
    let recency_key = reverse_timestamp_key(item.created_at);

    let write_txn = db.begin_write()?;
    {
        let mut items = write_txn.open_table(ITEMS)?;
        let mut index = write_txn.open_table(ITEMS_BY_CREATED)?;

        let previous = match items.get(item.id.as_str())? {
            Some(guard) => Some(deserialize_item(guard.value())?),
            None => None,
        };
        if let Some(previous) = previous {
            ensure_owned(&previous, owner)?;
            let old_key = reverse_timestamp_key(previous.created_at);
            let _ = index.remove((owner.as_str(), old_key, item.id.as_str()))?;
        }

        items.insert(item.id.as_str(), encoded.as_slice())?;
        index.insert((owner.as_str(), recency_key, item.id.as_str()), ())?;
    }
    write_txn.commit()?;
    Ok(())
}

fn update_field_many_blocking(
    db: &redb::Database,
    owner: &OwnerId,
    ids: &[String],
    field: &ItemField,
) -> Result<(), AppError> {
    let write_txn = db.begin_write()?;
    {
        let mut items = write_txn.open_table(ITEMS)?;

        // Validate every row before the first write so a bad id aborts the batch.
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(guard) = items.get(id.as_str())? else {
                return Err(AppError::NotFound(format!("item '{}'", id)));
            };
            let mut item = deserialize_item(guard.value())?;
            drop(guard);
            ensure_owned(&item, owner)?;
            field.apply(&mut item);
            updated.push(item);
        }

        for item in &updated {
            let encoded = bincode::serialize(item)?;
            items.insert(item.id.as_str(), encoded.as_slice())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

fn delete_many_blocking(db: &redb::Database, owner: &OwnerId, ids: &[String]) -> Result<(), AppError> {
    let write_txn = db.begin_write()?;
    {
        let mut items = write_txn.open_table(ITEMS)?;
        let mut index = write_txn.open_table(ITEMS_BY_CREATED)?;

        let mut doomed = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(guard) = items.get(id.as_str())? else {
                continue;
            };
            let item = deserialize_item(guard.value())?;
            drop(guard);
            ensure_owned(&item, owner)?;
            doomed.push(item);
        }

        for item in &doomed {
            let recency_key = reverse_timestamp_key(item.created_at);
            let _ = index.remove((owner.as_str(), recency_key, item.id.as_str()))?;
            let _ = items.remove(item.id.as_str())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

fn list_folders_blocking(db: &redb::Database, owner: &OwnerId) -> Result<Vec<Folder>, AppError> {
    let read_txn = db.begin_read()?;
    let folders_table = read_txn.open_table(FOLDERS)?;
    let mut folders = Vec::new();
    for entry in folders_table.range((owner.as_str(), "")..)? {
        let (key, value) = entry?;
        let (key_owner, _) = key.value();
        if key_owner != owner.as_str() {
            break;
        }
        folders.push(bincode::deserialize(value.value())?);
    }
    Ok(folders)
}

fn create_folder_blocking(
    db: &redb::Database,
    owner: &OwnerId,
    name: &str,
) -> Result<Folder, AppError> {
    let folder = Folder::new(owner.clone(), name.to_string());
    let encoded = bincode::serialize(&folder)?;

    let write_txn = db.begin_write()?;
    {
        let mut folders = write_txn.open_table(FOLDERS)?;
        if folders.get((owner.as_str(), name))?.is_some() {
            return Err(AppError::Validation(format!(
                "Folder '{}' already exists",
                name
            )));
        }
        folders.insert((owner.as_str(), name), encoded.as_slice())?;
    }
    write_txn.commit()?;
    Ok(folder)
}

fn delete_folder_blocking(
    db: &redb::Database,
    owner: &OwnerId,
    name: &str,
) -> Result<Vec<String>, AppError> {
    let write_txn = db.begin_write()?;
    let reassigned = {
        let mut folders = write_txn.open_table(FOLDERS)?;
        let mut items = write_txn.open_table(ITEMS)?;
        let index = write_txn.open_table(ITEMS_BY_CREATED)?;

        if folders.get((owner.as_str(), name))?.is_none() {
            return Err(AppError::NotFound(format!("folder '{}'", name)));
        }

        // Step 1: relabel every item in the folder as unfiled.
        let mut owned_ids = Vec::new();
        for entry in index.range((owner.as_str(), 0u64, "")..)? {
            let (key, _) = entry?;
            let (key_owner, _, id) = key.value();
            if key_owner != owner.as_str() {
                break;
            }
            owned_ids.push(id.to_string());
        }

        let mut reassigned = Vec::new();
        for id in owned_ids {
            let Some(guard) = items.get(id.as_str())? else {
                continue;
            };
            let mut item = deserialize_item(guard.value())?;
            drop(guard);
            if item.folder != name {
                continue;
            }
            item.folder.clear();
            let encoded = bincode::serialize(&item)?;
            items.insert(id.as_str(), encoded.as_slice())?;
            reassigned.push(id);
        }

        // Step 2: drop the folder row itself.
        let _ = folders.remove((owner.as_str(), name))?;
        reassigned
    };
    write_txn.commit()?;
    Ok(reassigned)
}

#[async_trait]
impl RecordStore for RedbRecordStore {
    async fn list_items(&self, owner: &OwnerId) -> Result<Vec<Item>, AppError> {
        let owner = owner.clone();
        self.blocking(move |db| list_items_blocking(db, &owner))
            .await
    }

    async fn upsert(&self, owner: &OwnerId, item: &Item) -> Result<(), AppError> {
        let owner = owner.clone();
        let item = item.clone();
        self.blocking(move |db| upsert_blocking(db, &owner, &item))
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
        let owner = owner.clone();
        let ids = ids.to_vec();
        let count = ids.len();
        let field = field.clone();
        let field_name = field.name();
        self.blocking(move |db| update_field_many_blocking(db, &owner, &ids, &field))
            .await?;
        tracing::debug!(field = field_name, count, "item fields updated");
        Ok(())
    }

    async fn delete_many(&self, owner: &OwnerId, ids: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let owner = owner.clone();
        let ids = ids.to_vec();
        self.blocking(move |db| delete_many_blocking(db, &owner, &ids))
            .await
    }

    async fn list_folders(&self, owner: &OwnerId) -> Result<Vec<Folder>, AppError> {
        let owner = owner.clone();
        self.blocking(move |db| list_folders_blocking(db, &owner))
            .await
    }

    async fn create_folder(&self, owner: &OwnerId, name: &str) -> Result<Folder, AppError> {
        let owner = owner.clone();
        let name = name.to_string();
        self.blocking(move |db| create_folder_blocking(db, &owner, &name))
            .await
    }

    async fn delete_folder(&self, owner: &OwnerId, name: &str) -> Result<Vec<String>, AppError> {
        let owner = owner.clone();
        let name = name.to_string();
        let reassigned = self
            .blocking(move |db| delete_folder_blocking(db, &owner, &name))
            .await?;
        tracing::debug!(reassigned = reassigned.len(), "folder deleted");
        Ok(reassigned)
    }
}
