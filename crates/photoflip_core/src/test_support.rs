//! Shared fixtures for unit tests.

use crate::content::{ContentStore, MemoryBlobStore};
use crate::db::{DocumentRecordStore, RecordStore, RedbRecordStore};
use crate::error::AppError;
use crate::models::{
    folder::Folder,
    item::{ContentKey, Item, ItemField, OwnerId},
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub(crate) fn owner(name: &str) -> OwnerId {
    OwnerId::new(name).unwrap()
}

pub(crate) async fn temp_content() -> (Arc<ContentStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let content = ContentStore::new(
        Arc::new(MemoryBlobStore::new()),
        dir.path().join("render"),
        64,
    )
    .await
    .unwrap();
    (Arc::new(content), dir)
}

pub(crate) async fn temp_redb() -> (RedbRecordStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = RedbRecordStore::open(dir.path().join("records.redb"))
        .await
        .unwrap();
    (store, dir)
}

/// Store an image blob and its row, returning the item.
pub(crate) async fn seed_item(
    records: &dyn RecordStore,
    content: &ContentStore,
    owner: &OwnerId,
    name: &str,
    notes: &str,
    folder: &str,
) -> Item {
    let key = ContentKey::generate(owner, name);
    content
        .put(&key, format!("bytes of {}", name).into_bytes())
        .await
        .unwrap();
    let mut item = Item::new(owner.clone(), key, name.to_string(), folder.to_string());
    item.notes = notes.to_string();
    records.upsert(owner, &item).await.unwrap();
    item
}

/// Record store wrapper that counts writes and can be switched into a failing mode.
pub(crate) struct FlakyRecordStore {
    inner: Arc<dyn RecordStore>,
    failing: AtomicBool,
    writes: AtomicUsize,
    field_writes: Mutex<Vec<(Vec<String>, ItemField)>>,
}

impl FlakyRecordStore {
    pub(crate) fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            field_writes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn in_memory() -> Self {
        Self::new(Arc::new(DocumentRecordStore::in_memory()))
    }

    pub(crate) fn inner(&self) -> &Arc<dyn RecordStore> {
        &self.inner
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Write attempts, including failed ones.
    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Field writes attempted, in order.
    pub(crate) fn field_writes(&self) -> Vec<(Vec<String>, ItemField)> {
        self.field_writes.lock().unwrap().clone()
    }

    fn write_attempt(&self) -> Result<(), AppError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Storage("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn list_items(&self, owner: &OwnerId) -> Result<Vec<Item>, AppError> {
        self.inner.list_items(owner).await
    }

    async fn upsert(&self, owner: &OwnerId, item: &Item) -> Result<(), AppError> {
        self.write_attempt()?;
        self.inner.upsert(owner, item).await
    }

    async fn update_field_many(
        &self,
        owner: &OwnerId,
        ids: &[String],
        field: &ItemField,
    ) -> Result<(), AppError> {
        self.field_writes
            .lock()
            .unwrap()
            .push((ids.to_vec(), field.clone()));
        self.write_attempt()?;
        self.inner.update_field_many(owner, ids, field).await
    }

    async fn delete_many(&self, owner: &OwnerId, ids: &[String]) -> Result<(), AppError> {
        self.write_attempt()?;
        self.inner.delete_many(owner, ids).await
    }

    async fn list_folders(&self, owner: &OwnerId) -> Result<Vec<Folder>, AppError> {
        self.inner.list_folders(owner).await
    }

    async fn create_folder(&self, owner: &OwnerId, name: &str) -> Result<Folder, AppError> {
        self.write_attempt()?;
        self.inner.create_folder(owner, name).await
    }

    async fn delete_folder(&self, owner: &OwnerId, name: &str) -> Result<Vec<String>, AppError> {
        self.write_attempt()?;
        self.inner.delete_folder(owner, name).await
    }
}
