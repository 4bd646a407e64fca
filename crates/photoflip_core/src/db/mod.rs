//! Record storage layer: the owner-scoped store contract and its backends.

/// JSON document-backed record store.
pub mod document;
/// redb row-backed record store.
pub mod records;
/// redb table definitions.
pub mod tables;

use crate::config::Config;
use crate::content::{fs::FilesystemBlobStore, ContentStore};
use crate::error::AppError;
use crate::models::{
    folder::Folder,
    item::{Item, ItemField, OwnerId},
};
use async_trait::async_trait;
use std::sync::Arc;

pub use document::DocumentRecordStore;
pub use records::RedbRecordStore;


/// Structured metadata storage for items and folder names.
///
/// Every method takes the owner explicitly; implementations reject any row
/// that belongs to a different owner with [`AppError::Permission`] before
/// mutating anything.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List `owner`'s items, newest first.
    async fn list_items(&self, owner: &OwnerId) -> Result<Vec<Item>, AppError>;

    /// Insert or replace an item row.
    async fn upsert(&self, owner: &OwnerId, item: &Item) -> Result<(), AppError>;

    /// Write a single field of one item.
    async fn update_field(
        &self,
        owner: &OwnerId,
        id: &str,
        field: &ItemField,
    ) -> Result<(), AppError> {
        self.update_field_many(owner, &[id.to_string()], field)
            .await
    }

    /// Write the same field value to every listed item in one batch.
    ///
    /// Fails with [`AppError::NotFound`] when any id is missing; nothing is
    /// written in that case.
    async fn update_field_many(
        &self,
        owner: &OwnerId,
        ids: &[String],
        field: &ItemField,
    ) -> Result<(), AppError>;

    /// Delete the listed item rows. Missing ids are ignored.
    async fn delete_many(&self, owner: &OwnerId, ids: &[String]) -> Result<(), AppError>;

    /// List `owner`'s folders in display order.
    async fn list_folders(&self, owner: &OwnerId) -> Result<Vec<Folder>, AppError>;

    /// Create a folder. Duplicate names fail validation.
    async fn create_folder(&self, owner: &OwnerId, name: &str) -> Result<Folder, AppError>;

    /// Reassign every item labeled `name` to the main gallery, then remove the folder.
    ///
    /// # Returns
    /// Ids of the reassigned items.
    async fn delete_folder(&self, owner: &OwnerId, name: &str) -> Result<Vec<String>, AppError>;
}

/// Reject rows that belong to a different owner or point outside its blob namespace.
pub(crate) fn ensure_owned(item: &Item, owner: &OwnerId) -> Result<(), AppError> {
    if &item.owner_id != owner {
        return Err(AppError::Permission(format!(
            "item '{}' does not belong to owner '{}'",
            item.id, owner
        )));
    }
    if !item.content_ref.is_owned_by(owner) {
        return Err(AppError::Permission(format!(
            "item '{}' references content '{}' outside owner '{}'",
            item.id, item.content_ref, owner
        )));
    }
    Ok(())
}

/// Explicitly opened storage handles for one data directory.
pub struct Database {
    pub records: Arc<dyn RecordStore>,
    pub content: Arc<ContentStore>,
}

impl Database {
    /// Open the record store and blob store configured by `config`.
    ///
    /// # Returns
    /// A [`Database`] owning both stores.
    ///
    /// # Errors
    /// Returns an error when the data directory or either store cannot be opened.
    pub async fn open(config: &Config) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let records: Arc<dyn RecordStore> = if config.document_store {
            Arc::new(DocumentRecordStore::open(config.documents_path()).await?)
        } else {
            Arc::new(RedbRecordStore::open(config.records_path()).await?)
        };
        let blobs = FilesystemBlobStore::new(config.blobs_dir()).await?;
        let content = ContentStore::new(
            Arc::new(blobs),
            config.render_cache_dir(),
            config.url_cache_capacity,
        )
        .await?;
        tracing::info!(
            data_dir = %config.data_dir.display(),
            document_store = config.document_store,
            "opened photoflip storage"
        );
        Ok(Self {
            records,
            content: Arc::new(content),
        })
    }

    /// Release render URLs and drop the store handles.
    pub async fn close(self) {
        self.content.close().await;
    }
}
