use super::BlobStore;
use crate::error::AppError;
use crate::models::item::ContentKey;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Blob store held entirely in process memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentKey, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &ContentKey, data: Vec<u8>) -> Result<(), AppError> {
        self.blobs.write().await.insert(key.clone(), data);
        Ok(())
    }

    async fn get(&self, key: &ContentKey) -> Result<Vec<u8>, AppError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("blob '{}'", key)))
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool, AppError> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn delete(&self, key: &ContentKey) -> Result<bool, AppError> {
        Ok(self.blobs.write().await.remove(key).is_some())
    }
}
