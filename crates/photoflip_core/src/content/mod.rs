//! Content store: owner-namespaced image blobs plus memoized render URLs.

/// Filesystem-backed blob store.
pub mod fs;
/// In-process blob store.
pub mod memory;
mod url_cache;

use crate::error::AppError;
use crate::models::item::ContentKey;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use url_cache::UrlCache;

pub use fs::FilesystemBlobStore;
pub use memory::MemoryBlobStore;

/// Key-addressed blob storage.
///
/// Writes to different keys never block one another; two writes to the same
/// key race and the last one wins.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob.
    async fn put(&self, key: &ContentKey, data: Vec<u8>) -> Result<(), AppError>;

    /// Retrieve all bytes stored under `key`.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when no blob exists for `key`.
    async fn get(&self, key: &ContentKey) -> Result<Vec<u8>, AppError>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &ContentKey) -> Result<bool, AppError>;

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, key: &ContentKey) -> Result<bool, AppError>;
}

/// A render URL handed out by [`ContentStore::grant_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlGrant {
    pub url: String,
    /// Keys whose handles were evicted to make room.
    pub evicted: Vec<ContentKey>,
}

/// Blob storage with render-URL materialization.
///
/// `get_url` hands out a `file://` URL to a materialized copy of the blob and
/// keeps returning the same URL for the same key until the handle is released
/// by [`ContentStore::release_url`], [`ContentStore::delete`], capacity
/// eviction, or [`ContentStore::close`].
pub struct ContentStore {
    blobs: Arc<dyn BlobStore>,
    urls: UrlCache,
}

impl ContentStore {
    /// Wrap `blobs`, materializing render URLs under `render_dir`.
    ///
    /// # Errors
    /// Returns an error when the render directory cannot be created.
    pub async fn new(
        blobs: Arc<dyn BlobStore>,
        render_dir: PathBuf,
        url_capacity: usize,
    ) -> Result<Self, AppError> {
        let urls = UrlCache::open(render_dir, url_capacity).await?;
        Ok(Self { blobs, urls })
    }

    pub async fn put(&self, key: &ContentKey, data: Vec<u8>) -> Result<(), AppError> {
        self.blobs.put(key, data).await?;
        // A rewritten blob must not keep serving an outdated copy.
        self.urls.release(key).await;
        Ok(())
    }

    pub async fn get(&self, key: &ContentKey) -> Result<Vec<u8>, AppError> {
        self.blobs.get(key).await
    }

    pub async fn exists(&self, key: &ContentKey) -> Result<bool, AppError> {
        self.blobs.exists(key).await
    }

    /// Return the memoized render URL for `key`, materializing it on first use.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the blob does not exist.
    pub async fn get_url(&self, key: &ContentKey) -> Result<String, AppError> {
        Ok(self.grant_url(key).await?.url)
    }

    /// Like [`ContentStore::get_url`], also reporting the handles evicted to make room.
    ///
    /// URLs previously handed out for the evicted keys no longer resolve.
    pub async fn grant_url(&self, key: &ContentKey) -> Result<UrlGrant, AppError> {
        if let Some(url) = self.urls.lookup(key)? {
            return Ok(UrlGrant {
                url,
                evicted: Vec::new(),
            });
        }
        let bytes = self.blobs.get(key).await?;
        let materialized = self.urls.materialize(key, &bytes).await?;
        Ok(UrlGrant {
            url: materialized.url,
            evicted: materialized.evicted,
        })
    }

    /// Maximum number of live render URL handles.
    pub fn url_capacity(&self) -> usize {
        self.urls.capacity()
    }

    /// Release the render URL handle for `key`, if one is cached.
    pub async fn release_url(&self, key: &ContentKey) {
        self.urls.release(key).await;
    }

    /// Release the render URL for `key` and delete its blob.
    ///
    /// # Returns
    /// `true` if a blob was deleted.
    pub async fn delete(&self, key: &ContentKey) -> Result<bool, AppError> {
        self.urls.release(key).await;
        self.blobs.delete(key).await
    }

    /// Number of live render URL handles.
    pub fn cached_urls(&self) -> usize {
        self.urls.len()
    }

    /// Release every render URL handle.
    pub async fn close(&self) {
        self.urls.release_all().await;
    }
}
