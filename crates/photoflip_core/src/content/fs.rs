use super::BlobStore;
use crate::error::AppError;
use crate::models::item::ContentKey;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Blob store keeping one file per key under a base directory.
///
/// A key `<owner>/<name>` lives at `{base_path}/<owner>/<name>`, so removing
/// an owner's directory is a per-owner bulk cleanup.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    /// Create the store, making the base and temp directories if needed.
    pub async fn new(base_path: PathBuf) -> Result<Self, AppError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self { base_path })
    }

    /// Compute the filesystem path for a key, rejecting keys that could escape the base.
    fn blob_path(&self, key: &ContentKey) -> Result<PathBuf, AppError> {
        // Keys read back from stored rows or archives bypass `ContentKey::parse`.
        let key = ContentKey::parse(key.as_str())?;
        Ok(key
            .as_str()
            .split('/')
            .fold(self.base_path.clone(), |path, segment| path.join(segment)))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, key: &ContentKey, data: Vec<u8>) -> Result<(), AppError> {
        let blob_path = self.blob_path(key)?;
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, key: &ContentKey) -> Result<Vec<u8>, AppError> {
        let blob_path = self.blob_path(key)?;
        match fs::read(&blob_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("blob '{}'", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool, AppError> {
        let blob_path = self.blob_path(key)?;
        Ok(fs::try_exists(&blob_path).await?)
    }

    async fn delete(&self, key: &ContentKey) -> Result<bool, AppError> {
        let blob_path = self.blob_path(key)?;
        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
