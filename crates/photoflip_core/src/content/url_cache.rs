//! Memoized render URLs backed by materialized files.

use crate::error::AppError;
use crate::models::item::{extension_for, ContentKey};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

struct RenderUrl {
    url: String,
    path: PathBuf,
}

#[derive(Default)]
struct Entries {
    by_key: HashMap<ContentKey, RenderUrl>,
    /// Least recently used first.
    order: VecDeque<ContentKey>,
}

impl Entries {
    fn touch(&mut self, key: &ContentKey) {
        if let Some(position) = self.order.iter().position(|cached| cached == key) {
            if let Some(key) = self.order.remove(position) {
                self.order.push_back(key);
            }
        }
    }
}

/// A materialized URL and the keys whose handles were evicted to make room.
pub(crate) struct Materialized {
    pub(crate) url: String,
    pub(crate) evicted: Vec<ContentKey>,
}

pub(crate) struct UrlCache {
    dir: PathBuf,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl UrlCache {
    pub(crate) async fn open(dir: PathBuf, capacity: usize) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        })
    }

    fn entries(&self) -> Result<MutexGuard<'_, Entries>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Storage("URL cache lock poisoned".to_string()))
    }

    fn path_for(&self, key: &ContentKey) -> PathBuf {
        let digest = blake3::hash(key.as_str().as_bytes());
        self.dir.join(format!(
            "{}.{}",
            digest.to_hex(),
            extension_for(key.file_name())
        ))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().map(|entries| entries.by_key.len()).unwrap_or(0)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached URL for `key`, marking it most recently used.
    pub(crate) fn lookup(&self, key: &ContentKey) -> Result<Option<String>, AppError> {
        let mut entries = self.entries()?;
        let Some(url) = entries.by_key.get(key).map(|entry| entry.url.clone()) else {
            return Ok(None);
        };
        entries.touch(key);
        Ok(Some(url))
    }

    /// Write `bytes` to the render directory and cache the resulting URL.
    ///
    /// Least recently used handles beyond capacity are evicted and their
    /// files removed; the caller must stop handing out their URLs.
    pub(crate) async fn materialize(
        &self,
        key: &ContentKey,
        bytes: &[u8],
    ) -> Result<Materialized, AppError> {
        let path = self.path_for(key);
        tokio::fs::write(&path, bytes).await?;
        let url = file_url(&path);

        let (evicted, removed) = {
            let mut entries = self.entries()?;
            if let Some(existing) = entries.by_key.get(key) {
                let url = existing.url.clone();
                entries.touch(key);
                return Ok(Materialized {
                    url,
                    evicted: Vec::new(),
                });
            }
            entries.by_key.insert(
                key.clone(),
                RenderUrl {
                    url: url.clone(),
                    path,
                },
            );
            entries.order.push_back(key.clone());

            let mut evicted = Vec::new();
            let mut removed = Vec::new();
            while entries.order.len() > self.capacity {
                let Some(oldest) = entries.order.pop_front() else {
                    break;
                };
                if let Some(entry) = entries.by_key.remove(&oldest) {
                    tracing::debug!(key = %oldest, "evicting render url");
                    removed.push(entry.path);
                    evicted.push(oldest);
                }
            }
            (evicted, removed)
        };

        for path in removed {
            remove_materialized(&path).await;
        }
        Ok(Materialized { url, evicted })
    }

    pub(crate) async fn release(&self, key: &ContentKey) {
        let released = match self.entries() {
            Ok(mut entries) => {
                entries.order.retain(|cached| cached != key);
                entries.by_key.remove(key)
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to release render url");
                None
            }
        };
        if let Some(entry) = released {
            remove_materialized(&entry.path).await;
        }
    }

    pub(crate) async fn release_all(&self) {
        let released: Vec<RenderUrl> = match self.entries() {
            Ok(mut entries) => {
                entries.order.clear();
                entries.by_key.drain().map(|(_, entry)| entry).collect()
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to release render urls");
                Vec::new()
            }
        };
        for entry in released {
            remove_materialized(&entry.path).await;
        }
    }
}

impl Drop for UrlCache {
    fn drop(&mut self) {
        if let Ok(entries) = self.entries.get_mut() {
            for (_, entry) in entries.by_key.drain() {
                let _ = std::fs::remove_file(&entry.path);
            }
        }
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

async fn remove_materialized(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove render file");
        }
    }
}
