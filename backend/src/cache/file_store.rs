use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::models::CacheEntry;
use super::{CacheStore, CacheStoreError};

/// One JSON document per fingerprint under a cache directory.
#[derive(Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheStoreError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CacheStoreError::InvalidData(format!(
                "cache key '{}' is not a hex digest",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let path = self.entry_path(key)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_str(&contents)?;
        if entry.key != key {
            return Err(CacheStoreError::InvalidData(format!(
                "{} holds entry for '{}'",
                path.display(),
                entry.key
            )));
        }
        Ok(Some(entry))
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheStoreError> {
        let path = self.entry_path(&entry.key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // Each writer gets its own temp file; only the rename is shared.
        let tmp_path = self
            .dir
            .join(format!("{}.{}.tmp", entry.key, Uuid::new_v4().simple()));
        let written = async {
            tokio::fs::write(&tmp_path, serde_json::to_vec(entry)?).await?;
            tokio::fs::rename(&tmp_path, &path).await?;
            Ok::<(), CacheStoreError>(())
        }
        .await;
        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
        written
    }
}
