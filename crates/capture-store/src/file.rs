//! JSON-file-per-key [`KvStore`] implementation.
//!
//! Each key is stored as `<data_dir>/<sanitized key>.json` holding
//! `{"key": ..., "version": ..., "value": ...}`. Writes go to a temporary
//! file first and are renamed into place, so a crash never leaves a
//! half-written document. Writers inside one process are serialized by a
//! mutex; writers in other processes race with last-write-wins semantics.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::store::{KvStore, StoreConfig, Versioned};

const FILE_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    key: String,
    version: u64,
    value: Value,
}

/// Directory-backed document store.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!(path = %root.display(), "Opened JSON file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the store described by `config`.
    pub async fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Self::open(&config.data_dir).await
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", sanitize_key(key), FILE_EXTENSION))
    }

    async fn read_document(&self, key: &str) -> StoreResult<Option<StoredDocument>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, doc: &StoredDocument) -> StoreResult<()> {
        let path = self.path_for(&doc.key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::trace!(key = %doc.key, version = doc.version, "Wrote document");
        Ok(())
    }
}

/// Maps a key onto a safe file stem.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned<Value>>> {
        Ok(self.read_document(key).await?.map(|doc| Versioned {
            version: doc.version,
            value: doc.value,
        }))
    }

    async fn put(&self, key: &str, value: Value) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;
        let version = self
            .read_document(key)
            .await?
            .map(|d| d.version)
            .unwrap_or(0)
            + 1;
        self.write_document(&StoredDocument {
            key: key.to_string(),
            version,
            value,
        })
        .await?;
        Ok(version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Value,
    ) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;
        let found = self.read_document(key).await?.map(|d| d.version);
        if found != expected {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected,
                found,
            });
        }
        let version = found.unwrap_or(0) + 1;
        self.write_document(&StoredDocument {
            key: key.to_string(),
            version,
            value,
        })
        .await?;
        Ok(version)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<StoredDocument>(&bytes) {
                Ok(doc) => keys.push(doc.key),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_key("nlm.registry"), "nlm.registry");
        assert_eq!(sanitize_key("idea/stats:x"), "idea_stats_x");
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.put("nlm.registry", json!([1, 2, 3])).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let doc = store.get("nlm.registry").await.unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.value, json!([1, 2, 3]));
        assert_eq!(store.keys().await.unwrap(), vec!["nlm.registry"]);
    }

    #[tokio::test]
    async fn cas_conflict_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let v1 = store.compare_and_swap("k", None, json!("a")).await.unwrap();
        assert_eq!(v1, 1);
        assert!(
            store
                .compare_and_swap("k", None, json!("b"))
                .await
                .unwrap_err()
                .is_conflict()
        );
        assert_eq!(store.compare_and_swap("k", Some(1), json!("b")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_key_reads_none_and_deletes_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        assert!(store.get("absent").await.unwrap().is_none());
        assert!(!store.delete("absent").await.unwrap());
    }
}
