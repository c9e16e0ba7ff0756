//! In-memory [`KvStore`] implementation for tests and ephemeral sessions.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Nothing survives the process.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::store::{KvStore, Versioned};

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Versioned<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned<Value>>> {
        let docs = self.docs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(docs.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> StoreResult<u64> {
        let mut docs = self.docs.write().map_err(|_| StoreError::LockPoisoned)?;
        let version = docs.get(key).map(|v| v.version).unwrap_or(0) + 1;
        docs.insert(key.to_string(), Versioned { version, value });
        Ok(version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Value,
    ) -> StoreResult<u64> {
        let mut docs = self.docs.write().map_err(|_| StoreError::LockPoisoned)?;
        let found = docs.get(key).map(|v| v.version);
        if found != expected {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected,
                found,
            });
        }
        let version = found.unwrap_or(0) + 1;
        docs.insert(key.to_string(), Versioned { version, value });
        Ok(version)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut docs = self.docs.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(docs.remove(key).is_some())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let docs = self.docs.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut keys: Vec<String> = docs.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_bumps_version() {
        let store = MemoryStore::new();
        assert_eq!(store.put("a", json!(1)).await.unwrap(), 1);
        assert_eq!(store.put("a", json!(2)).await.unwrap(), 2);

        let doc = store.get("a").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.value, json!(2));
    }

    #[tokio::test]
    async fn cas_requires_absent_key_for_none() {
        let store = MemoryStore::new();
        assert_eq!(store.compare_and_swap("a", None, json!("x")).await.unwrap(), 1);

        let err = store
            .compare_and_swap("a", None, json!("y"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn cas_rejects_stale_version() {
        let store = MemoryStore::new();
        store.put("a", json!(1)).await.unwrap();
        store.put("a", json!(2)).await.unwrap();

        let err = store
            .compare_and_swap("a", Some(1), json!(3))
            .await
            .unwrap_err();
        match err {
            StoreError::VersionConflict {
                expected, found, ..
            } => {
                assert_eq!(expected, Some(1));
                assert_eq!(found, Some(2));
            }
            other => panic!("expected conflict, got {other}"),
        }

        assert_eq!(
            store.compare_and_swap("a", Some(2), json!(3)).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn delete_and_keys() {
        let store = MemoryStore::new();
        store.put("b", json!(null)).await.unwrap();
        store.put("a", json!(null)).await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.len(), 1);
    }
}
