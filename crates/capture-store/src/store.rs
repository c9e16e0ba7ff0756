//! The key-value store contract.
//!
//! The capture router treats the store as its only source of durable truth.
//! Values are JSON documents keyed by string; every key carries a version
//! number that increases on each write so read-modify-write cycles can be
//! made optimistic via [`KvStore::compare_and_swap`].

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Starts at 1 for the first write of a key.
    pub version: u64,
    pub value: T,
}

/// Abstract async key-value backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KvStore::get) | Read a document and its version |
/// | [`put`](KvStore::put) | Unconditional write |
/// | [`compare_and_swap`](KvStore::compare_and_swap) | Write only if the version is unchanged |
/// | [`delete`](KvStore::delete) | Remove a key |
/// | [`keys`](KvStore::keys) | List stored keys |
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a document.
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned<Value>>>;

    /// Write a document unconditionally. Returns the new version.
    async fn put(&self, key: &str, value: Value) -> StoreResult<u64>;

    /// Write a document only if its current version equals `expected`
    /// (`None` means the key must not exist yet).
    ///
    /// Returns the new version, or `StoreError::VersionConflict`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Value,
    ) -> StoreResult<u64>;

    /// Remove a key. Returns true if it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// List all stored keys, sorted.
    async fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Configuration for the on-disk store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one JSON file per key.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./capture-data"),
        }
    }
}

impl StoreConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `CAPTURE_DATA_DIR` - Optional, defaults to `./capture-data`
    pub fn from_env() -> Self {
        let data_dir = std::env::var("CAPTURE_DATA_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::default().data_dir);

        Self { data_dir }
    }
}
