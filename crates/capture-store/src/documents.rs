//! Typed document access over a [`KvStore`].
//!
//! [`DocumentStore`] (de)serializes documents and provides
//! [`update`](DocumentStore::update), an optimistic read-modify-write loop:
//! read the document and its version, apply a closure, then write only if
//! the version is unchanged. On conflict the closure is re-run against the
//! fresh document, up to [`MAX_CAS_ATTEMPTS`] times.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};
use crate::store::KvStore;

/// Attempts before an `update` gives up and returns the conflict.
pub const MAX_CAS_ATTEMPTS: usize = 5;

/// Stable document keys used by the capture router.
pub mod keys {
    /// Learned topic → notebook mappings (list).
    pub const REGISTRY: &str = "nlm.registry";
    /// The single pending topic.
    pub const PENDING_TOPIC: &str = "nlm.pending_topic";
    /// Export jobs (list).
    pub const EXPORT_QUEUE: &str = "nlm.export_queue";
    /// dedupeKey → last hit timestamp (map).
    pub const DEDUPE_INDEX: &str = "nlm.dedupe_index";
    /// topicKey → engagement ledger (map).
    pub const IDEA_STATS: &str = "idea.stats";
    /// Idea suggestions (list).
    pub const IDEA_SUGGESTIONS: &str = "idea.suggestions";
    /// topicKey → cooldown (map).
    pub const IDEA_COOLDOWNS: &str = "idea.cooldowns";
}

/// What an update closure decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<R> {
    /// Persist the modified document.
    Write(R),
    /// Leave the stored document untouched.
    Discard(R),
}

impl<R> Mutation<R> {
    pub fn into_inner(self) -> R {
        match self {
            Self::Write(r) | Self::Discard(r) => r,
        }
    }
}

/// Typed, cloneable handle over a shared [`KvStore`].
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<dyn KvStore>,
}

impl DocumentStore {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self { inner }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn KvStore> {
        &self.inner
    }

    /// Load a document, `None` if absent.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.inner.get(key).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc.value)?)),
            None => Ok(None),
        }
    }

    /// Load a document, falling back to `T::default()` if absent.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> StoreResult<T> {
        Ok(self.load(key).await?.unwrap_or_default())
    }

    /// Write a document unconditionally.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.inner.put(key, serde_json::to_value(value)?).await?;
        Ok(())
    }

    /// Remove a document. Returns true if it existed.
    pub async fn remove(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    /// Optimistically read, modify and write a document.
    ///
    /// The closure receives the current document (or `T::default()` when
    /// absent) and may be invoked more than once.
    pub async fn update<T, R, F>(&self, key: &str, mut f: F) -> StoreResult<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut(&mut T) -> Mutation<R>,
    {
        let mut last_conflict = None;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (expected, mut doc) = match self.inner.get(key).await? {
                Some(v) => (Some(v.version), serde_json::from_value::<T>(v.value)?),
                None => (None, T::default()),
            };

            let result = match f(&mut doc) {
                Mutation::Discard(r) => return Ok(r),
                Mutation::Write(r) => r,
            };

            match self
                .inner
                .compare_and_swap(key, expected, serde_json::to_value(&doc)?)
                .await
            {
                Ok(_) => return Ok(result),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(key, attempt, "Document changed underneath update, retrying");
                    last_conflict = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(key, "Giving up on update after {} conflicts", MAX_CAS_ATTEMPTS);
        Err(last_conflict.unwrap_or_else(|| StoreError::VersionConflict {
            key: key.to_string(),
            expected: None,
            found: None,
        }))
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::Versioned;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn docs() -> DocumentStore {
        DocumentStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn load_absent_is_none() {
        let store = docs();
        let value: Option<Vec<String>> = store.load("missing").await.unwrap();
        assert!(value.is_none());
        let value: Vec<String> = store.load_or_default("missing").await.unwrap();
        assert!(value.is_empty());
    }

    #[tokio::test]
    async fn update_writes_and_returns() {
        let store = docs();
        let len = store
            .update("list", |list: &mut Vec<u32>| {
                list.push(7);
                Mutation::Write(list.len())
            })
            .await
            .unwrap();
        assert_eq!(len, 1);

        let stored: Vec<u32> = store.load_or_default("list").await.unwrap();
        assert_eq!(stored, vec![7]);
    }

    #[tokio::test]
    async fn discard_leaves_document_alone() {
        let store = docs();
        store.save("list", &vec![1u32]).await.unwrap();

        let seen = store
            .update("list", |list: &mut Vec<u32>| {
                list.clear();
                Mutation::Discard(list.len())
            })
            .await
            .unwrap();
        assert_eq!(seen, 0);

        let stored: Vec<u32> = store.load_or_default("list").await.unwrap();
        assert_eq!(stored, vec![1]);
    }

    /// Store whose first CAS always loses a race to a concurrent writer.
    struct RacingStore {
        inner: MemoryStore,
        races: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for RacingStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Versioned<Value>>> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, value: Value) -> StoreResult<u64> {
            self.inner.put(key, value).await
        }
        async fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<u64>,
            value: Value,
        ) -> StoreResult<u64> {
            let lost_race = self
                .races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost_race {
                self.inner.put(key, serde_json::json!([100])).await?;
            }
            self.inner.compare_and_swap(key, expected, value).await
        }
        async fn delete(&self, key: &str) -> StoreResult<bool> {
            self.inner.delete(key).await
        }
        async fn keys(&self) -> StoreResult<Vec<String>> {
            self.inner.keys().await
        }
    }

    #[tokio::test]
    async fn update_retries_on_conflict_and_sees_fresh_value() {
        let store = DocumentStore::new(Arc::new(RacingStore {
            inner: MemoryStore::new(),
            races: AtomicUsize::new(1),
        }));

        let mut calls = 0;
        store
            .update("list", |list: &mut Vec<u32>| {
                calls += 1;
                list.push(1);
                Mutation::Write(())
            })
            .await
            .unwrap();

        assert_eq!(calls, 2);
        let stored: Vec<u32> = store.load_or_default("list").await.unwrap();
        assert_eq!(stored, vec![100, 1]);
    }

    #[tokio::test]
    async fn update_gives_up_after_budget() {
        let store = DocumentStore::new(Arc::new(RacingStore {
            inner: MemoryStore::new(),
            races: AtomicUsize::new(MAX_CAS_ATTEMPTS),
        }));

        let err = store
            .update("list", |list: &mut Vec<u32>| {
                list.push(1);
                Mutation::Write(())
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
