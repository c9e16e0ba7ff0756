//! Day-bucketed content deduplication for exports.
//!
//! A dedupe key names "this passage from this page, to this notebook, on
//! this local calendar day". The index maps each key to the last time an
//! export carrying it was delivered; a key seen within the window is a hit.

use std::collections::BTreeMap;
use std::sync::Arc;

use capture_core::Clock;
use capture_core::identity::dedupe_key;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use capture_store::{DocumentStore, Mutation, keys};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineResult;

/// What a dedupe key is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupeInput {
    pub url: String,
    pub selected_text: String,
    pub notebook_ref: String,
    /// Falls back to "now" when absent.
    pub captured_at: Option<DateTime<Utc>>,
}

/// Durable `dedupeKey → last hit` index.
#[derive(Clone)]
pub struct DedupeIndex {
    docs: DocumentStore,
    clock: Arc<dyn Clock>,
    window: Duration,
    offset: FixedOffset,
}

type IndexDoc = BTreeMap<String, DateTime<Utc>>;

impl DedupeIndex {
    /// Creates an index with the given hit window and local-day offset.
    pub fn new(
        docs: DocumentStore,
        clock: Arc<dyn Clock>,
        window: Duration,
        offset: FixedOffset,
    ) -> Self {
        Self {
            docs,
            clock,
            window,
            offset,
        }
    }

    /// The default hit window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Builds the key for `input`, bucketing by local day.
    pub fn build_dedupe_key(&self, input: &DedupeInput) -> String {
        dedupe_key(
            &input.url,
            &input.selected_text,
            &input.notebook_ref,
            input.captured_at.unwrap_or_else(|| self.clock.now()),
            self.offset,
        )
    }

    /// True if `key` was hit within the default window.
    pub async fn is_dedupe_hit(&self, key: &str) -> EngineResult<bool> {
        self.is_dedupe_hit_within(key, self.window).await
    }

    /// True if `key` was hit less than `window` ago.
    pub async fn is_dedupe_hit_within(&self, key: &str, window: Duration) -> EngineResult<bool> {
        let index: IndexDoc = self.docs.load_or_default(keys::DEDUPE_INDEX).await?;
        let now = self.clock.now();
        Ok(index.get(key).is_some_and(|at| now - *at < window))
    }

    /// Records "now" as the last hit of `key`.
    ///
    /// Keys older than the window are dropped in the same write so the
    /// index does not grow without bound.
    pub async fn mark_dedupe_hit(&self, key: &str) -> EngineResult<()> {
        let now = self.clock.now();
        let window = self.window;
        let pruned = self
            .docs
            .update(keys::DEDUPE_INDEX, |index: &mut IndexDoc| {
                let before = index.len();
                index.retain(|_, at| now - *at < window);
                let pruned = before - index.len();
                index.insert(key.to_string(), now);
                Mutation::Write(pruned)
            })
            .await?;
        debug!(key, pruned, "Marked dedupe hit");
        Ok(())
    }

    /// Drops keys older than the window. Returns how many were dropped.
    pub async fn prune(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        let window = self.window;
        Ok(self
            .docs
            .update(keys::DEDUPE_INDEX, |index: &mut IndexDoc| {
                let before = index.len();
                index.retain(|_, at| now - *at < window);
                match before - index.len() {
                    0 => Mutation::Discard(0),
                    n => Mutation::Write(n),
                }
            })
            .await?)
    }
}

impl std::fmt::Debug for DedupeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupeIndex")
            .field("window", &self.window)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
