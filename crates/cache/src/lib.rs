//! Two-tier prompt cache.
//!
//! Tier one is a bounded in-memory LRU map, tier two a small SQLite table
//! with debounced batch writes and oldest-first eviction. Lookups check
//! memory, then the store (backfilling memory on a hit). Writes go through
//! both tiers, except for values the engine must never serve again: blank
//! strings and the literal `"UNICODE"` marker an undecoded metadata tag
//! leaves behind.
//!
//! The database is disposable. Deleting it only costs re-extraction.

mod db;
pub mod error;
mod memory;
mod store;

pub use crate::db::Database;
pub use crate::memory::{MEMORY_CAPACITY, MemoryCache};
pub use crate::store::{PromptStore, STORE_CAPACITY, WRITE_DEBOUNCE};

use crate::error::Result;
use std::path::Path;
use tracing::instrument;

/// The two-tier cache handle shared by all extraction tasks.
#[derive(Debug)]
pub struct PromptCache {
    memory: MemoryCache,
    store: PromptStore,
    db: Database,
}

impl PromptCache {
    /// Open (or create) the cache database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::over(Database::connect(path).await?))
    }

    /// A cache whose persistent tier lives in memory; for tests and
    /// one-shot runs that shouldn't leave a database behind.
    pub async fn ephemeral() -> Result<Self> {
        Ok(Self::over(Database::connect_in_memory().await?))
    }

    fn over(db: Database) -> Self {
        Self { memory: MemoryCache::default(), store: PromptStore::new(db.pool().clone()), db }
    }

    /// Look up a prompt: memory first, then the store with memory backfill.
    #[instrument(skip(self))]
    pub async fn get(&self, locator: &str) -> Result<Option<String>> {
        if let Some(hit) = self.memory.get(locator) {
            return Ok(Some(hit));
        }
        let Some(hit) = self.store.get(locator).await? else {
            return Ok(None);
        };
        self.memory.put(locator, &hit);
        Ok(Some(hit))
    }

    /// Write a prompt through both tiers. Blank values and the bare
    /// `"UNICODE"` marker are rejected rather than cached.
    pub fn put(&self, locator: &str, prompt: &str) {
        let trimmed = prompt.trim();
        if trimmed.is_empty() || trimmed == "UNICODE" {
            return;
        }
        self.memory.put(locator, prompt);
        self.store.put(locator, prompt);
    }

    /// Land buffered store writes now.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    /// Flush and close the database; the teardown path.
    pub async fn close(&self) -> Result<()> {
        self.flush().await?;
        self.db.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = PromptCache::ephemeral().await.unwrap();
        cache.put("url", "a prompt");
        assert_eq!(cache.get("url").await.unwrap().as_deref(), Some("a prompt"));
    }

    #[tokio::test]
    async fn test_store_hit_backfills_memory() {
        let cache = PromptCache::ephemeral().await.unwrap();
        cache.store.put("k", "persisted");
        cache.flush().await.unwrap();
        assert!(cache.memory.is_empty());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("persisted"));
        assert_eq!(cache.memory.len(), 1);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("UNICODE")]
    #[case("  UNICODE ")]
    #[tokio::test]
    async fn test_rejected_values_are_not_cached(#[case] value: &str) {
        let cache = PromptCache::ephemeral().await.unwrap();
        cache.put("k", value);
        cache.flush().await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_flushes() {
        let cache = PromptCache::ephemeral().await.unwrap();
        cache.put("k", "v");
        cache.close().await.unwrap();
    }
}
