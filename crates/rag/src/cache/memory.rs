//! In-process cache store backed by moka.

use super::{CacheEntry, CacheStore};
use moka::sync::Cache;
use std::time::{Duration, Instant};
use taxguide_core::AppResult;

#[derive(Debug, Clone)]
struct Stored {
    entry: CacheEntry,
    expires_at: Instant,
}

/// Bounded in-memory store with per-entry TTL.
pub struct MemoryCacheStore {
    cache: Cache<String, Stored>,
}

impl MemoryCacheStore {
    /// `max_ttl` caps every entry's lifetime regardless of the TTL passed to `put`.
    pub fn new(max_entries: u64, max_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(max_ttl)
            .build();
        Self { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> AppResult<Option<CacheEntry>> {
        match self.cache.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => Ok(Some(stored.entry)),
            Some(_) => {
                self.cache.invalidate(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> AppResult<()> {
        let stored = Stored {
            entry,
            expires_at: Instant::now() + ttl,
        };
        self.cache.insert(key.to_string(), stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: f32) -> CacheEntry {
        CacheEntry::for_embedding(vec![v], "mock")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryCacheStore::new(100, Duration::from_secs(60));
        store.put("k", entry(1.0), Duration::from_secs(60)).await.unwrap();
        let got = store.get("k").await.unwrap().unwrap();
        assert_eq!(got.embedding, vec![1.0]);
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let store = MemoryCacheStore::new(100, Duration::from_secs(60));
        assert!(store.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let store = MemoryCacheStore::new(100, Duration::from_secs(60));
        store.put("k", entry(1.0), Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryCacheStore::new(100, Duration::from_secs(60));
        store.put("k", entry(1.0), Duration::from_secs(60)).await.unwrap();
        store.put("k", entry(2.0), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap().embedding, vec![2.0]);
        assert_eq!(store.entry_count(), 1);
    }
}
