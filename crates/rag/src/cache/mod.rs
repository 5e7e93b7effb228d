//! Embedding cache: normalized query text → vector.
//!
//! Lookups go through a [`CacheStore`]; misses are computed by the
//! embedding provider and written back in a detached task so the request
//! path never waits on, or fails because of, the cache.

pub mod memory;
pub mod metrics;
pub mod redis_store;

pub use memory::MemoryCacheStore;
pub use metrics::{CacheMetrics, CacheStats};
pub use redis_store::RedisCacheStore;

use crate::embeddings::EmbeddingProvider;
use crate::query::Query;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use taxguide_core::config::{CacheBackend, CacheSettings};
use taxguide_core::{AppError, AppResult};

/// Stored value for one cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub response: Option<String>,
    pub metadata: CacheEntryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryMetadata {
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn for_embedding(embedding: Vec<f32>, model: &str) -> Self {
        Self {
            embedding,
            response: None,
            metadata: CacheEntryMetadata {
                model: model.to_string(),
                created_at: Utc::now(),
            },
        }
    }
}

/// Key-value store with TTL semantics. Concurrent writers to the same key
/// may race; the last write wins.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    fn backend_name(&self) -> &str;

    async fn get(&self, key: &str) -> AppResult<Option<CacheEntry>>;

    async fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> AppResult<()>;
}

/// Build the configured cache store.
pub async fn create_store(settings: &CacheSettings) -> AppResult<Arc<dyn CacheStore>> {
    let ttl = Duration::from_secs(settings.ttl_secs);
    match settings.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCacheStore::new(settings.max_entries, ttl))),
        CacheBackend::Redis => {
            let url = settings.redis_url.as_deref().ok_or_else(|| {
                AppError::Config("cache.redisUrl is required for the redis backend".to_string())
            })?;
            Ok(Arc::new(RedisCacheStore::connect(url).await?))
        }
    }
}

pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn CacheStore>,
    metrics: Arc<CacheMetrics>,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn CacheStore>,
        metrics: Arc<CacheMetrics>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            metrics,
            ttl,
        }
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Key for `text`; identical for texts that normalize the same.
    pub fn cache_key(&self, text: &str) -> String {
        format!(
            "emb:{}:{}",
            self.provider.model_name(),
            Query::new(text).hash()
        )
    }

    /// Return the cached vector for `text`, computing and storing it on a miss.
    ///
    /// Store errors count as misses. Provider errors propagate.
    pub async fn get_or_compute(&self, text: &str) -> AppResult<Vec<f32>> {
        let key = self.cache_key(text);

        match self.store.get(&key).await {
            Ok(Some(entry)) if entry.embedding.len() == self.provider.dimensions() => {
                self.metrics.record_hit();
                tracing::debug!("Embedding cache hit ({})", self.store.backend_name());
                return Ok(entry.embedding);
            }
            Ok(Some(entry)) => {
                tracing::warn!(
                    "Ignoring cached embedding with {} dimensions, expected {}",
                    entry.embedding.len(),
                    self.provider.dimensions()
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Embedding cache read failed: {}", e);
            }
        }

        self.metrics.record_miss();
        let embedding = self.provider.embed(text).await?;

        self.spawn_write(key, embedding.clone());

        Ok(embedding)
    }

    fn spawn_write(&self, key: String, embedding: Vec<f32>) {
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let entry = CacheEntry::for_embedding(embedding, self.provider.model_name());
        let ttl = self.ttl;

        tokio::spawn(async move {
            if let Err(e) = store.put(&key, entry, ttl).await {
                metrics.record_write_failure();
                tracing::warn!("Embedding cache write failed: {}", e);
            }
        });
    }
}
