//! Document stores answering hybrid (semantic + keyword) search.

pub mod memory;
pub mod rpc;

pub use memory::{InMemoryDocumentStore, SeedDocument};
pub use rpc::RpcDocumentStore;

use crate::embeddings::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taxguide_core::config::{AppConfig, StoreKind, StoreSettings};
use taxguide_core::{AppError, AppResult};

/// Smoothing constant of reciprocal rank fusion.
pub const RRF_K: f32 = 60.0;

/// Arguments of one hybrid search call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query_text: String,
    pub query_embedding: Vec<f32>,
    pub similarity_threshold: f32,
    pub match_count: usize,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
}

/// One ranked row. Rows come back best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    pub id: String,
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub similarity: Option<f32>,
    #[serde(default)]
    pub keyword_score: Option<f32>,
    pub combined_score: f32,
    #[serde(default)]
    pub semantic_rank: Option<u32>,
    #[serde(default)]
    pub keyword_rank: Option<u32>,
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    fn store_name(&self) -> &str;

    /// Errors are retrieval failures, never an empty result.
    async fn hybrid_search(&self, request: &SearchRequest) -> AppResult<Vec<SearchRow>>;
}

/// Build the configured document store.
///
/// The in-memory store embeds its seed documents with `provider` at startup.
pub async fn create_store(
    settings: &StoreSettings,
    provider: Arc<dyn EmbeddingProvider>,
) -> AppResult<Arc<dyn DocumentStore>> {
    match settings.kind {
        StoreKind::Memory => {
            let store = match &settings.seed_file {
                Some(path) => InMemoryDocumentStore::from_seed_file(path, provider).await?,
                None => {
                    tracing::warn!("No store.seedFile configured; the in-memory store is empty");
                    InMemoryDocumentStore::empty(provider)
                }
            };
            Ok(Arc::new(store))
        }
        StoreKind::Rpc => {
            let endpoint = settings.endpoint.clone().ok_or_else(|| {
                AppError::Config("store.endpoint is required for the rpc store".to_string())
            })?;
            let api_key = AppConfig::resolve_secret(settings.api_key_env.as_deref());
            Ok(Arc::new(RpcDocumentStore::new(
                endpoint,
                settings.function.clone(),
                api_key,
            )?))
        }
    }
}
