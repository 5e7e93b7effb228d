//! In-process document store.
//!
//! Ranks documents twice (cosine similarity against the query embedding,
//! and query-term overlap) and fuses the two rankings by position with
//! weighted reciprocal rank fusion, so neither signal's raw scale matters.

use super::{DocumentStore, SearchRequest, SearchRow, RRF_K};
use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use taxguide_core::{AppError, AppResult};

const KEYWORD_STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "from", "this", "that", "have", "has",
    "what", "when", "how", "can", "does", "your", "you", "about", "which", "who", "why", "will",
];

/// One document as it appears in a seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedDocument {
    #[serde(default)]
    pub id: Option<String>,
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
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    id: String,
    seed: SeedDocument,
    embedding: Vec<f32>,
    terms: BTreeSet<String>,
}

pub struct InMemoryDocumentStore {
    documents: Vec<IndexedDocument>,
    provider: Arc<dyn EmbeddingProvider>,
}

fn keyword_terms(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !KEYWORD_STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

impl InMemoryDocumentStore {
    pub fn empty(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            documents: Vec::new(),
            provider,
        }
    }

    /// Embed and index `documents`.
    pub async fn from_documents(
        documents: Vec<SeedDocument>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = provider.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(AppError::Embedding(format!(
                "Expected {} document embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }

        let documents = documents
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (seed, embedding))| IndexedDocument {
                id: seed.id.clone().unwrap_or_else(|| format!("doc-{}", i + 1)),
                terms: keyword_terms(&seed.content),
                seed,
                embedding,
            })
            .collect::<Vec<_>>();

        tracing::info!("Indexed {} documents in memory", documents.len());
        Ok(Self {
            documents,
            provider,
        })
    }

    /// Load a JSON array of [`SeedDocument`]s.
    pub async fn from_seed_file(
        path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read seed file {:?}: {}", path, e))
        })?;
        let documents: Vec<SeedDocument> = serde_json::from_str(&contents)?;
        Self::from_documents(documents, provider).await
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    fn semantic_ranking(&self, request: &SearchRequest) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (i, cosine_similarity(&request.query_embedding, &doc.embedding)))
            .filter(|(_, sim)| *sim >= request.similarity_threshold)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
    }

    fn keyword_ranking(&self, request: &SearchRequest) -> Vec<(usize, f32)> {
        let query_terms = keyword_terms(&request.query_text);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .documents
            .iter()
            .enumerate()
            .filter_map(|(i, doc)| {
                let overlap = query_terms.intersection(&doc.terms).count();
                (overlap > 0).then(|| (i, overlap as f32 / query_terms.len() as f32))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
    }
}

#[derive(Default)]
struct Fused {
    score: f32,
    similarity: Option<f32>,
    keyword_score: Option<f32>,
    semantic_rank: Option<u32>,
    keyword_rank: Option<u32>,
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn store_name(&self) -> &str {
        "memory"
    }

    async fn hybrid_search(&self, request: &SearchRequest) -> AppResult<Vec<SearchRow>> {
        let mut fused: HashMap<usize, Fused> = HashMap::new();

        for (rank, (idx, sim)) in self.semantic_ranking(request).into_iter().enumerate() {
            let rank = rank as u32 + 1;
            let entry = fused.entry(idx).or_default();
            entry.score += request.semantic_weight / (RRF_K + rank as f32);
            entry.similarity = Some(sim);
            entry.semantic_rank = Some(rank);
        }

        for (rank, (idx, score)) in self.keyword_ranking(request).into_iter().enumerate() {
            let rank = rank as u32 + 1;
            let entry = fused.entry(idx).or_default();
            entry.score += request.keyword_weight / (RRF_K + rank as f32);
            entry.keyword_score = Some(score);
            entry.keyword_rank = Some(rank);
        }

        let mut ranked: Vec<(usize, Fused)> = fused.into_iter().collect();
        ranked.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        ranked.truncate(request.match_count);

        Ok(ranked
            .into_iter()
            .map(|(idx, f)| {
                let doc = &self.documents[idx];
                SearchRow {
                    id: doc.id.clone(),
                    content: doc.seed.content.clone(),
                    source: doc.seed.source.clone(),
                    title: doc.seed.title.clone(),
                    category: doc.seed.category.clone(),
                    source_url: doc.seed.source_url.clone(),
                    source_type: doc.seed.source_type.clone(),
                    similarity: f.similarity,
                    keyword_score: f.keyword_score,
                    combined_score: f.score,
                    semantic_rank: f.semantic_rank,
                    keyword_rank: f.keyword_rank,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::mock::MockProvider;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn seed(source: &str, content: &str) -> SeedDocument {
        SeedDocument {
            id: None,
            content: content.to_string(),
            source: source.to_string(),
            title: None,
            category: None,
            source_url: None,
            source_type: None,
        }
    }

    async fn store() -> InMemoryDocumentStore {
        InMemoryDocumentStore::from_documents(
            vec![
                seed("rrsp-guide", "Your RRSP deduction limit is 18% of earned income."),
                seed("tfsa-guide", "The TFSA contribution room for 2024 is $7,000."),
                seed("donations", "Charitable donation receipts must show the charity number."),
            ],
            Arc::new(MockProvider::new(128)),
        )
        .await
        .unwrap()
    }

    async fn request(store: &InMemoryDocumentStore, text: &str) -> SearchRequest {
        SearchRequest {
            query_text: text.to_string(),
            query_embedding: store.provider().embed(text).await.unwrap(),
            similarity_threshold: 0.0,
            match_count: 10,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
        }
    }

    #[tokio::test]
    async fn test_best_match_first() {
        let store = store().await;
        let rows = store
            .hybrid_search(&request(&store, "RRSP deduction limit").await)
            .await
            .unwrap();

        assert_eq!(rows[0].source, "rrsp-guide");
        assert_eq!(rows[0].keyword_rank, Some(1));
        assert!(rows.windows(2).all(|w| w[0].combined_score >= w[1].combined_score));
    }

    #[tokio::test]
    async fn test_top_fused_score_bounded_by_one_over_k_plus_one() {
        let store = store().await;
        let rows = store
            .hybrid_search(&request(&store, "TFSA contribution room").await)
            .await
            .unwrap();

        assert!(rows[0].combined_score <= 1.0 / (RRF_K + 1.0) + 1e-6);
    }

    #[tokio::test]
    async fn test_match_count_truncates() {
        let store = store().await;
        let mut req = request(&store, "RRSP TFSA donation").await;
        req.match_count = 1;
        assert_eq!(store.hybrid_search(&req).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_file_assigns_ids() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"[{"content":"Medical expenses over 3% of net income","source":"medical","title":"Medical expenses"}]"#,
        )
        .unwrap();

        let store =
            InMemoryDocumentStore::from_seed_file(file.path(), Arc::new(MockProvider::new(64)))
                .await
                .unwrap();
        assert_eq!(store.len(), 1);

        let rows = store
            .hybrid_search(&request(&store, "medical expenses").await)
            .await
            .unwrap();
        assert_eq!(rows[0].id, "doc-1");
        assert_eq!(rows[0].title.as_deref(), Some("Medical expenses"));
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = InMemoryDocumentStore::empty(Arc::new(MockProvider::new(16)));
        let rows = store
            .hybrid_search(&request(&store, "anything").await)
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(store.is_empty());
    }
}
