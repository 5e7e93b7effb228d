//! Hybrid retrieval: cached query embedding, fused store search, metadata
//! derivation and post-filters.

use crate::cache::EmbeddingCache;
use crate::forms::{extract_forms, extract_tax_year};
use crate::query::Query;
use crate::store::{DocumentStore, SearchRequest, SearchRow};
use crate::types::{Classification, RetrievalWeights, RetrievedChunk};
use chrono::Datelike;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use taxguide_core::{AppError, AppResult};

/// Candidates fetched per requested result when any filter is active.
pub const FILTER_HEADROOM: usize = 3;

/// Chunks shorter than this (after trimming) are dropped.
pub const MIN_CHUNK_CHARS: usize = 50;

const MIN_PROSE_WORDS: usize = 8;

static RE_METADATA_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:table\s+of\s+contents|contents|page\s+\d+(?:\s+of\s+\d+)?|date\s+modified|last\s+updated|copyright|©)\b",
    )
    .ok()
});

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub count: usize,
    pub form_filter: Option<String>,
    pub tax_year_filter: Option<i32>,
    pub category_filter: Option<String>,
    pub weights: RetrievalWeights,
}

impl SearchOptions {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            form_filter: None,
            tax_year_filter: None,
            category_filter: None,
            weights: RetrievalWeights::default(),
        }
    }

    /// Use the classifier's proposed weights.
    pub fn from_classification(count: usize, classification: &Classification) -> Self {
        Self {
            weights: classification.weights,
            ..Self::new(count)
        }
    }

    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.form_filter = Some(form.into());
        self
    }

    pub fn with_tax_year(mut self, year: i32) -> Self {
        self.tax_year_filter = Some(year);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_filter = Some(category.into());
        self
    }

    pub fn has_filters(&self) -> bool {
        self.form_filter.is_some()
            || self.tax_year_filter.is_some()
            || self.category_filter.is_some()
    }
}

pub struct HybridRetriever {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<EmbeddingCache>,
    similarity_threshold: f32,
    current_year: i32,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embeddings: Arc<EmbeddingCache>,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            store,
            embeddings,
            similarity_threshold,
            current_year: chrono::Local::now().year(),
        }
    }

    pub fn with_current_year(mut self, current_year: i32) -> Self {
        self.current_year = current_year;
        self
    }

    /// Fused, filtered chunks in rank order, at most `options.count`.
    ///
    /// Store and embedding failures are returned as errors; an empty result
    /// only ever means nothing matched.
    pub async fn search(
        &self,
        query: &Query,
        options: &SearchOptions,
    ) -> AppResult<Vec<RetrievedChunk>> {
        if options.count == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embeddings.get_or_compute(query.raw()).await?;

        let match_count = if options.has_filters() {
            options.count * FILTER_HEADROOM
        } else {
            options.count
        };

        let request = SearchRequest {
            query_text: query.raw().to_string(),
            query_embedding,
            similarity_threshold: self.similarity_threshold,
            match_count,
            semantic_weight: options.weights.semantic,
            keyword_weight: options.weights.keyword,
        };

        let rows = self.store.hybrid_search(&request).await.map_err(|e| match e {
            AppError::Retrieval(_) | AppError::Embedding(_) => e,
            other => AppError::Retrieval(other.to_string()),
        })?;
        let fetched = rows.len();

        let chunks: Vec<RetrievedChunk> = rows
            .into_iter()
            .filter(|row| matches_category(row, options.category_filter.as_deref()))
            .map(|row| self.to_chunk(row))
            .filter(|chunk| matches_form(chunk, options.form_filter.as_deref()))
            .filter(|chunk| matches_year(chunk, options.tax_year_filter))
            .filter(|chunk| looks_like_prose(&chunk.content))
            .take(options.count)
            .collect();

        tracing::debug!(
            "Retrieved {} chunks ({} fetched from {} store)",
            chunks.len(),
            fetched,
            self.store.store_name()
        );

        Ok(chunks)
    }

    fn to_chunk(&self, row: SearchRow) -> RetrievedChunk {
        let forms = extract_forms(&row.content);
        let tax_year = extract_tax_year(&row.content, self.current_year);
        let hierarchy_path = hierarchy_path(&row);

        RetrievedChunk {
            id: row.id,
            content: row.content,
            source: row.source,
            title: row.title,
            source_url: row.source_url,
            source_type: row.source_type,
            hierarchy_path,
            forms,
            tax_year,
            score: row.combined_score,
            similarity: row.similarity,
            semantic_rank: row.semantic_rank,
            keyword_rank: row.keyword_rank,
        }
    }
}

/// Title, then category, then source; blanks and repeats skipped.
fn hierarchy_path(row: &SearchRow) -> Vec<String> {
    let mut path: Vec<String> = Vec::new();
    for label in [row.title.as_deref(), row.category.as_deref(), Some(row.source.as_str())]
        .into_iter()
        .flatten()
    {
        let label = label.trim();
        if !label.is_empty() && !path.iter().any(|p| p.eq_ignore_ascii_case(label)) {
            path.push(label.to_string());
        }
    }
    path
}

fn matches_category(row: &SearchRow, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(filter) => row
            .category
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(filter)),
    }
}

fn matches_form(chunk: &RetrievedChunk, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    chunk.forms.iter().any(|f| f.eq_ignore_ascii_case(filter))
        || chunk.content.contains(filter)
}

fn matches_year(chunk: &RetrievedChunk, filter: Option<i32>) -> bool {
    match (filter, chunk.tax_year) {
        (Some(wanted), Some(year)) => wanted == year,
        _ => true,
    }
}

/// Rejects fragments, headers and page furniture.
pub fn looks_like_prose(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.chars().count() < MIN_CHUNK_CHARS {
        return false;
    }

    if RE_METADATA_LINE
        .as_ref()
        .is_some_and(|re| re.is_match(trimmed))
    {
        return false;
    }

    if trimmed.split_whitespace().count() < MIN_PROSE_WORDS {
        return false;
    }

    let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    let upper = trimmed.chars().filter(|c| c.is_uppercase()).count();
    letters > 0 && (upper as f32 / letters as f32) < 0.6
}
