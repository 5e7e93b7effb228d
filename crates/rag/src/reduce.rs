//! Redundancy reduction: maximal marginal relevance selection plus two
//! independent dedup passes.

use crate::types::RetrievedChunk;
use std::collections::{BTreeSet, HashMap, HashSet};

pub const DEFAULT_LAMBDA: f32 = 0.9;
pub const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.95;

/// Similarity assumed between chunks from the same document section.
pub const SAME_SECTION_SIMILARITY: f32 = 0.9;

/// Characters compared by [`remove_exact_duplicates`].
pub const SIGNATURE_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedundancyReducer {
    lambda: f32,
    duplicate_threshold: f32,
}

impl Default for RedundancyReducer {
    fn default() -> Self {
        Self::new(DEFAULT_LAMBDA, DEFAULT_DUPLICATE_THRESHOLD)
    }
}

impl RedundancyReducer {
    pub fn new(lambda: f32, duplicate_threshold: f32) -> Self {
        Self {
            lambda: lambda.clamp(0.0, 1.0),
            duplicate_threshold,
        }
    }

    /// Pick up to `target` chunks trading relevance against similarity to
    /// what is already picked.
    ///
    /// Relevance is each chunk's fused score divided by the best score in
    /// the input. When `target` covers the whole input it is returned as is.
    pub fn reduce(&self, chunks: &[RetrievedChunk], target: usize) -> Vec<RetrievedChunk> {
        if target >= chunks.len() {
            return chunks.to_vec();
        }
        if target == 0 {
            return Vec::new();
        }

        let max_score = chunks.iter().map(|c| c.score).fold(f32::MIN, f32::max);
        let relevance: Vec<f32> = chunks
            .iter()
            .map(|c| if max_score > 0.0 { c.score / max_score } else { c.score })
            .collect();
        let tokens: Vec<BTreeSet<String>> = chunks.iter().map(|c| token_set(&c.content)).collect();

        let Some(first) = (0..chunks.len()).max_by(|&a, &b| {
            relevance[a]
                .total_cmp(&relevance[b])
                .then(b.cmp(&a))
        }) else {
            return Vec::new();
        };

        let mut selected = vec![first];
        let mut remaining: Vec<usize> = (0..chunks.len()).filter(|&i| i != first).collect();

        while selected.len() < target && !remaining.is_empty() {
            let max_sim: Vec<(usize, f32)> = remaining
                .iter()
                .map(|&i| {
                    let sim = selected
                        .iter()
                        .map(|&s| pair_similarity(&chunks[i], &chunks[s], &tokens[i], &tokens[s]))
                        .fold(0.0, f32::max);
                    (i, sim)
                })
                .collect();

            // Near-duplicates are dropped before scoring
            remaining.retain(|i| {
                max_sim
                    .iter()
                    .find(|(j, _)| j == i)
                    .is_some_and(|(_, sim)| *sim <= self.duplicate_threshold)
            });

            let best = max_sim
                .iter()
                .filter(|(_, sim)| *sim <= self.duplicate_threshold)
                .map(|&(i, sim)| (i, self.lambda * relevance[i] - (1.0 - self.lambda) * sim))
                .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));

            let Some((pick, _)) = best else {
                break;
            };

            selected.push(pick);
            remaining.retain(|&i| i != pick);
        }

        tracing::debug!(
            "MMR kept {} of {} chunks (target {})",
            selected.len(),
            chunks.len(),
            target
        );

        selected.into_iter().map(|i| chunks[i].clone()).collect()
    }
}

fn token_set(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

fn same_section(a: &RetrievedChunk, b: &RetrievedChunk) -> bool {
    a.source == b.source
        && a.hierarchy_path.iter().take(2).eq(b.hierarchy_path.iter().take(2))
}

fn pair_similarity(
    a: &RetrievedChunk,
    b: &RetrievedChunk,
    a_tokens: &BTreeSet<String>,
    b_tokens: &BTreeSet<String>,
) -> f32 {
    let structural = if same_section(a, b) {
        SAME_SECTION_SIMILARITY
    } else {
        0.0
    };
    structural.max(jaccard(a_tokens, b_tokens))
}

/// Keep at most `max_per_source` chunks from each source, preserving order.
pub fn dedupe_by_source(chunks: &[RetrievedChunk], max_per_source: usize) -> Vec<RetrievedChunk> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    chunks
        .iter()
        .filter(|chunk| {
            let count = counts.entry(chunk.source.as_str()).or_insert(0);
            *count += 1;
            *count <= max_per_source
        })
        .cloned()
        .collect()
}

/// Drop chunks whose source and opening characters repeat an earlier chunk.
pub fn remove_exact_duplicates(chunks: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    chunks
        .iter()
        .filter(|chunk| {
            let prefix: String = chunk.content.chars().take(SIGNATURE_PREFIX_CHARS).collect();
            seen.insert((chunk.source.clone(), prefix))
        })
        .cloned()
        .collect()
}
