use super::support::grounded_chunk;
use crate::cache::{CacheMetrics, EmbeddingCache, MemoryCacheStore};
use crate::classify::QueryClassifier;
use crate::confidence::ConfidenceScorer;
use crate::embeddings::providers::mock::MockProvider;
use crate::pii::{redact, valid_sin, PiiType};
use crate::reduce::{dedupe_by_source, remove_exact_duplicates, RedundancyReducer};
use crate::types::{Classification, QueryType, RetrievalWeights, RetrievedChunk};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const SOURCES: &[&str] = &["folio", "guide", "canada.ca", "circular"];

const WORDS: &[&str] = &[
    "rrsp", "deduction", "limit", "earned", "income", "return", "deadline", "april", "medical",
    "expenses", "spouse", "credit", "balance", "owing", "self-employed", "tuition",
];

fn arb_chunk() -> impl Strategy<Value = RetrievedChunk> {
    (
        0..SOURCES.len(),
        prop::collection::vec(0..WORDS.len(), 3..12),
        0.0f32..1.0,
    )
        .prop_map(|(source, words, similarity)| {
            let content = words.iter().map(|w| WORDS[*w]).collect::<Vec<_>>().join(" ");
            grounded_chunk(SOURCES[source], &content, similarity)
        })
}

fn arb_chunks() -> impl Strategy<Value = Vec<RetrievedChunk>> {
    prop::collection::vec(arb_chunk(), 1..10)
}

fn classification(confidence: f32) -> Classification {
    Classification {
        query_type: QueryType::General,
        confidence,
        forms: BTreeSet::new(),
        years: BTreeSet::new(),
        weights: RetrievalWeights::default(),
        skip_retrieval: false,
    }
}

fn cache() -> EmbeddingCache {
    EmbeddingCache::new(
        Arc::new(MockProvider::new(16)),
        Arc::new(MemoryCacheStore::new(10, Duration::from_secs(60))),
        Arc::new(CacheMetrics::new()),
        Duration::from_secs(60),
    )
}

proptest! {
    #[test]
    fn prop_sin_redacted_only_when_checksum_valid(a in 0u32..1000, b in 0u32..1000, c in 0u32..1000) {
        let sin = format!("{:03} {:03} {:03}", a, b, c);
        let redaction = redact(&format!("my number is {} thanks", sin));

        let redacted = redaction.detected_types.contains(&PiiType::Sin);
        prop_assert_eq!(redacted, valid_sin(&sin));
        prop_assert_eq!(redaction.text.contains(&sin), !redacted);
    }

    #[test]
    fn prop_cache_key_ignores_case_spacing_and_trailing_punctuation(
        words in prop::collection::vec("[a-z]{1,8}", 1..6),
    ) {
        let cache = cache();
        let plain = words.join(" ");
        let noisy = format!("  {}  ?!", words.join("   ").to_uppercase());
        prop_assert_eq!(cache.cache_key(&plain), cache.cache_key(&noisy));
    }

    #[test]
    fn prop_mmr_never_exceeds_target(chunks in arb_chunks(), target in 0usize..12) {
        let reduced = RedundancyReducer::default().reduce(&chunks, target);
        prop_assert!(reduced.len() <= target.min(chunks.len()));
        if target >= chunks.len() {
            prop_assert_eq!(reduced, chunks);
        }
    }

    #[test]
    fn prop_mmr_selects_from_input(chunks in arb_chunks(), target in 1usize..12) {
        let reduced = RedundancyReducer::new(0.5, 0.95).reduce(&chunks, target);
        prop_assert!(!reduced.is_empty());
        for chunk in &reduced {
            prop_assert!(chunks.contains(chunk));
        }
    }

    #[test]
    fn prop_dedup_passes_are_idempotent(chunks in arb_chunks(), max in 1usize..4) {
        let once = dedupe_by_source(&chunks, max);
        prop_assert_eq!(dedupe_by_source(&once, max), once.clone());

        let exact = remove_exact_duplicates(&chunks);
        prop_assert_eq!(remove_exact_duplicates(&exact), exact);
    }

    #[test]
    fn prop_confidence_monotone_in_top_score(chunks in arb_chunks(), boost in 1.0f32..3.0) {
        let scorer = ConfidenceScorer::new();
        let c = classification(0.7);

        let mut boosted = chunks.clone();
        let top = boosted
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.score.total_cmp(&b.1.score))
            .map(|(i, _)| i)
            .unwrap_or(0);
        boosted[top].score *= boost;

        prop_assert!(scorer.score(&boosted, &c).score >= scorer.score(&chunks, &c).score);
    }

    #[test]
    fn prop_confidence_monotone_in_clarity(chunks in arb_chunks(), low in 0.0f32..1.0, delta in 0.0f32..1.0) {
        let scorer = ConfidenceScorer::new();
        let high = (low + delta).min(1.0);
        prop_assert!(
            scorer.score(&chunks, &classification(high)).score
                >= scorer.score(&chunks, &classification(low)).score
        );
    }

    #[test]
    fn prop_skip_patterns_are_deterministic(greeting in prop::sample::select(vec!["hi", "hello", "thanks!", "ok", "Thank you so much"])) {
        let classifier = QueryClassifier::with_current_year(2025);
        let first = classifier.classify(greeting);
        prop_assert!(first.skip_retrieval);
        prop_assert_eq!(first.weights, RetrievalWeights::default());
        prop_assert_eq!(first, classifier.classify(greeting));
    }
}

#[test]
fn test_hello_skips_retrieval() {
    assert!(QueryClassifier::new().classify("hello").skip_retrieval);
}
