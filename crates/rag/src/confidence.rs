//! Multi-factor confidence scoring of a retrieved set.

use crate::types::{
    Classification, ConfidenceFactors, ConfidenceLevel, ConfidenceResult, ResponseMode,
    RetrievedChunk,
};
use std::collections::HashSet;

/// Best possible fused score: rank 1 in both lists, `1 / (60 + 1)`.
pub const RELEVANCE_NORMALIZER: f32 = 1.0 / 61.0;

pub const HIGH_THRESHOLD: f32 = 0.6;
pub const MEDIUM_THRESHOLD: f32 = 0.4;

const W_RELEVANCE: f32 = 0.40;
const W_CONSISTENCY: f32 = 0.25;
const W_CLARITY: f32 = 0.20;
const W_AUTHORITY: f32 = 0.15;

const W_SOURCE_OVERLAP: f32 = 0.4;
const W_PATH_OVERLAP: f32 = 0.4;
const W_FORM_CONSISTENCY: f32 = 0.2;

const NEUTRAL_FORM_CONSISTENCY: f32 = 0.5;
const DEFAULT_AUTHORITY: f32 = 0.7;

pub const WARN_NO_SOURCES: &str = "No relevant official sources were found for this question.";
pub const WARN_WEAK_MATCH: &str = "The best matching source is only a weak match for this question.";
pub const WARN_INCONSISTENT: &str = "The retrieved sources cover different topics and may not agree.";
pub const WARN_OFF_TOPIC: &str = "This question does not look like a tax question.";
pub const WARN_MEDIUM_DEFAULT: &str = "Some details could not be fully confirmed from official sources.";
pub const WARN_LOW_DEFAULT: &str = "The available sources may not fully answer this question.";

/// Source-name phrases and their authority, checked in order. Phrases
/// match on word boundaries.
const AUTHORITY_TABLE: &[(&str, f32)] = &[
    ("income tax act", 1.0),
    ("excise tax act", 1.0),
    ("folio", 0.95),
    ("interpretation bulletin", 0.9),
    ("information circular", 0.9),
    ("canada.ca", 0.85),
    ("form", 0.8),
    ("guide", 0.75),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, chunks: &[RetrievedChunk], classification: &Classification) -> ConfidenceResult {
        if chunks.is_empty() {
            return ConfidenceResult {
                score: 0.0,
                level: ConfidenceLevel::Low,
                mode: ResponseMode::GracefulFailure,
                factors: ConfidenceFactors::default(),
                warnings: vec![WARN_NO_SOURCES.to_string()],
            };
        }

        let mut warnings = Vec::new();

        let top_score = chunks.iter().map(|c| c.score).fold(f32::MIN, f32::max);
        let top_chunk_relevance = (top_score / RELEVANCE_NORMALIZER).clamp(0.0, 1.0);
        if top_chunk_relevance < 0.5 {
            warnings.push(WARN_WEAK_MATCH.to_string());
        }

        let chunk_consistency = chunk_consistency(chunks);
        if chunk_consistency < 0.4 {
            warnings.push(WARN_INCONSISTENT.to_string());
        }

        let query_clarity = classification.confidence.clamp(0.0, 1.0);
        if classification.skip_retrieval {
            warnings.push(WARN_OFF_TOPIC.to_string());
        }

        let source_authority =
            chunks.iter().map(authority).sum::<f32>() / chunks.len() as f32;

        let factors = ConfidenceFactors {
            top_chunk_relevance,
            chunk_consistency,
            query_clarity,
            source_authority,
        };

        let result = classify_score(combine(&factors), factors, warnings);

        tracing::debug!(
            "Confidence {:.3} ({:?}): relevance {:.2}, consistency {:.2}, clarity {:.2}, authority {:.2}",
            result.score,
            result.level,
            factors.top_chunk_relevance,
            factors.chunk_consistency,
            factors.query_clarity,
            factors.source_authority
        );

        result
    }
}

/// Weighted sum of the four factors.
pub fn combine(factors: &ConfidenceFactors) -> f32 {
    W_RELEVANCE * factors.top_chunk_relevance
        + W_CONSISTENCY * factors.chunk_consistency
        + W_CLARITY * factors.query_clarity
        + W_AUTHORITY * factors.source_authority
}

fn classify_score(score: f32, factors: ConfidenceFactors, mut warnings: Vec<String>) -> ConfidenceResult {
    let (level, mode) = if score >= HIGH_THRESHOLD {
        (ConfidenceLevel::High, ResponseMode::Standard)
    } else if score >= MEDIUM_THRESHOLD {
        if warnings.is_empty() {
            warnings.push(WARN_MEDIUM_DEFAULT.to_string());
        }
        (ConfidenceLevel::Medium, ResponseMode::Hedged)
    } else {
        if warnings.is_empty() {
            warnings.push(WARN_LOW_DEFAULT.to_string());
        }
        (ConfidenceLevel::Low, ResponseMode::GracefulFailure)
    };

    ConfidenceResult {
        score,
        level,
        mode,
        factors,
        warnings,
    }
}

fn chunk_consistency(chunks: &[RetrievedChunk]) -> f32 {
    let count = chunks.len() as f32;

    let distinct_sources: HashSet<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    let source_overlap = 1.0 - (distinct_sources.len() as f32 - 1.0) / count;

    let path_overlap = if chunks.len() < 2 {
        1.0
    } else {
        let shared = chunks
            .windows(2)
            .filter(|pair| match (pair[0].hierarchy_path.first(), pair[1].hierarchy_path.first()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            })
            .count();
        shared as f32 / (chunks.len() - 1) as f32
    };

    let total_mentions: usize = chunks.iter().map(|c| c.forms.len()).sum();
    let form_consistency = if total_mentions == 0 {
        NEUTRAL_FORM_CONSISTENCY
    } else {
        let unique: HashSet<&String> = chunks.iter().flat_map(|c| c.forms.iter()).collect();
        1.0 - unique.len() as f32 / total_mentions as f32
    };

    W_SOURCE_OVERLAP * source_overlap
        + W_PATH_OVERLAP * path_overlap
        + W_FORM_CONSISTENCY * form_consistency
}

fn authority(chunk: &RetrievedChunk) -> f32 {
    let name = format!(
        "{} {}",
        chunk.source.to_lowercase(),
        chunk.title.as_deref().unwrap_or_default().to_lowercase()
    );
    // Whole words only, so "form" does not hit "information"
    let words: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .map(|word| word.trim_matches('.'))
        .filter(|word| !word.is_empty())
        .collect();
    let padded = format!(" {} ", words.join(" "));

    AUTHORITY_TABLE
        .iter()
        .find(|(needle, _)| {
            padded.contains(&format!(" {needle} ")) || padded.contains(&format!(" {needle}s "))
        })
        .map(|(_, score)| *score)
        .unwrap_or(DEFAULT_AUTHORITY)
}
