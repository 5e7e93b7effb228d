//! How sure an answer is, and the disclaimer that goes with it.
//!
//! Two scorers exist. The multi-factor [`ConfidenceScorer`] result is used
//! whenever the pipeline produced one; the similarity-bucket heuristic here
//! is the fallback when it did not. Their thresholds are independent.
//!
//! [`ConfidenceScorer`]: crate::confidence::ConfidenceScorer

use crate::types::{ConfidenceLevel, ConfidenceResult, ResponseMode, RetrievedChunk};

/// Similarity a chunk needs to count as a good match in the fallback.
pub const GOOD_MATCH_SIMILARITY: f32 = 0.50;

const FALLBACK_HIGH_TOP: f32 = 0.70;
const FALLBACK_HIGH_AVERAGE: f32 = 0.55;
const FALLBACK_HIGH_COUNT: usize = 2;

pub const STANDARD_DISCLAIMER: &str =
    "This is general information drawn from official CRA publications, not professional tax advice.";

const VERIFY_CURRENCY: &str =
    "Tax rules and amounts change often, so verify that this information is current for your tax year.";

const COMPLEX_SITUATION: &str = "Your situation may be complex and the available information is limited. \
     We strongly recommend speaking with a qualified tax professional.";

pub fn disclaimer_for(level: ConfidenceLevel) -> String {
    match level {
        ConfidenceLevel::High => STANDARD_DISCLAIMER.to_string(),
        ConfidenceLevel::Medium => format!("{} {}", STANDARD_DISCLAIMER, VERIFY_CURRENCY),
        ConfidenceLevel::Low => format!("{} {}", COMPLEX_SITUATION, STANDARD_DISCLAIMER),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub level: ConfidenceLevel,
    /// Only the multi-factor scorer produces a score
    pub score: Option<f32>,
    pub mode: ResponseMode,
    pub disclaimer: String,
    pub warnings: Vec<String>,
}

impl Assessment {
    pub fn from_confidence(result: &ConfidenceResult) -> Self {
        Self {
            level: result.level,
            score: Some(result.score),
            mode: result.mode,
            disclaimer: disclaimer_for(result.level),
            warnings: result.warnings.clone(),
        }
    }

    /// Bucket by top similarity, average similarity and good-match count.
    ///
    /// Only picks the disclaimer; the answer text is not wrapped.
    pub fn fallback(chunks: &[RetrievedChunk]) -> Self {
        let similarities: Vec<f32> = chunks.iter().map(|c| c.similarity.unwrap_or(0.0)).collect();
        let top = similarities.iter().copied().fold(0.0, f32::max);
        let average = if similarities.is_empty() {
            0.0
        } else {
            similarities.iter().sum::<f32>() / similarities.len() as f32
        };
        let good = similarities
            .iter()
            .filter(|s| **s >= GOOD_MATCH_SIMILARITY)
            .count();

        let level = if top >= FALLBACK_HIGH_TOP
            && average >= FALLBACK_HIGH_AVERAGE
            && good >= FALLBACK_HIGH_COUNT
        {
            ConfidenceLevel::High
        } else if top >= GOOD_MATCH_SIMILARITY {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };

        Self {
            level,
            score: None,
            mode: ResponseMode::Standard,
            disclaimer: disclaimer_for(level),
            warnings: Vec::new(),
        }
    }

    pub fn for_input(confidence: Option<&ConfidenceResult>, chunks: &[RetrievedChunk]) -> Self {
        match confidence {
            Some(result) => Self::from_confidence(result),
            None => Self::fallback(chunks),
        }
    }
}
