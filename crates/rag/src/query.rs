//! Query normalization and hashing.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A user question, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    raw: String,
    normalized: String,
    hash: String,
}

impl Query {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        let hash = hash_normalized(&normalized);
        Self {
            raw,
            normalized,
            hash,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Hex SHA-256 of the normalized text.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Lowercase, unify typographic punctuation, collapse whitespace and drop
/// trailing `?`, `!` and `.` runs.
pub fn normalize(text: &str) -> String {
    let unified: String = text
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2010}'..='\u{2015}' => '-',
            '\u{00A0}' => ' ',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();

    let collapsed = unified.split_whitespace().collect::<Vec<_>>().join(" ");

    collapsed
        .trim_end_matches(|c: char| matches!(c, '?' | '!' | '.') || c.is_whitespace())
        .to_string()
}

/// Stable identifier for a normalized query.
pub fn hash_normalized(normalized: &str) -> String {
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}
