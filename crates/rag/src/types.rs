//! Data types shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Intent of a question, used to pick retrieval weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    FormLookup,
    Calculation,
    Deadline,
    Eligibility,
    Definition,
    Procedure,
    Comparison,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::FormLookup => "FORM_LOOKUP",
            QueryType::Calculation => "CALCULATION",
            QueryType::Deadline => "DEADLINE",
            QueryType::Eligibility => "ELIGIBILITY",
            QueryType::Definition => "DEFINITION",
            QueryType::Procedure => "PROCEDURE",
            QueryType::Comparison => "COMPARISON",
            QueryType::General => "GENERAL",
        }
    }
}

/// Relative weight of the semantic and keyword signals. Always sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalWeights {
    pub semantic: f32,
    pub keyword: f32,
}

impl RetrievalWeights {
    pub const fn new(semantic: f32) -> Self {
        Self {
            semantic,
            keyword: 1.0 - semantic,
        }
    }
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self::new(0.6)
    }
}

/// Output of the query classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub query_type: QueryType,
    pub confidence: f32,
    pub forms: BTreeSet<String>,
    pub years: BTreeSet<i32>,
    pub weights: RetrievalWeights,
    pub skip_retrieval: bool,
}

/// One passage returned by hybrid retrieval.
///
/// Produced fresh per query; later stages only filter and reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    /// Originating document identifier
    pub source: String,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub source_type: Option<String>,
    /// Section labels, outermost first
    pub hierarchy_path: Vec<String>,
    pub forms: BTreeSet<String>,
    pub tax_year: Option<i32>,
    /// Fused rank score
    pub score: f32,
    /// Raw semantic similarity, when the store reports it
    pub similarity: Option<f32>,
    pub semantic_rank: Option<u32>,
    pub keyword_rank: Option<u32>,
}

impl RetrievedChunk {
    /// Title if known, otherwise the source identifier.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.source)
    }

    /// Innermost section label, falling back to the title.
    pub fn section_label(&self) -> &str {
        self.hierarchy_path
            .first()
            .map(String::as_str)
            .unwrap_or_else(|| self.display_title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// How an answer is wrapped for its confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseMode {
    Standard,
    Hedged,
    GracefulFailure,
}

impl ResponseMode {
    pub fn prefix(&self) -> &'static str {
        match self {
            ResponseMode::Hedged => "Based on the sources I could find, here is what appears to apply.\n\n",
            _ => "",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            ResponseMode::Standard => "",
            ResponseMode::Hedged => {
                "\n\n_Please verify these details on canada.ca or with the CRA before relying on them._"
            }
            ResponseMode::GracefulFailure => {
                "\n\n**I could not find enough official information to answer this confidently.** \
                 Please consult a qualified tax professional or contact the Canada Revenue Agency directly."
            }
        }
    }

    /// Wrap a complete answer.
    pub fn apply(&self, text: &str) -> String {
        format!("{}{}{}", self.prefix(), text, self.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceFactors {
    pub top_chunk_relevance: f32,
    pub chunk_consistency: f32,
    pub query_clarity: f32,
    pub source_authority: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceResult {
    pub score: f32,
    pub level: ConfidenceLevel,
    pub mode: ResponseMode,
    pub factors: ConfidenceFactors,
    pub warnings: Vec<String>,
}

/// Longest citation excerpt, in characters.
pub const EXCERPT_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub title: String,
    pub url: Option<String>,
    pub source_type: Option<String>,
    pub excerpt: String,
}

impl Citation {
    pub fn from_chunk(chunk: &RetrievedChunk) -> Self {
        Self {
            title: chunk.display_title().to_string(),
            url: chunk.source_url.clone(),
            source_type: chunk.source_type.clone(),
            excerpt: excerpt(&chunk.content, EXCERPT_MAX_CHARS),
        }
    }
}

/// Cut `text` to at most `max_chars`, preferring a word boundary.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let budget = max_chars.saturating_sub(3);
    let cut: String = collapsed.chars().take(budget).collect();
    let trimmed = match cut.rfind(' ') {
        Some(pos) if pos > budget / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub embedding_tokens: u32,
    pub cost_usd: f64,
    /// True when token counts were estimated locally
    pub estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub confidence: ConfidenceLevel,
    /// Present when the multi-factor scorer ran
    pub confidence_score: Option<f32>,
    pub mode: ResponseMode,
    pub disclaimer: String,
    pub warnings: Vec<String>,
    pub usage: UsageRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

/// Inbound question payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default)]
    pub document_context: Option<String>,
    #[serde(default)]
    pub profile_context: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// One event of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        stage: String,
        message: String,
    },
    Chunk {
        content: String,
    },
    Citations {
        citations: Vec<Citation>,
    },
    #[serde(rename_all = "camelCase")]
    Metadata {
        confidence: ConfidenceLevel,
        confidence_score: Option<f32>,
        mode: ResponseMode,
        disclaimer: String,
        warnings: Vec<String>,
        usage: UsageRecord,
    },
    Done,
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn status(stage: &str, message: impl Into<String>) -> Self {
        StreamEvent::Status {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        StreamEvent::Chunk {
            content: content.into(),
        }
    }

    /// Event name as used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Status { .. } => "status",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Citations { .. } => "citations",
            StreamEvent::Metadata { .. } => "metadata",
            StreamEvent::Done => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Metadata event describing a finished answer.
    pub fn metadata_for(answer: &Answer) -> Self {
        StreamEvent::Metadata {
            confidence: answer.confidence,
            confidence_score: answer.confidence_score,
            mode: answer.mode,
            disclaimer: answer.disclaimer.clone(),
            warnings: answer.warnings.clone(),
            usage: answer.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let w = RetrievalWeights::new(0.7);
        assert!((w.semantic + w.keyword - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_excerpt_breaks_on_word_boundary() {
        let text = "word ".repeat(100);
        let cut = excerpt(&text, EXCERPT_MAX_CHARS);
        assert!(cut.chars().count() <= EXCERPT_MAX_CHARS);
        assert!(cut.ends_with("word..."));
    }

    #[test]
    fn test_excerpt_keeps_short_text() {
        assert_eq!(excerpt("  short\n text ", 200), "short text");
    }

    #[test]
    fn test_stream_event_wire_format() {
        let json = serde_json::to_value(StreamEvent::chunk("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "chunk", "content": "hi"}));

        let done = serde_json::to_value(StreamEvent::Done).unwrap();
        assert_eq!(done, serde_json::json!({"type": "done"}));
    }

    #[test]
    fn test_response_mode_wrapping() {
        assert_eq!(ResponseMode::Standard.apply("x"), "x");
        let hedged = ResponseMode::Hedged.apply("x");
        assert!(hedged.starts_with("Based on"));
        assert!(hedged.contains("verify"));
        assert!(ResponseMode::GracefulFailure
            .apply("x")
            .contains("tax professional"));
    }

    #[test]
    fn test_ask_request_defaults() {
        let req: AskRequest = serde_json::from_str(r#"{"question":"RRSP limit?"}"#).unwrap();
        assert!(req.conversation_history.is_empty());
        assert!(!req.stream);
    }
}
