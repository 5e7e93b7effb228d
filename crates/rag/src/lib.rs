//! Retrieval-augmented answering over official tax documents.
//!
//! A request flows strictly forward through:
//! PII redaction → query classification → (cached) embedding →
//! hybrid retrieval → redundancy reduction → confidence scoring →
//! grounded answer generation.

pub mod cache;
pub mod classify;
pub mod confidence;
pub mod embeddings;
pub mod forms;
pub mod generate;
pub mod pii;
pub mod pipeline;
pub mod query;
pub mod reduce;
pub mod retriever;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cache::{CacheMetrics, CacheStats, CacheStore, EmbeddingCache};
pub use classify::QueryClassifier;
pub use confidence::ConfidenceScorer;
pub use embeddings::{create_provider, EmbeddingProvider};
pub use generate::AnswerGenerator;
pub use pii::{redact, Redaction};
pub use pipeline::RagPipeline;
pub use query::Query;
pub use reduce::RedundancyReducer;
pub use retriever::{HybridRetriever, SearchOptions};
pub use store::DocumentStore;
pub use types::{
    Answer, AskRequest, Citation, Classification, ConfidenceLevel, ConfidenceResult,
    ConversationTurn, QueryType, ResponseMode, RetrievedChunk, StreamEvent, UsageRecord,
};
