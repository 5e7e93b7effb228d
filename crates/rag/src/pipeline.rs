//! Request-scoped orchestration of one question.
//!
//! Components run strictly in order; only the embedding cache and its
//! counters are shared between concurrent requests.

use crate::cache::{self, CacheMetrics, EmbeddingCache};
use crate::classify::QueryClassifier;
use crate::confidence::ConfidenceScorer;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::generate::assess::STANDARD_DISCLAIMER;
use crate::generate::{AnswerGenerator, GenerationInput};
use crate::pii::redact;
use crate::query::Query;
use crate::reduce::{dedupe_by_source, remove_exact_duplicates, RedundancyReducer};
use crate::retriever::{HybridRetriever, SearchOptions};
use crate::store::{self, DocumentStore};
use crate::types::{
    Answer, AskRequest, ConfidenceLevel, ConversationTurn, ResponseMode, StreamEvent, TurnRole,
    UsageRecord,
};
use std::sync::Arc;
use std::time::Duration;
use taxguide_core::config::RetrievalSettings;
use taxguide_core::{AppConfig, AppResult};
use taxguide_llm::{create_client, LlmClient};
use taxguide_prompt::{load_prompt_or_default, PromptDefinition};
use tokio::sync::mpsc;
use tracing::Instrument;

/// Events buffered between the generation task and the transport.
pub const STREAM_BUFFER: usize = 32;

const DEFAULT_LLM_KEY_ENV: &str = "OPENAI_API_KEY";

/// Reply to greetings and acknowledgements; no retrieval or model call.
pub const CONVERSATIONAL_REPLY: &str = "Hello! I can answer questions about Canadian taxes using \
     official CRA publications. What would you like to know?";

/// What to do with a request after redaction and classification.
enum Plan {
    Conversational,
    Grounded(GenerationInput),
}

pub struct RagPipeline {
    classifier: QueryClassifier,
    retriever: HybridRetriever,
    reducer: RedundancyReducer,
    scorer: ConfidenceScorer,
    generator: AnswerGenerator,
    embeddings: Arc<EmbeddingCache>,
    retrieval: RetrievalSettings,
}

impl RagPipeline {
    /// Wire every component from configuration.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let embedding_key = AppConfig::resolve_secret(config.embedding.api_key_env.as_deref());
        let provider: Arc<dyn EmbeddingProvider> =
            create_provider(&config.embedding, embedding_key)?;

        let cache_store = cache::create_store(&config.cache).await?;
        let embeddings = Arc::new(EmbeddingCache::new(
            provider.clone(),
            cache_store,
            Arc::new(CacheMetrics::new()),
            Duration::from_secs(config.cache.ttl_secs),
        ));

        let documents = store::create_store(&config.store, provider).await?;

        let llm_key = AppConfig::resolve_secret(Some(
            config.llm.api_key_env.as_deref().unwrap_or(DEFAULT_LLM_KEY_ENV),
        ));
        let client = create_client(
            &config.llm.provider,
            config.llm.endpoint.as_deref(),
            llm_key.as_deref(),
        )?;
        let prompt = load_prompt_or_default(config.llm.prompt_file.as_deref())?;

        tracing::info!(
            "Pipeline ready: {} chat, {} embeddings, {} store",
            client.provider_name(),
            embeddings.provider().provider_name(),
            documents.store_name()
        );

        Ok(Self::new(documents, embeddings, client, prompt, config))
    }

    pub fn new(
        documents: Arc<dyn DocumentStore>,
        embeddings: Arc<EmbeddingCache>,
        client: Arc<dyn LlmClient>,
        prompt: PromptDefinition,
        config: &AppConfig,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(),
            retriever: HybridRetriever::new(
                documents,
                embeddings.clone(),
                config.store.similarity_threshold,
            ),
            reducer: RedundancyReducer::new(
                config.retrieval.mmr_lambda,
                config.retrieval.duplicate_threshold,
            ),
            scorer: ConfidenceScorer::new(),
            generator: AnswerGenerator::new(client, prompt, &config.llm, config.pricing.clone()),
            embeddings,
            retrieval: config.retrieval.clone(),
        }
    }

    /// Pin the year window used by classification and chunk metadata.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.classifier = QueryClassifier::with_current_year(year);
        self.retriever = self.retriever.with_current_year(year);
        self
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingCache> {
        &self.embeddings
    }

    /// Answer one question as a single [`Answer`].
    pub async fn answer(&self, request: AskRequest) -> AppResult<Answer> {
        let span = tracing::info_span!("ask", request_id = %uuid::Uuid::new_v4());
        async move {
            match self.plan(request).await? {
                Plan::Conversational => Ok(conversational_answer()),
                Plan::Grounded(input) => self.generator.generate(input).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Answer one question as a stream of events.
    ///
    /// The receiver always ends with `done`. Dropping it cancels generation.
    pub fn answer_stream(self: Arc<Self>, request: AskRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let span = tracing::info_span!("ask", request_id = %uuid::Uuid::new_v4());

        tokio::spawn(
            async move {
                if tx.is_closed()
                    || tx
                        .send(StreamEvent::status("searching", "Searching official sources"))
                        .await
                        .is_err()
                {
                    tracing::debug!("Receiver dropped before retrieval");
                    return;
                }
                match self.plan(request).await {
                    Ok(Plan::Conversational) => {
                        let answer = conversational_answer();
                        if tx.send(StreamEvent::chunk(answer.text.clone())).await.is_ok()
                            && tx.send(StreamEvent::metadata_for(&answer)).await.is_ok()
                        {
                            let _ = tx.send(StreamEvent::Done).await;
                        }
                    }
                    Ok(Plan::Grounded(input)) => self.generator.generate_stream(input, &tx).await,
                    Err(e) => {
                        tracing::error!("Request failed before generation: {}", e);
                        if tx
                            .send(StreamEvent::Error { message: e.to_string() })
                            .await
                            .is_ok()
                        {
                            let _ = tx.send(StreamEvent::Done).await;
                        }
                    }
                }
            }
            .instrument(span),
        );

        rx
    }

    /// Redact, classify, retrieve, reduce and score.
    async fn plan(&self, request: AskRequest) -> AppResult<Plan> {
        let question = redact(&request.question);
        if question.had_pii {
            tracing::info!("Redacted PII from question: {:?}", question.detected_types);
        }
        tracing::debug!("Question: {}", question.text);

        let classification = self.classifier.classify(&question.text);
        if classification.skip_retrieval {
            tracing::debug!("Conversational input; skipping retrieval");
            return Ok(Plan::Conversational);
        }

        let query = Query::new(&question.text);
        let candidates = self.retrieval.top_k * self.retrieval.candidate_multiplier.max(1);
        let options = SearchOptions::from_classification(candidates, &classification);
        let retrieved = self.retriever.search(&query, &options).await?;

        let unique = remove_exact_duplicates(&retrieved);
        let mut chunks = self.reducer.reduce(&unique, self.retrieval.top_k);
        if let Some(max) = self.retrieval.max_chunks_per_source {
            chunks = dedupe_by_source(&chunks, max);
        }
        tracing::debug!(
            "Selected {} of {} chunks ({} after exact dedup)",
            chunks.len(),
            retrieved.len(),
            unique.len()
        );

        let confidence = self.scorer.score(&chunks, &classification);
        tracing::debug!(
            "Confidence {:?} ({:.2}): {:?}",
            confidence.level,
            confidence.score,
            confidence.factors
        );

        Ok(Plan::Grounded(GenerationInput {
            question: question.text,
            chunks,
            history: redact_history(request.conversation_history),
            profile_context: request.profile_context.map(|p| redact(&p).text),
            document_context: request.document_context.map(|d| redact(&d).text),
            confidence: Some(confidence),
        }))
    }
}

/// User turns may repeat identifiers from earlier questions.
fn redact_history(history: Vec<ConversationTurn>) -> Vec<ConversationTurn> {
    history
        .into_iter()
        .map(|turn| match turn.role {
            TurnRole::User => ConversationTurn {
                content: redact(&turn.content).text,
                ..turn
            },
            TurnRole::Assistant => turn,
        })
        .collect()
}

fn conversational_answer() -> Answer {
    Answer {
        text: CONVERSATIONAL_REPLY.to_string(),
        citations: Vec::new(),
        confidence: ConfidenceLevel::High,
        confidence_score: None,
        mode: ResponseMode::Standard,
        disclaimer: STANDARD_DISCLAIMER.to_string(),
        warnings: Vec::new(),
        usage: UsageRecord::default(),
    }
}
