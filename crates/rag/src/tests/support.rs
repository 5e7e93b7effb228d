//! Shared fixtures: a scripted chat client and a seeded in-memory pipeline.

use crate::cache::{CacheMetrics, EmbeddingCache, MemoryCacheStore};
use crate::embeddings::providers::mock::MockProvider;
use crate::pipeline::RagPipeline;
use crate::store::{InMemoryDocumentStore, SeedDocument};
use crate::types::RetrievedChunk;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taxguide_core::{AppConfig, AppError, AppResult};
use taxguide_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use taxguide_prompt::default_prompt;

pub const TEST_YEAR: i32 = 2025;

enum Script {
    Reply(String),
    Deltas(Vec<String>),
    Fail,
}

enum Ending {
    Finish,
    Fail,
    Hang,
}

/// Chat client that plays back a fixed script and records every request.
pub struct ScriptedLlm {
    script: Script,
    ending: Ending,
    usage: Option<LlmUsage>,
    requests: Mutex<Vec<LlmRequest>>,
    released: Arc<AtomicBool>,
}

struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ScriptedLlm {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            ending: Ending::Finish,
            usage: None,
            requests: Mutex::new(Vec::new()),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with_script(Script::Reply(text.to_string()))
    }

    pub fn streaming(deltas: &[&str]) -> Self {
        Self::with_script(Script::Deltas(deltas.iter().map(|d| d.to_string()).collect()))
    }

    /// Every call fails before any output.
    pub fn failing() -> Self {
        Self::with_script(Script::Fail)
    }

    pub fn with_usage(mut self, usage: LlmUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Break the stream after the scripted deltas.
    pub fn then_fail(mut self) -> Self {
        self.ending = Ending::Fail;
        self
    }

    /// Never finish the stream after the scripted deltas.
    pub fn then_hang(mut self) -> Self {
        self.ending = Ending::Hang;
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Whether the last opened stream has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn record(&self, request: &LlmRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }

    fn deltas(&self) -> AppResult<Vec<String>> {
        match &self.script {
            Script::Reply(text) => Ok(vec![text.clone()]),
            Script::Deltas(deltas) => Ok(deltas.clone()),
            Script::Fail => Err(AppError::Llm("scripted provider failure".to_string())),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.record(request);
        Ok(LlmResponse {
            content: self.deltas()?.concat(),
            model: request.model.clone(),
            usage: self.usage,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.record(request);
        let mut items: Vec<AppResult<LlmStreamChunk>> =
            self.deltas()?.into_iter().map(|d| Ok(LlmStreamChunk::delta(d))).collect();

        match self.ending {
            Ending::Finish => items.push(Ok(LlmStreamChunk::finished(self.usage))),
            Ending::Fail => items.push(Err(AppError::Llm("connection reset".to_string()))),
            Ending::Hang => {}
        }

        self.released.store(false, Ordering::SeqCst);
        let guard = ReleaseGuard(self.released.clone());
        let body = futures::stream::iter(items);
        let stream = if matches!(self.ending, Ending::Hang) {
            body.chain(futures::stream::pending()).boxed()
        } else {
            body.boxed()
        };

        Ok(Box::pin(stream.map(move |item| {
            let _held = &guard;
            item
        })))
    }
}

/// A retrieved chunk titled after its source.
pub fn grounded_chunk(source: &str, content: &str, similarity: f32) -> RetrievedChunk {
    let title = format!("{} guide", source);
    RetrievedChunk {
        id: format!("{}-{}", source, content.len()),
        content: content.to_string(),
        source: source.to_string(),
        title: Some(title.clone()),
        source_url: Some(format!("https://www.canada.ca/{}", source)),
        source_type: Some("guide".to_string()),
        hierarchy_path: vec![title],
        forms: BTreeSet::new(),
        tax_year: None,
        score: similarity / 61.0,
        similarity: Some(similarity),
        semantic_rank: None,
        keyword_rank: None,
    }
}

fn seed(source: &str, title: &str, content: &str) -> SeedDocument {
    SeedDocument {
        id: None,
        content: content.to_string(),
        source: source.to_string(),
        title: Some(title.to_string()),
        category: Some("individuals".to_string()),
        source_url: Some(format!("https://www.canada.ca/en/revenue-agency/{}.html", source)),
        source_type: Some("guide".to_string()),
    }
}

pub fn seed_documents() -> Vec<SeedDocument> {
    vec![
        seed(
            "rrsp-limits",
            "RRSP deduction limit",
            "Your RRSP deduction limit for 2025 is 18% of your earned income from the previous \
             year, up to a maximum of $32,490, minus any pension adjustment.",
        ),
        seed(
            "filing-deadlines",
            "Filing due dates",
            "Most individuals must file their income tax and benefit return for 2025 by April 30, \
             2026. Self-employed individuals have until June 15, 2026 to file their return.",
        ),
        seed(
            "payment-deadlines",
            "Paying your balance",
            "If you have a balance owing for 2025, you must pay it by April 30, 2026, even if you \
             are self-employed and file your return later.",
        ),
        seed(
            "medical-expenses",
            "Medical expenses",
            "You can claim eligible medical expenses paid in any 12-month period ending in 2025 \
             that you did not claim in 2024, for yourself, your spouse, or dependent children.",
        ),
    ]
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.cache.ttl_secs = 3600;
    config
}

async fn embedding_cache(config: &AppConfig) -> Arc<EmbeddingCache> {
    let provider = Arc::new(MockProvider::new(config.embedding.dimensions));
    Arc::new(EmbeddingCache::new(
        provider,
        Arc::new(MemoryCacheStore::new(100, Duration::from_secs(3600))),
        Arc::new(CacheMetrics::new()),
        Duration::from_secs(config.cache.ttl_secs),
    ))
}

/// Pipeline over the seeded in-memory store.
pub async fn seeded_pipeline(llm: Arc<ScriptedLlm>) -> RagPipeline {
    pipeline_over(seed_documents(), llm).await
}

pub async fn pipeline_over(documents: Vec<SeedDocument>, llm: Arc<ScriptedLlm>) -> RagPipeline {
    let config = test_config();
    let embeddings = embedding_cache(&config).await;
    let store = InMemoryDocumentStore::from_documents(documents, embeddings.provider().clone())
        .await
        .unwrap();

    RagPipeline::new(Arc::new(store), embeddings, llm, default_prompt(), &config)
        .with_current_year(TEST_YEAR)
}
