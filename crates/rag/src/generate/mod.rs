//! Grounded answer generation.

pub mod assess;
mod stream;

pub use assess::Assessment;

use crate::types::{Answer, Citation, ConfidenceResult, ConversationTurn, RetrievedChunk, TurnRole, UsageRecord};
use std::collections::HashSet;
use std::sync::Arc;
use taxguide_core::config::{LlmSettings, PricingSettings};
use taxguide_core::AppResult;
use taxguide_llm::{ChatMessage, LlmClient, LlmRequest, LlmUsage};
use taxguide_prompt::{build_prompt, GroundingSource, PromptContext, PromptDefinition};

/// Most recent conversation turns sent with a question.
pub const MAX_HISTORY_TURNS: usize = 20;

/// Rough characters-per-token ratio for local estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Everything the generator needs for one answer.
#[derive(Debug, Clone, Default)]
pub struct GenerationInput {
    pub question: String,
    pub chunks: Vec<RetrievedChunk>,
    pub history: Vec<ConversationTurn>,
    pub profile_context: Option<String>,
    pub document_context: Option<String>,
    /// Multi-factor result; the similarity fallback is used when absent
    pub confidence: Option<ConfidenceResult>,
}

pub struct AnswerGenerator {
    client: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    model: String,
    temperature: f32,
    max_tokens: u32,
    pricing: PricingSettings,
}

pub fn estimate_tokens(chars: usize) -> u32 {
    chars.div_ceil(CHARS_PER_TOKEN) as u32
}

impl AnswerGenerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        prompt: PromptDefinition,
        llm: &LlmSettings,
        pricing: PricingSettings,
    ) -> Self {
        Self {
            client,
            prompt,
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            pricing,
        }
    }

    /// System prompt, trimmed history, then the question.
    pub fn build_request(
        &self,
        input: &GenerationInput,
        assessment: &Assessment,
    ) -> AppResult<LlmRequest> {
        let context = PromptContext {
            sources: input
                .chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| GroundingSource {
                    index: i + 1,
                    title: chunk.display_title().to_string(),
                    section: chunk.hierarchy_path.join(" > "),
                    content: chunk.content.clone(),
                })
                .collect(),
            profile: input.profile_context.clone(),
            document: input.document_context.clone(),
            cautious: assessment.level != crate::types::ConfidenceLevel::High,
            ..Default::default()
        };
        let built = build_prompt(&self.prompt, context)?;

        let skip = input.history.len().saturating_sub(MAX_HISTORY_TURNS);
        let mut messages = Vec::with_capacity(MAX_HISTORY_TURNS + 2);
        messages.push(ChatMessage::system(built.system));
        messages.extend(input.history.iter().skip(skip).map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(turn.content.clone()),
            TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
        }));
        messages.push(ChatMessage::user(input.question.clone()));

        Ok(LlmRequest::new(messages, self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens))
    }

    /// Generate a complete answer. Provider failures are returned as errors.
    pub async fn generate(&self, input: GenerationInput) -> AppResult<Answer> {
        let assessment = Assessment::for_input(input.confidence.as_ref(), &input.chunks);
        let request = self.build_request(&input, &assessment)?;

        let response = self.client.complete(&request).await?;

        let usage = self.usage(
            response.usage,
            request.prompt_chars(),
            response.content.chars().count(),
            &input.question,
        );
        tracing::debug!(
            "Generated answer: {} prompt / {} completion tokens, ${:.6}",
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.cost_usd
        );

        Ok(Answer {
            text: assessment.mode.apply(&response.content),
            citations: citations(&input.chunks),
            confidence: assessment.level,
            confidence_score: assessment.score,
            mode: assessment.mode,
            disclaimer: assessment.disclaimer,
            warnings: assessment.warnings,
            usage,
        })
    }

    /// Provider counts when reported, otherwise a 4-chars-per-token estimate.
    pub fn usage(
        &self,
        reported: Option<LlmUsage>,
        prompt_chars: usize,
        completion_chars: usize,
        question: &str,
    ) -> UsageRecord {
        let (prompt_tokens, completion_tokens, estimated) = match reported {
            Some(u) => (u.prompt_tokens, u.completion_tokens, false),
            None => (
                estimate_tokens(prompt_chars),
                estimate_tokens(completion_chars),
                true,
            ),
        };
        let embedding_tokens = estimate_tokens(question.chars().count());

        let cost_usd = (prompt_tokens as f64 * self.pricing.input_per_million
            + completion_tokens as f64 * self.pricing.output_per_million
            + embedding_tokens as f64 * self.pricing.embedding_per_million)
            / 1_000_000.0;

        UsageRecord {
            prompt_tokens,
            completion_tokens,
            embedding_tokens,
            cost_usd,
            estimated,
        }
    }
}

/// One citation per distinct source title and URL, in chunk order.
pub fn citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|c| seen.insert((c.display_title().to_string(), c.source_url.clone())))
        .map(Citation::from_chunk)
        .collect()
}
