//! Streaming generation as an ordered sequence of [`StreamEvent`]s.
//!
//! Order: `reading` status, citations, `generating` status, prefix, deltas,
//! suffix, metadata, done. A provider failure at any point still ends with
//! metadata and done. When the receiver goes away generation stops.

use super::assess::{disclaimer_for, Assessment};
use super::{citations, AnswerGenerator, GenerationInput};
use crate::types::{ConfidenceLevel, ResponseMode, StreamEvent, UsageRecord};
use futures::StreamExt;
use std::collections::HashSet;
use taxguide_llm::LlmUsage;
use tokio::sync::mpsc;

/// Distinct source titles announced before generation.
pub const MAX_READING_STATUS: usize = 3;

pub const STREAM_APOLOGY: &str =
    "\n\nI'm sorry, something went wrong while generating this answer. Please try again.";

pub const WARN_INTERRUPTED: &str = "The answer was interrupted before it finished.";

/// Send one event; false once the receiver is gone.
async fn emit(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

impl AnswerGenerator {
    /// Stream an answer into `tx`.
    ///
    /// Never returns an error: failures are reported in-band.
    pub async fn generate_stream(&self, input: GenerationInput, tx: &mpsc::Sender<StreamEvent>) {
        let assessment = Assessment::for_input(input.confidence.as_ref(), &input.chunks);

        let mut announced = HashSet::new();
        for chunk in &input.chunks {
            if announced.len() >= MAX_READING_STATUS {
                break;
            }
            let title = chunk.display_title();
            if announced.insert(title.to_string())
                && !emit(tx, StreamEvent::status("reading", format!("Reading {}", title))).await
            {
                return;
            }
        }

        let cites = citations(&input.chunks);
        if !emit(tx, StreamEvent::Citations { citations: cites }).await {
            return;
        }
        if !emit(tx, StreamEvent::status("generating", "Generating answer")).await {
            return;
        }

        let request = match self.build_request(&input, &assessment) {
            Ok(request) => request.with_streaming(),
            Err(e) => {
                tracing::error!("Failed to build prompt: {}", e);
                self.finish_failed(tx, UsageRecord::default()).await;
                return;
            }
        };
        let prompt_chars = request.prompt_chars();

        let mut stream = match self.client.stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to open {} stream: {}", self.client.provider_name(), e);
                let usage = self.usage(None, prompt_chars, 0, &input.question);
                self.finish_failed(tx, usage).await;
                return;
            }
        };

        let prefix = assessment.mode.prefix();
        if !prefix.is_empty() && !emit(tx, StreamEvent::chunk(prefix)).await {
            return;
        }

        let mut completion_chars = 0usize;
        let mut reported: Option<LlmUsage> = None;
        loop {
            tokio::select! {
                biased;
                _ = tx.closed() => {
                    tracing::debug!("Receiver closed after {} chars; stopping generation", completion_chars);
                    return;
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        if chunk.usage.is_some() {
                            reported = chunk.usage;
                        }
                        if !chunk.content.is_empty() {
                            completion_chars += chunk.content.chars().count();
                            if !emit(tx, StreamEvent::chunk(chunk.content)).await {
                                return;
                            }
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Stream failed after {} chars: {}", completion_chars, e);
                        let usage = self.usage(reported, prompt_chars, completion_chars, &input.question);
                        self.finish_failed(tx, usage).await;
                        return;
                    }
                    None => break,
                }
            }
        }

        let suffix = assessment.mode.suffix();
        if !suffix.is_empty() && !emit(tx, StreamEvent::chunk(suffix)).await {
            return;
        }

        let usage = self.usage(reported, prompt_chars, completion_chars, &input.question);
        let metadata = StreamEvent::Metadata {
            confidence: assessment.level,
            confidence_score: assessment.score,
            mode: assessment.mode,
            disclaimer: assessment.disclaimer,
            warnings: assessment.warnings,
            usage,
        };
        if emit(tx, metadata).await {
            emit(tx, StreamEvent::Done).await;
        }
    }

    async fn finish_failed(&self, tx: &mpsc::Sender<StreamEvent>, usage: UsageRecord) {
        if !emit(tx, StreamEvent::chunk(STREAM_APOLOGY)).await {
            return;
        }
        let metadata = StreamEvent::Metadata {
            confidence: ConfidenceLevel::Low,
            confidence_score: None,
            mode: ResponseMode::GracefulFailure,
            disclaimer: disclaimer_for(ConfidenceLevel::Low),
            warnings: vec![WARN_INTERRUPTED.to_string()],
            usage,
        };
        if emit(tx, metadata).await {
            emit(tx, StreamEvent::Done).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{grounded_chunk, ScriptedLlm};
    use std::sync::Arc;
    use taxguide_core::config::{LlmSettings, PricingSettings};
    use taxguide_prompt::default_prompt;

    fn generator(llm: ScriptedLlm) -> AnswerGenerator {
        AnswerGenerator::new(
            Arc::new(llm),
            default_prompt(),
            &LlmSettings::default(),
            PricingSettings::default(),
        )
    }

    async fn run(llm: ScriptedLlm, input: GenerationInput) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        generator(llm).generate_stream(input, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::kind).collect()
    }

    fn input() -> GenerationInput {
        GenerationInput {
            question: "When is my return due?".to_string(),
            chunks: vec![
                grounded_chunk("deadlines", "Most individuals must file by April 30.", 0.8),
                grounded_chunk("deadlines", "Self-employed filers have until June 15.", 0.75),
                grounded_chunk("payments", "Any balance owing is due April 30.", 0.7),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_event_order() {
        let events = run(ScriptedLlm::streaming(&["File by ", "April 30."]), input()).await;

        assert_eq!(
            kinds(&events),
            vec!["status", "status", "citations", "status", "chunk", "chunk", "metadata", "done"]
        );
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "File by April 30.");
    }

    #[tokio::test]
    async fn test_hedged_stream_wraps_deltas() {
        let mut input = input();
        input.confidence = Some(crate::types::ConfidenceResult {
            score: 0.5,
            level: ConfidenceLevel::Medium,
            mode: ResponseMode::Hedged,
            factors: Default::default(),
            warnings: Vec::new(),
        });
        let events = run(ScriptedLlm::streaming(&["answer"]), input).await;

        let chunks: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            chunks,
            vec![ResponseMode::Hedged.prefix(), "answer", ResponseMode::Hedged.suffix()]
        );
    }

    #[tokio::test]
    async fn test_open_failure_degrades() {
        let events = run(ScriptedLlm::failing(), input()).await;

        assert_eq!(kinds(&events).last(), Some(&"done"));
        let metadata = events
            .iter()
            .find(|e| matches!(e, StreamEvent::Metadata { .. }))
            .unwrap();
        match metadata {
            StreamEvent::Metadata { confidence, mode, warnings, .. } => {
                assert_eq!(*confidence, ConfidenceLevel::Low);
                assert_eq!(*mode, ResponseMode::GracefulFailure);
                assert_eq!(warnings, &vec![WARN_INTERRUPTED.to_string()]);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_once() {
        let events = run(ScriptedLlm::streaming(&["partial"]).then_fail(), input()).await;

        let k = kinds(&events);
        assert_eq!(k.iter().filter(|k| **k == "done").count(), 1);
        assert_eq!(k.iter().filter(|k| **k == "metadata").count(), 1);
        assert!(events.contains(&StreamEvent::chunk(STREAM_APOLOGY)));
    }

    #[tokio::test]
    async fn test_reported_usage_wins() {
        let llm = ScriptedLlm::streaming(&["ok"]).with_usage(LlmUsage::new(40, 2));
        let events = run(llm, input()).await;

        let usage = events.iter().find_map(|e| match e {
            StreamEvent::Metadata { usage, .. } => Some(*usage),
            _ => None,
        });
        let usage = usage.unwrap();
        assert!(!usage.estimated);
        assert_eq!(usage.prompt_tokens, 40);
    }

    #[tokio::test]
    async fn test_closed_receiver_stops_quietly() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        generator(ScriptedLlm::streaming(&["a", "b"]))
            .generate_stream(input(), &tx)
            .await;
        assert!(tx.is_closed());
    }
}
