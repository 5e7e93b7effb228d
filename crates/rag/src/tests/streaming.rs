use super::pipeline::unreachable_pipeline;
use super::support::{seeded_pipeline, ScriptedLlm};
use crate::pipeline::RagPipeline;
use crate::types::{AskRequest, ConfidenceLevel, StreamEvent};
use std::sync::Arc;
use std::time::Duration;

fn ask(question: &str) -> AskRequest {
    AskRequest {
        question: question.to_string(),
        stream: true,
        ..Default::default()
    }
}

async fn collect(pipeline: RagPipeline, request: AskRequest) -> Vec<StreamEvent> {
    let mut rx = Arc::new(pipeline).answer_stream(request);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn count(events: &[StreamEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

#[tokio::test]
async fn test_stream_terminates_with_single_done() {
    let llm = Arc::new(ScriptedLlm::streaming(&["File by ", "**April 30**."]));
    let events = collect(seeded_pipeline(llm).await, ask("When is my tax return due?")).await;

    assert_eq!(events.last(), Some(&StreamEvent::Done));
    assert_eq!(count(&events, "done"), 1);
    assert_eq!(count(&events, "citations"), 1);
    assert_eq!(count(&events, "metadata"), 1);

    let citations_at = events.iter().position(|e| e.kind() == "citations").unwrap();
    let first_chunk_at = events.iter().position(|e| e.kind() == "chunk").unwrap();
    let metadata_at = events.iter().position(|e| e.kind() == "metadata").unwrap();
    assert!(citations_at < first_chunk_at);
    assert!(first_chunk_at < metadata_at);
}

#[tokio::test]
async fn test_stream_greeting() {
    let llm = Arc::new(ScriptedLlm::streaming(&["unused"]));
    let events = collect(seeded_pipeline(llm.clone()).await, ask("thanks!")).await;

    assert_eq!(count(&events, "chunk"), 1);
    assert_eq!(count(&events, "citations"), 0);
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    assert!(llm.requests().is_empty());
}

#[tokio::test]
async fn test_provider_drop_mid_response() {
    let llm = Arc::new(ScriptedLlm::streaming(&["Most individuals must"]).then_fail());
    let events = collect(seeded_pipeline(llm).await, ask("When is my tax return due?")).await;

    assert_eq!(count(&events, "done"), 1);
    assert!(count(&events, "metadata") >= 1);
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    let low = events.iter().any(|e| {
        matches!(
            e,
            StreamEvent::Metadata {
                confidence: ConfidenceLevel::Low,
                ..
            }
        )
    });
    assert!(low);
}

#[tokio::test]
async fn test_retrieval_failure_emits_error_then_done() {
    let llm = Arc::new(ScriptedLlm::streaming(&["unused"]));
    let events = collect(unreachable_pipeline(llm), ask("When is my tax return due?")).await;

    let kinds: Vec<&str> = events.iter().map(StreamEvent::kind).collect();
    assert_eq!(kinds, vec!["status", "error", "done"]);
}

#[tokio::test]
async fn test_consumer_disconnect_releases_provider_stream() {
    let llm = Arc::new(ScriptedLlm::streaming(&["April"]).then_hang());
    let pipeline = Arc::new(seeded_pipeline(llm.clone()).await);

    let mut rx = pipeline.answer_stream(ask("When is my tax return due?"));
    while let Some(event) = rx.recv().await {
        if event.kind() == "chunk" {
            break;
        }
    }
    assert!(!llm.released());
    drop(rx);

    for _ in 0..50 {
        if llm.released() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(llm.released());
}

#[tokio::test]
async fn test_dropped_receiver_skips_retrieval() {
    let llm = Arc::new(ScriptedLlm::streaming(&["unused"]));
    let pipeline = Arc::new(seeded_pipeline(llm.clone()).await);

    let rx = pipeline.clone().answer_stream(ask("When is my tax return due?"));
    drop(rx);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = pipeline.embeddings().metrics().snapshot();
    assert_eq!(stats.hits + stats.misses, 0);
    assert!(llm.requests().is_empty());
}
