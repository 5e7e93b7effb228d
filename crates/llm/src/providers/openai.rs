//! OpenAI-compatible chat completions provider.
//!
//! Works against api.openai.com and any server exposing the same
//! `/v1/chat/completions` contract. Streaming uses server-sent events:
//! `data: {json}` lines terminated by `data: [DONE]`.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::frame::{decode_stream, Frame};
use crate::types::ChatMessage;
use serde::{Deserialize, Serialize};
use taxguide_core::{AppError, AppResult};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<LlmUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceContent>,
    #[serde(default)]
    delta: Option<ChoiceContent>,
}

#[derive(Debug, Deserialize)]
struct ChoiceContent {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat client.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_OPENAI_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_openai_request(&self, request: &LlmRequest, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            stream,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn post(&self, body: &ChatCompletionRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to OpenAI: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

/// Parse one SSE line of a chat completions stream.
pub(crate) fn parse_sse_line(line: &str) -> AppResult<Frame> {
    // Comments, event names and ids carry no content
    if line.starts_with(':') || line.starts_with("event:") || line.starts_with("id:") {
        return Ok(Frame::Ignore);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Err(AppError::Llm(format!(
            "Unexpected SSE line: {}",
            line.chars().take(40).collect::<String>()
        )));
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Frame::Done);
    }

    let response: ChatCompletionResponse = serde_json::from_str(data)?;
    let content: String = response
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();

    if content.is_empty() && response.usage.is_none() {
        return Ok(Frame::Ignore);
    }

    Ok(Frame::Chunk(LlmStreamChunk {
        content,
        done: false,
        usage: response.usage,
    }))
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending completion request to OpenAI");

        let body = self.to_openai_request(request, false);
        let response = self.post(&body).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse OpenAI response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .find_map(|c| c.message.and_then(|m| m.content))
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: completion.model,
            usage: completion.usage,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::info!("Starting streaming request to OpenAI");

        let body = self.to_openai_request(request, true);
        let response = self.post(&body).await?;

        Ok(decode_stream(response.bytes_stream(), parse_sse_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_request_asks_for_usage() {
        let client = OpenAiClient::new("sk-test");
        let request = LlmRequest::new(vec![ChatMessage::user("hi")], "gpt-4o-mini");
        let body = serde_json::to_value(client.to_openai_request(&request, true)).unwrap();

        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_sse_delta() {
        let frame = parse_sse_line(
            r#"data: {"model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":"RRSP"}}]}"#,
        )
        .unwrap();
        assert_eq!(frame, Frame::Chunk(LlmStreamChunk::delta("RRSP")));
    }

    #[test]
    fn test_parse_sse_usage_chunk() {
        let frame = parse_sse_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":900,"completion_tokens":150,"total_tokens":1050}}"#,
        )
        .unwrap();
        match frame {
            Frame::Chunk(chunk) => {
                assert!(chunk.content.is_empty());
                assert_eq!(chunk.usage, Some(LlmUsage::new(900, 150)));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_sse_control_lines() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), Frame::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), Frame::Ignore);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            Frame::Ignore
        );
        assert!(parse_sse_line("data: {\"choi").is_err());
    }
}
