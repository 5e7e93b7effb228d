//! Ollama embedding provider (`/api/embeddings`).
//!
//! One request per text; failures surface immediately as
//! `AppError::Embedding` and are never retried here.

use crate::embeddings::provider::EmbeddingProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taxguide_core::{AppError, AppResult};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaProvider {
    pub fn new(endpoint: Option<String>, model: String, dimensions: usize) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                AppError::Embedding(format!("Failed to create HTTP client for Ollama: {}", e))
            })?;

        let base_url = endpoint
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions,
        })
    }

    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Ollama embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Ollama embedding error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Embedding(format!("Failed to parse Ollama embedding response: {}", e))
        })?;

        check_dimensions(&self.model, parsed.embedding, self.dimensions)
    }
}

pub(crate) fn check_dimensions(
    model: &str,
    embedding: Vec<f32>,
    expected: usize,
) -> AppResult<Vec<f32>> {
    if embedding.len() != expected {
        return Err(AppError::Embedding(format!(
            "Model '{}' returned {} dimensions, expected {}",
            model,
            embedding.len(),
            expected
        )));
    }
    Ok(embedding)
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let provider = OllamaProvider::new(
            Some("http://gpu-box:11434/".to_string()),
            "nomic-embed-text".to_string(),
            768,
        )
        .unwrap();
        assert_eq!(provider.base_url, "http://gpu-box:11434");
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_dimension_mismatch_is_embedding_error() {
        let result = check_dimensions("m", vec![0.0; 3], 4);
        assert!(matches!(result, Err(AppError::Embedding(_))));
        assert!(check_dimensions("m", vec![0.0; 4], 4).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_embedding_error() {
        let provider = OllamaProvider::new(
            Some("http://127.0.0.1:9".to_string()),
            "nomic-embed-text".to_string(),
            768,
        )
        .unwrap();
        let result = provider.embed("test").await;
        assert!(matches!(result, Err(AppError::Embedding(_))));
    }
}
