//! Remote hybrid-search RPC over HTTP (PostgREST-style `POST /rpc/<function>`).

use super::{DocumentStore, SearchRequest, SearchRow};
use reqwest::Client;
use std::time::Duration;
use taxguide_core::{AppError, AppResult};

const REQUEST_TIMEOUT_SECS: u64 = 20;

pub struct RpcDocumentStore {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl RpcDocumentStore {
    pub fn new(endpoint: String, function: String, api_key: Option<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Retrieval(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: rpc_url(&endpoint, &function),
            api_key,
        })
    }
}

fn rpc_url(endpoint: &str, function: &str) -> String {
    format!("{}/rpc/{}", endpoint.trim_end_matches('/'), function)
}

#[async_trait::async_trait]
impl DocumentStore for RpcDocumentStore {
    fn store_name(&self) -> &str {
        "rpc"
    }

    async fn hybrid_search(&self, request: &SearchRequest) -> AppResult<Vec<SearchRow>> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key).bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Search RPC request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Retrieval(format!(
                "Search RPC error ({}): {}",
                status, body
            )));
        }

        let rows: Vec<SearchRow> = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Invalid search RPC response: {}", e)))?;

        tracing::debug!("Search RPC returned {} rows", rows.len());
        Ok(rows)
    }
}
