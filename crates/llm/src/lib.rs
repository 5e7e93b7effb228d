//! LLM integration crate for taxguide.
//!
//! Provider-agnostic abstraction for chat-style Large Language Models. Every
//! provider speaks the same `LlmClient` trait: a single completion with usage
//! counts, or a pull-based stream of decoded deltas.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default), newline-delimited JSON stream
//! - **OpenAI**: OpenAI-compatible chat completions, SSE stream
//!
//! # Example
//! ```no_run
//! use taxguide_llm::{ChatMessage, LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new(vec![ChatMessage::user("When is the T1 due?")], "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod frame;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::{ChatMessage, ChatRole, ProviderType};
