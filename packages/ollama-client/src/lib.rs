//! Ollama API client for Cadence
//!
//! This crate provides a client for the parts of the Ollama API the agent
//! relies on: tool-calling chat completions and text embeddings.
//!
//! # Requirements
//!
//! - Ollama must be running and accessible at the configured URL
//! - Required models must be pulled before use:
//!   ```bash
//!   ollama pull llama3.1
//!   ollama pull nomic-embed-text
//!   ```
//!
//! # Thread Safety
//!
//! `OllamaClient` is `Clone + Send + Sync` and can be safely shared
//! across tasks. Clones share one HTTP connection pool.
//!
//! # Example
//!
//! ```no_run
//! use cadence_ollama_client::{ChatMessage, OllamaClient, ToolDefinition};
//! use cadence_shared_config::OllamaConfig;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new(&OllamaConfig::default())?;
//!
//! let tools = vec![ToolDefinition::function(
//!     "search_video",
//!     "Search YouTube for a query",
//!     json!({"type": "object", "properties": {"query": {"type": "string"}}}),
//! )];
//! let response = client
//!     .chat_with_tools(vec![ChatMessage::user("find lofi mixes")], tools)
//!     .await?;
//! for call in &response.message.tool_calls {
//!     println!("model wants {} with {}", call.function.name, call.function.arguments);
//! }
//!
//! let embedding = client.generate_embedding("chill evening jazz").await?;
//! println!("Embedding dimensions: {}", embedding.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod models;

pub use client::OllamaClient;
pub use error::{OllamaError, OllamaResult};
pub use models::{
    ChatMessage, ChatOptions, ChatRequest, ChatResponse, ChatRole, EmbeddingRequest,
    EmbeddingResponse, ListModelsResponse, ModelInfo, ToolCall, ToolCallFunction, ToolDefinition,
    ToolFunction,
};

/// Embedding dimension produced by nomic-embed-text
pub const EMBEDDING_DIMENSION: usize = 768;
