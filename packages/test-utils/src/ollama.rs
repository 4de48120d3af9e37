//! Mock Ollama server for chat, tool-calling and embedding tests
//!
//! Provides a [`MockOllamaServer`] that simulates the Ollama endpoints the
//! agent uses, without a real Ollama instance.

use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Ollama server
///
/// Wraps a [`wiremock::MockServer`]. Chat mocks mounted with the `_once`
/// helpers answer a single request each and are consumed in mount order,
/// so a tool-calling exchange can be scripted step by step:
///
/// ```rust,ignore
/// let server = MockOllamaServer::start().await;
/// server.mock_chat_tool_call_once("open_url", json!({"link": "https://example.com"})).await;
/// server.mock_chat_success("Done.").await;
/// ```
pub struct MockOllamaServer {
    server: MockServer,
}

fn chat_body(message: Value) -> Value {
    json!({
        "model": "test-model",
        "message": message,
        "done": true,
        "done_reason": "stop"
    })
}

impl MockOllamaServer {
    /// Start a new mock Ollama server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get reference to the underlying mock server for custom mock setups
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Mount a mock returning a 768-dimensional embedding for any prompt
    pub async fn mock_embeddings_success(&self) {
        let embedding: Vec<f32> = (0..768).map(|i| (i as f32 * 0.001) % 1.0).collect();
        self.mock_embeddings_with_value(embedding).await;
    }

    /// Mount a mock returning `embedding` for any prompt
    pub async fn mock_embeddings_with_value(&self, embedding: Vec<f32>) {
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": embedding
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock returning `embedding` only when the prompt equals `prompt`
    pub async fn mock_embedding_for(&self, prompt: &str, embedding: Vec<f32>) {
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(wiremock::matchers::body_partial_json(json!({"prompt": prompt})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": embedding
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for embedding generation failure
    pub async fn mock_embeddings_failure(&self, status_code: u16, error_message: &str) {
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "error": error_message
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a missing embedding model
    pub async fn mock_embeddings_model_not_found(&self) {
        self.mock_embeddings_failure(
            404,
            "model 'nomic-embed-text' not found, try pulling it first",
        )
        .await;
    }

    /// Mount a mock answering every chat request with plain text
    pub async fn mock_chat_success(&self, response_text: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(json!({
                "role": "assistant",
                "content": response_text
            }))))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock answering the next chat request with plain text, once
    pub async fn mock_chat_reply_once(&self, response_text: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(json!({
                "role": "assistant",
                "content": response_text
            }))))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Mount a mock answering the next chat request with a single tool call, once
    ///
    /// The call carries no id, matching Ollama releases that omit it.
    pub async fn mock_chat_tool_call_once(&self, tool: &str, arguments: Value) {
        self.mock_chat_tool_calls_once(&[(tool, arguments)]).await;
    }

    /// Mount a mock answering the next chat request with several tool calls, once
    pub async fn mock_chat_tool_calls_once(&self, calls: &[(&str, Value)]) {
        let tool_calls: Vec<Value> = calls
            .iter()
            .map(|(name, arguments)| {
                json!({"function": {"name": name, "arguments": arguments}})
            })
            .collect();

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(json!({
                "role": "assistant",
                "content": "",
                "tool_calls": tool_calls
            }))))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for chat completion failure
    pub async fn mock_chat_failure(&self, status_code: u16, error_message: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "error": error_message
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for the /api/tags endpoint (list models)
    pub async fn mock_list_models(&self, models: &[&str]) {
        let model_list: Vec<Value> = models
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "modified_at": "2024-01-01T00:00:00Z",
                    "size": 4_000_000_000_i64
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": model_list
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock that delays every chat and embedding response
    pub async fn mock_timeout(&self, delay_ms: u64) {
        Mock::given(method("POST"))
            .and(path_regex("/api/(embeddings|chat)"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(delay_ms))
                    .set_body_json(json!({"error": "timeout"})),
            )
            .mount(&self.server)
            .await;
    }

    async fn bodies_for(&self, endpoint: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }

    /// JSON bodies of every chat request received so far, in arrival order
    pub async fn chat_requests(&self) -> Vec<Value> {
        self.bodies_for("/api/chat").await
    }

    /// Number of chat requests received so far
    pub async fn chat_calls(&self) -> usize {
        self.chat_requests().await.len()
    }

    /// Number of embedding requests received so far
    pub async fn embedding_calls(&self) -> usize {
        self.bodies_for("/api/embeddings").await.len()
    }
}
