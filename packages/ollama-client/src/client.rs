//! Core Ollama HTTP client with retry logic and connection pooling

use std::future::Future;
use std::time::Duration;

use cadence_shared_config::OllamaConfig;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::{OllamaError, OllamaResult};
use crate::models::{
    ChatMessage, ChatOptions, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    ListModelsResponse, ToolDefinition,
};

/// Maximum error body size to prevent memory exhaustion
const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Default retry configuration
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Ollama API client with retry logic and connection pooling
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// HTTP client with connection pool
    http_client: Client,
    /// Configuration
    config: OllamaConfig,
    /// Number of retry attempts for transient failures
    retry_attempts: u32,
    /// Base delay for exponential backoff (milliseconds)
    retry_base_delay_ms: u64,
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn new(config: &OllamaConfig) -> OllamaResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(OllamaError::HttpError)?;

        Ok(Self::with_client(config, http_client))
    }

    /// Create a client around an existing HTTP client
    pub fn with_client(config: &OllamaConfig, http_client: Client) -> Self {
        Self {
            http_client,
            config: config.clone(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, attempts: u32, base_delay_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Execute an async operation, retrying transient failures with exponential backoff
    async fn with_retry<T, F, Fut>(&self, operation: F) -> OllamaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = OllamaResult<T>>,
    {
        if self.retry_attempts == 0 {
            return operation().await;
        }

        let mut last_error = None;

        for attempt in 0..self.retry_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 < self.retry_attempts {
                        let delay = self.retry_base_delay_ms * 2_u64.pow(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.retry_attempts,
                            delay_ms = delay,
                            error = %e,
                            "Retrying after transient error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(OllamaError::RetriesExhausted {
            attempts: self.retry_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Truncate error body on a UTF-8 boundary
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }

        let truncate_at = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
            .last()
            .unwrap_or(0);

        format!("{}... (truncated)", &body[..truncate_at])
    }

    fn map_send_error(&self, e: reqwest::Error) -> OllamaError {
        if e.is_connect() {
            OllamaError::ConnectionRefused(self.config.url.clone())
        } else if e.is_timeout() {
            OllamaError::Timeout(self.config.timeout_secs)
        } else {
            OllamaError::HttpError(e)
        }
    }

    /// Turn a non-success status into an error, naming `model` when Ollama says it is missing
    async fn check_status(response: Response, model: &str) -> OllamaResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = Self::truncate_error_body(response.text().await.unwrap_or_default());

        if body.contains("model") && body.contains("not found") {
            return Err(OllamaError::ModelNotFound(model.to_string()));
        }

        Err(OllamaError::ApiError(format!("Status {}: {}", status, body)))
    }

    /// List available models
    pub async fn list_models(&self) -> OllamaResult<Vec<String>> {
        let response = self
            .http_client
            .get(self.config.tags_url())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_status(response, "").await?;
        let list: ListModelsResponse = response.json().await?;
        Ok(list.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if a model is available, ignoring the tag suffix
    pub async fn has_model(&self, model: &str) -> OllamaResult<bool> {
        let models = self.list_models().await?;
        let model_base = model.split(':').next().unwrap_or(model);

        Ok(models.iter().any(|m| {
            let m_base = m.split(':').next().unwrap_or(m);
            m_base == model_base
        }))
    }

    async fn generate_embedding_internal(&self, text: &str) -> OllamaResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .http_client
            .post(self.config.embeddings_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_status(response, &self.config.embedding_model).await?;
        let embedding_response: EmbeddingResponse = response.json().await?;

        if embedding_response.embedding.is_empty() {
            return Err(OllamaError::InvalidResponse(
                "embedding response contained no values".to_string(),
            ));
        }

        Ok(embedding_response.embedding)
    }

    /// Generate an embedding for text with retry logic
    pub async fn generate_embedding(&self, text: &str) -> OllamaResult<Vec<f32>> {
        debug!(
            model = %self.config.embedding_model,
            text_len = text.len(),
            "Generating embedding"
        );

        let result = self
            .with_retry(|| self.generate_embedding_internal(text))
            .await?;

        debug!(dimensions = result.len(), "Embedding generated");

        Ok(result)
    }

    /// Generate embeddings for multiple texts concurrently, preserving input order
    ///
    /// # Arguments
    /// * `texts` - List of texts to generate embeddings for
    /// * `concurrency` - Maximum concurrent requests (recommend 3-5 for Ollama)
    pub async fn generate_embeddings_batch(
        &self,
        texts: Vec<String>,
        concurrency: usize,
    ) -> OllamaResult<Vec<Vec<f32>>> {
        use futures_util::stream::{self, StreamExt};

        // buffered() hangs on zero
        let concurrency = concurrency.max(1);

        debug!(
            count = texts.len(),
            concurrency = concurrency,
            "Generating batch embeddings"
        );

        let results: Vec<OllamaResult<Vec<f32>>> = stream::iter(texts)
            .map(|text| async move { self.generate_embedding(&text).await })
            .buffered(concurrency)
            .collect()
            .await;

        results.into_iter().collect()
    }

    async fn chat_internal(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> OllamaResult<ChatResponse> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            stream: false,
            options: Some(ChatOptions {
                temperature: Some(self.config.temperature),
                num_predict: Some(self.config.max_tokens),
            }),
        };

        let response = self
            .http_client
            .post(self.config.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::check_status(response, &self.config.model).await?;
        Ok(response.json().await?)
    }

    /// Chat with the model, advertising `tools`
    ///
    /// The returned message may carry `tool_calls` instead of (or alongside)
    /// text content. Requests are retried on transient failures.
    pub async fn chat_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> OllamaResult<ChatResponse> {
        debug!(
            model = %self.config.model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Sending chat request"
        );

        let response = self
            .with_retry(|| self.chat_internal(&messages, &tools))
            .await?;

        debug!(
            response_len = response.message.content.len(),
            tool_calls = response.message.tool_calls.len(),
            "Chat response received"
        );

        Ok(response)
    }
}
