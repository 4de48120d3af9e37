//! Ollama configuration types

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Ollama service configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Ollama server URL
    pub url: String,

    /// Tool-capable chat model (e.g., llama3.1, qwen2.5)
    pub model: String,

    /// Embedding model used by the playlist index (e.g., nomic-embed-text)
    pub embedding_model: String,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens per chat completion
    pub max_tokens: u32,

    /// Temperature for chat completions (0.0 - 1.0)
    pub temperature: f32,
}

impl OllamaConfig {
    /// Load Ollama configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            url: get_env_or_default("OLLAMA_URL", "http://localhost:11434"),
            model: get_env_or_default("OLLAMA_MODEL", "llama3.1"),
            embedding_model: get_env_or_default("EMBEDDING_MODEL", "nomic-embed-text"),
            timeout_secs: parse_env("OLLAMA_TIMEOUT", 120)?,
            max_tokens: parse_env("OLLAMA_MAX_TOKENS", 1024)?,
            temperature: parse_env("OLLAMA_TEMPERATURE", 0.2)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reject URLs that reqwest could never reach
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                name: "OLLAMA_URL".to_string(),
                url: self.url.clone(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidValue {
                name: "OLLAMA_TEMPERATURE".to_string(),
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.url.trim_end_matches('/'), path)
    }

    /// Get the full URL for the embeddings endpoint
    pub fn embeddings_url(&self) -> String {
        self.endpoint("embeddings")
    }

    /// Get the full URL for the chat endpoint
    pub fn chat_url(&self) -> String {
        self.endpoint("chat")
    }

    /// Get the full URL for the model listing endpoint
    pub fn tags_url(&self) -> String {
        self.endpoint("tags")
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            timeout_secs: 120,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}
