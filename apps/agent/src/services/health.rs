//! Readiness checks for the conversation store and Ollama

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_ollama_client::OllamaClient;
use serde::Serialize;

use crate::repositories::ConversationStore;

/// Status of an individual dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    /// Not checked, e.g. Ollama embeddings while the hashing embedder is used
    Skipped,
}

/// Result of a single dependency check
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: &'static str,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceHealth {
    pub fn healthy(name: &'static str, response_time: Duration) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
            details: None,
        }
    }

    pub fn unhealthy(
        name: &'static str,
        error: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Skipped,
            response_time_ms: None,
            error: None,
            details: Some(serde_json::json!({ "reason": reason.into() })),
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Aggregated readiness response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Healthy only if every checked dependency is healthy
    pub status: ServiceStatus,
    pub services: Vec<ServiceHealth>,
    pub total_time_ms: u64,
    pub version: &'static str,
}

impl HealthCheckResponse {
    pub fn new(services: Vec<ServiceHealth>, total_time: Duration) -> Self {
        let status = if services
            .iter()
            .all(|s| s.status != ServiceStatus::Unhealthy)
        {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            services,
            total_time_ms: total_time.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Checks the dependencies a run needs
pub struct HealthService {
    store: Arc<dyn ConversationStore>,
    ollama: OllamaClient,
    /// Whether the playlist index embeds through Ollama
    ollama_embeddings: bool,
}

impl HealthService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        ollama: OllamaClient,
        ollama_embeddings: bool,
    ) -> Self {
        Self {
            store,
            ollama,
            ollama_embeddings,
        }
    }

    pub async fn check_store(&self) -> ServiceHealth {
        let start = Instant::now();
        let backend = self.store.backend();

        match self.store.ping().await {
            Ok(()) => ServiceHealth::healthy("store", start.elapsed())
                .with_details(serde_json::json!({ "backend": backend })),
            Err(e) => ServiceHealth::unhealthy("store", e.to_string(), start.elapsed())
                .with_details(serde_json::json!({ "backend": backend })),
        }
    }

    /// Ollama must answer and list the chat model
    pub async fn check_ollama(&self) -> Vec<ServiceHealth> {
        let start = Instant::now();
        let config = self.ollama.config();

        let chat_listed = match self.ollama.has_model(&config.model).await {
            Ok(listed) => listed,
            Err(e) => {
                let elapsed = start.elapsed();
                let mut checks = vec![ServiceHealth::unhealthy("ollama", e.to_string(), elapsed)];
                if self.ollama_embeddings {
                    checks.push(ServiceHealth::unhealthy("embeddings", e.to_string(), elapsed));
                }
                return checks;
            }
        };

        let chat = if chat_listed {
            ServiceHealth::healthy("ollama", start.elapsed())
        } else {
            ServiceHealth::unhealthy(
                "ollama",
                format!("configured model '{}' not found", config.model),
                start.elapsed(),
            )
        }
        .with_details(serde_json::json!({ "model": config.model }));

        if !self.ollama_embeddings {
            return vec![
                chat,
                ServiceHealth::skipped("embeddings", "hashing embedder in use"),
            ];
        }

        let start = Instant::now();
        let embeddings = match self.ollama.has_model(&config.embedding_model).await {
            Ok(true) => ServiceHealth::healthy("embeddings", start.elapsed())
                .with_details(serde_json::json!({ "model": config.embedding_model })),
            Ok(false) => ServiceHealth::unhealthy(
                "embeddings",
                format!("embedding model '{}' not found", config.embedding_model),
                start.elapsed(),
            ),
            Err(e) => ServiceHealth::unhealthy("embeddings", e.to_string(), start.elapsed()),
        };

        vec![chat, embeddings]
    }

    /// Run all checks concurrently
    pub async fn check_all(&self) -> HealthCheckResponse {
        let start = Instant::now();
        let (store, ollama) = tokio::join!(self.check_store(), self.check_ollama());

        let mut services = vec![store];
        services.extend(ollama);
        HealthCheckResponse::new(services, start.elapsed())
    }
}
