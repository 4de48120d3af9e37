//! Readiness checks against a mock Ollama server

use std::sync::Arc;

use cadence_agent::repositories::MemoryConversationStore;
use cadence_agent::services::{HealthService, ServiceStatus};
use cadence_ollama_client::OllamaClient;
use cadence_shared_config::OllamaConfig;
use cadence_test_utils::MockOllamaServer;

fn service(server: &MockOllamaServer, ollama_embeddings: bool) -> HealthService {
    let config = OllamaConfig {
        model: "llama3.1".to_string(),
        embedding_model: "nomic-embed-text".to_string(),
        ..OllamaConfig::with_url(server.url())
    };
    let client = OllamaClient::new(&config).unwrap().with_retry_config(0, 0);
    HealthService::new(Arc::new(MemoryConversationStore::new()), client, ollama_embeddings)
}

#[tokio::test]
async fn test_memory_store_is_healthy() {
    let server = MockOllamaServer::start().await;
    let health = service(&server, false).check_store().await;

    assert_eq!(health.status, ServiceStatus::Healthy);
    assert_eq!(health.details.unwrap()["backend"], "memory");
}

#[tokio::test]
async fn test_all_models_present() {
    let server = MockOllamaServer::start().await;
    server
        .mock_list_models(&["llama3.1:latest", "nomic-embed-text:latest"])
        .await;

    let response = service(&server, true).check_all().await;

    assert!(response.is_healthy());
    let statuses: Vec<ServiceStatus> = response.services.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![ServiceStatus::Healthy, ServiceStatus::Healthy, ServiceStatus::Healthy]
    );
}

#[tokio::test]
async fn test_missing_embedding_model_is_unhealthy() {
    let server = MockOllamaServer::start().await;
    server.mock_list_models(&["llama3.1:latest"]).await;

    let response = service(&server, true).check_all().await;

    assert!(!response.is_healthy());
    let embeddings = &response.services[2];
    assert_eq!(embeddings.name, "embeddings");
    assert_eq!(embeddings.status, ServiceStatus::Unhealthy);
    assert!(embeddings.error.as_deref().unwrap().contains("nomic-embed-text"));
}

#[tokio::test]
async fn test_embedding_check_skipped_for_hashing_backend() {
    let server = MockOllamaServer::start().await;
    server.mock_list_models(&["llama3.1:latest"]).await;

    let response = service(&server, false).check_all().await;

    assert!(response.is_healthy());
    assert_eq!(response.services[2].status, ServiceStatus::Skipped);
}

#[tokio::test]
async fn test_unreachable_ollama_is_unhealthy() {
    let server = MockOllamaServer::start().await;
    // No /api/tags mock: wiremock answers 404

    let response = service(&server, true).check_all().await;

    assert!(!response.is_healthy());
    assert_eq!(response.services.len(), 3);
    assert_eq!(response.services[1].status, ServiceStatus::Unhealthy);
    assert_eq!(response.services[2].status, ServiceStatus::Unhealthy);
}

#[tokio::test]
async fn test_model_tag_is_ignored() {
    let server = MockOllamaServer::start().await;
    server
        .mock_list_models(&["llama3.1:latest", "nomic-embed-text:v1.5"])
        .await;
    let config = OllamaConfig {
        model: "llama3.1:8b".to_string(),
        embedding_model: "nomic-embed-text".to_string(),
        ..OllamaConfig::with_url(server.url())
    };
    let client = OllamaClient::new(&config).unwrap().with_retry_config(0, 0);
    let health = HealthService::new(Arc::new(MemoryConversationStore::new()), client, true);

    let response = health.check_all().await;

    assert!(response.is_healthy());
    assert_eq!(response.services[1].details.as_ref().unwrap()["model"], "llama3.1:8b");
}
