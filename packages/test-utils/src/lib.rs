//! Shared test utilities for the Cadence workspace
//!
//! This crate provides mock implementations of external services and
//! on-disk fixtures so the agent test suites run without network access.
//!
//! # Utilities
//!
//! - [`MockOllamaServer`] - Mock Ollama server for chat, tool-calling and embedding tests
//! - [`CatalogFixture`] - Temporary `playlist.json` catalog
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence_test_utils::MockOllamaServer;
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let ollama = MockOllamaServer::start().await;
//!     ollama.mock_chat_tool_call_once("search_video", json!({"query": "lofi"})).await;
//!     ollama.mock_chat_success("Opened it for you.").await;
//!
//!     // Use ollama.url() to configure your client
//! }
//! ```

mod catalog;
mod ollama;

pub use catalog::CatalogFixture;
pub use ollama::MockOllamaServer;
