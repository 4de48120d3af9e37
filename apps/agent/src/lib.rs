//! Cadence agent library
//!
//! Exposes the agent components for the server binary and integration tests.

pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use services::{AgentGraph, ConversationService, EmbeddingIndex, ToolRegistry};
