//! Business logic services for Cadence
//!
//! This module contains:
//! - Embedders and the playlist embedding index
//! - The tool registry and URL openers
//! - The chat model backend and the agent graph
//! - The conversation service that persists and drives runs
//! - Health checks

pub mod agent;
pub mod browser;
pub mod conversation;
pub mod embedding;
pub mod health;
pub mod index;
pub mod model;
pub mod tools;

pub use agent::{AgentGraph, ChatError, ChatResult, RunOutcome, TurnSink, DEFAULT_MAX_ROUNDS};
pub use browser::{LoggingOpener, OpenError, SystemBrowser, UrlOpener};
pub use conversation::ConversationService;
pub use embedding::{Embedder, EmbeddingError, HashingEmbedder, OllamaEmbedder};
pub use health::{HealthCheckResponse, HealthService, ServiceHealth, ServiceStatus};
pub use index::{EmbeddingIndex, IndexError, Match};
pub use model::{ChatModel, ModelError, ModelReply, ModelToolCall, OllamaChatModel};
pub use tools::{SideEffect, ToolKind, ToolRegistry, ToolSpec};
