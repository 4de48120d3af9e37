//! Agent graph: alternating inference and tool dispatch
//!
//! A run starts at Infer. If the model answers with plain text the run ends
//! and that text is the reply. If it requests tools, every request is
//! executed, one tool turn per request is recorded, and the model is
//! consulted again. Each produced turn goes to a [`TurnSink`] before the
//! graph moves on, so an interrupted run leaves a valid transcript prefix.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::index::IndexError;
use super::model::{ChatModel, ModelError, ModelReply, ModelToolCall};
use super::tools::{ToolRegistry, ToolSpec};
use crate::error::ApiError;
use crate::models::{ToolRequest, Turn};
use crate::repositories::{StoreError, StoreResult};

/// Dispatch rounds allowed per run
pub const DEFAULT_MAX_ROUNDS: usize = 5;

/// Chat run errors
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("store error: {0}")]
    Store(StoreError),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("model requested tools after {0} rounds")]
    RoundLimitExceeded(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model inference timed out")]
    Timeout,

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => Self::SessionNotFound(id),
            other => Self::Store(other),
        }
    }
}

// ==================== ApiError Integration ====================

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Store(e) => ApiError::from(e),
            ChatError::SessionNotFound(id) => ApiError::not_found("session", id.to_string()),
            ChatError::Model(e) => ApiError::AiService(e.to_string()),
            ChatError::RoundLimitExceeded(n) => ApiError::RoundLimitExceeded(n),
            ChatError::InvalidInput(msg) => ApiError::ValidationError(msg),
            ChatError::Timeout => ApiError::UpstreamTimeout("model inference".to_string()),
            ChatError::Index(e) => ApiError::AiService(e.to_string()),
        }
    }
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Receives every turn a run produces, in production order
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn record(&self, turn: &Turn) -> StoreResult<()>;
}

/// Result of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Content of the final assistant turn
    pub reply: String,
    /// Inference calls made
    pub rounds: usize,
    /// Turns recorded by this run
    pub appended: usize,
}

pub struct AgentGraph {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    max_rounds: usize,
    model_timeout: Duration,
}

impl AgentGraph {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        max_rounds: usize,
        model_timeout: Duration,
    ) -> Self {
        Self {
            model,
            tools,
            max_rounds,
            model_timeout,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Drive `transcript` to a final assistant reply
    ///
    /// Produced turns are pushed onto `transcript` and handed to `sink`.
    #[instrument(skip_all, fields(turns = transcript.len()))]
    pub async fn run(
        &self,
        transcript: &mut Vec<Turn>,
        sink: &dyn TurnSink,
    ) -> ChatResult<RunOutcome> {
        let specs = self.tools.specs();
        let mut rounds = 0;
        let mut dispatched = 0;
        let mut appended = 0;

        loop {
            rounds += 1;
            let reply = self.infer(transcript, &specs).await?;

            if reply.tool_calls.is_empty() {
                let turn = Turn::assistant(reply.content, Vec::new());
                sink.record(&turn).await?;
                appended += 1;

                info!(rounds, appended, "Run finished");
                let reply = turn.content.clone();
                transcript.push(turn);
                return Ok(RunOutcome {
                    reply,
                    rounds,
                    appended,
                });
            }

            if dispatched >= self.max_rounds {
                warn!(
                    max_rounds = self.max_rounds,
                    requested = reply.tool_calls.len(),
                    "Round limit reached, dropping tool requests"
                );
                return Err(ChatError::RoundLimitExceeded(self.max_rounds));
            }

            let ModelReply {
                content,
                tool_calls,
            } = reply;
            let turn = Turn::assistant(content, settle_requests(tool_calls, transcript));
            sink.record(&turn).await?;
            appended += 1;
            transcript.push(turn);

            let requests = &transcript[transcript.len() - 1].tool_requests;
            debug!(round = rounds, requests = requests.len(), "Dispatching tools");

            let results =
                join_all(requests.iter().map(|request| self.tools.execute(request))).await;
            let tool_turns: Vec<Turn> = requests
                .iter()
                .zip(results)
                .map(|(request, result)| Turn::tool(&request.id, result))
                .collect();

            for turn in tool_turns {
                sink.record(&turn).await?;
                appended += 1;
                transcript.push(turn);
            }

            dispatched += 1;
        }
    }

    async fn infer(&self, transcript: &[Turn], specs: &[ToolSpec]) -> ChatResult<ModelReply> {
        let completion = self.model.complete(transcript, specs);
        match tokio::time::timeout(self.model_timeout, completion).await {
            Ok(reply) => Ok(reply?),
            Err(_) => {
                warn!(timeout = ?self.model_timeout, "Model inference timed out");
                Err(ChatError::Timeout)
            }
        }
    }
}

/// Turn model tool calls into requests with ids unique in the transcript
///
/// Missing, duplicate and overlong model ids are replaced with generated ones.
fn settle_requests(calls: Vec<ModelToolCall>, transcript: &[Turn]) -> Vec<ToolRequest> {
    let mut seen: HashSet<String> = transcript
        .iter()
        .flat_map(|turn| turn.tool_requests.iter().map(|r| r.id.clone()))
        .collect();

    calls
        .into_iter()
        .map(|call| {
            let id = match call.id {
                Some(id)
                    if !id.is_empty()
                        && id.len() <= ToolRequest::MAX_ID_LEN
                        && !seen.contains(&id) =>
                {
                    id
                }
                _ => ToolRequest::generate_id(),
            };
            seen.insert(id.clone());
            ToolRequest::new(id, call.name, call.arguments)
        })
        .collect()
}
