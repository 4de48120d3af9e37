//! Chat model backend
//!
//! [`ChatModel`] is what the agent graph consults on every inference round.
//! [`OllamaChatModel`] implements it on Ollama's tool-calling chat endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use cadence_ollama_client::{ChatMessage, OllamaClient, OllamaError, ToolCall, ToolDefinition};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::tools::ToolSpec;
use crate::models::{Role, Turn};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model backend error: {0}")]
    Backend(#[from] OllamaError),

    #[error("model returned an incomplete response: {0}")]
    Incomplete(String),
}

/// A tool call as proposed by the model, before ids are settled
#[derive(Debug, Clone, PartialEq)]
pub struct ModelToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// One inference result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ModelToolCall>,
}

impl ModelReply {
    /// Plain text reply with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the next assistant turn for `context`
    async fn complete(
        &self,
        context: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, ModelError>;
}

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Cadence, a friendly assistant that plays music and videos for the user.

## Your Tools
- play_playlist: play one of the user's saved playlists by name or mood
- search_video: show YouTube search results for anything the user wants to watch or hear
- open_url: open a specific web page

## Guidelines
- Prefer play_playlist when the user asks for music that could be a saved playlist
- Use search_video when nothing in the saved playlists fits
- After a tool runs, tell the user briefly what happened
- Keep replies short and conversational"#;

/// [`ChatModel`] backed by Ollama
pub struct OllamaChatModel {
    client: OllamaClient,
    system_prompt: String,
}

impl OllamaChatModel {
    pub fn new(client: OllamaClient) -> Self {
        Self::with_system_prompt(client, DEFAULT_SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(client: OllamaClient, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    #[instrument(skip_all, fields(turns = context.len()))]
    async fn complete(
        &self,
        context: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, ModelError> {
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend(to_messages(context));

        let definitions = tools
            .iter()
            .map(|spec| {
                ToolDefinition::function(spec.name, spec.description, spec.parameters.clone())
            })
            .collect();

        let response = self.client.chat_with_tools(messages, definitions).await?;
        if !response.done {
            return Err(ModelError::Incomplete(
                response
                    .done_reason
                    .unwrap_or_else(|| "response not finished".to_string()),
            ));
        }

        let tool_calls: Vec<ModelToolCall> = response
            .message
            .tool_calls
            .into_iter()
            .map(from_tool_call)
            .collect();

        debug!(tool_calls = tool_calls.len(), "Model replied");

        Ok(ModelReply {
            content: response.message.content,
            tool_calls,
        })
    }
}

/// Convert a transcript into chat messages
///
/// Consecutive user turns, left behind by runs that failed before the model
/// answered, are merged into one message. Tool results carry the name of
/// the tool that produced them.
pub fn to_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    let tool_names: HashMap<&str, &str> = turns
        .iter()
        .flat_map(|turn| turn.tool_requests.iter())
        .map(|request| (request.id.as_str(), request.name.as_str()))
        .collect();

    let mut messages: Vec<ChatMessage> = Vec::with_capacity(turns.len());

    for turn in turns {
        match turn.role {
            Role::User => {
                if let Some(last) = messages.last_mut() {
                    if last.role == cadence_ollama_client::ChatRole::User {
                        last.content.push_str("\n\n");
                        last.content.push_str(&turn.content);
                        continue;
                    }
                }
                messages.push(ChatMessage::user(&turn.content));
            }
            Role::Assistant if turn.tool_requests.is_empty() => {
                messages.push(ChatMessage::assistant(&turn.content));
            }
            Role::Assistant => {
                let calls = turn
                    .tool_requests
                    .iter()
                    .map(|request| {
                        ToolCall::new(
                            Some(request.id.clone()),
                            &request.name,
                            Value::Object(request.arguments.clone()),
                        )
                    })
                    .collect();
                messages.push(ChatMessage::assistant_with_tools(&turn.content, calls));
            }
            Role::Tool => {
                let request_id = turn.tool_request_id.as_deref().unwrap_or_default();
                let name = tool_names.get(request_id).copied().unwrap_or_default();
                messages.push(ChatMessage::tool(&turn.content, name, request_id));
            }
        }
    }

    messages
}

fn from_tool_call(call: ToolCall) -> ModelToolCall {
    let arguments = match call.function.arguments {
        Value::Object(map) => map,
        // Some models send the arguments object JSON-encoded as a string
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                warn!(tool = %call.function.name, "Discarding unparseable tool arguments");
                Map::new()
            }
        },
        Value::Null => Map::new(),
        other => {
            warn!(
                tool = %call.function.name,
                arguments = %other,
                "Tool arguments are not an object"
            );
            Map::new()
        }
    };

    ModelToolCall {
        id: call.id,
        name: call.function.name,
        arguments,
    }
}
