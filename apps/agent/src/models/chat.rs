//! Conversation turn models
//!
//! A transcript is an ordered list of [`Turn`]s. Assistant turns may carry
//! [`ToolRequest`]s; every request is answered by exactly one tool turn
//! carrying the same request id before the model is consulted again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

/// Turn author, stored lowercase in the `turns.role` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Returns the string representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tool invocation requested by an assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Identifier echoed by the answering tool turn
    pub id: String,
    /// Tool name as advertised to the model
    pub name: String,
    /// Argument object
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    /// Longest id the `turns.tool_request_id` column stores
    pub const MAX_ID_LEN: usize = 255;

    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Fresh request id in the `call_<uuid>` form
    pub fn generate_id() -> String {
        format!("call_{}", Uuid::new_v4().simple())
    }
}

/// One immutable entry of a session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Text; empty for assistant turns that only request tools
    #[serde(default)]
    pub content: String,
    /// Requests made by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
    /// Request answered by a tool turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_request_id: Option<String>,
}

impl Turn {
    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_request_id: None,
        }
    }

    /// Create an assistant turn, optionally requesting tools
    pub fn assistant(content: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_requests,
            tool_request_id: None,
        }
    }

    /// Create a tool turn answering `request_id`
    pub fn tool(request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_request_id: Some(request_id.into()),
        }
    }

    /// Whether this is an assistant turn that requests tools
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_requests.is_empty()
    }

    /// Whether this is an assistant turn carrying a final answer
    pub fn is_final_reply(&self) -> bool {
        self.role == Role::Assistant && self.tool_requests.is_empty()
    }
}

/// Tool requests at the end of a transcript that have no answering tool turn
///
/// Only the trailing assistant turn can be left unanswered: a run records
/// every tool turn of a round before consulting the model again.
pub fn unanswered_requests(turns: &[Turn]) -> Vec<&ToolRequest> {
    let Some(position) = turns.iter().rposition(|t| t.role != Role::Tool) else {
        return Vec::new();
    };

    let last = &turns[position];
    if !last.requests_tools() {
        return Vec::new();
    }

    let answered: Vec<&str> = turns[position + 1..]
        .iter()
        .filter_map(|t| t.tool_request_id.as_deref())
        .collect();

    last.tool_requests
        .iter()
        .filter(|r| !answered.contains(&r.id.as_str()))
        .collect()
}

/// Persisted turn row from the `turns` table
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredTurn {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Position within the session, starting at 1
    pub sequence_number: i32,
    pub role: Role,
    pub content: String,
    #[sqlx(json)]
    pub tool_requests: Vec<ToolRequest>,
    pub tool_request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredTurn> for Turn {
    fn from(row: StoredTurn) -> Self {
        Self {
            role: row.role,
            content: row.content,
            tool_requests: row.tool_requests,
            tool_request_id: row.tool_request_id,
        }
    }
}
