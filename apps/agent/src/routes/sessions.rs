//! Session directory and chat HTTP route handlers
//!
//! - `POST /api/users/:name/sessions` - create a session
//! - `GET /api/users/:name/sessions?limit=` - list sessions, newest first
//! - `POST /api/users/:name/messages` - start a session with a first message
//! - `PATCH /api/sessions/:id` - rename
//! - `DELETE /api/sessions/:id` - delete with all turns
//! - `GET /api/sessions/:id/turns` - raw transcript
//! - `GET /api/sessions/:id/history` - user messages paired with replies
//! - `POST /api/sessions/:id/messages` - run the agent on a message

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{HistoryEntry, Session, SessionSummary, Turn};
use crate::services::{ConversationService, RunOutcome};

#[derive(Clone)]
pub struct ChatState {
    pub service: Arc<ConversationService>,
}

impl ChatState {
    pub fn new(service: Arc<ConversationService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionListing {
    #[serde(flatten)]
    pub summary: SessionSummary,
    /// `"<label> (<n> messages)"`
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
    pub rounds: usize,
    pub turns_appended: usize,
}

impl From<RunOutcome> for MessageResponse {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            reply: outcome.reply,
            rounds: outcome.rounds,
            turns_appended: outcome.appended,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session: Session,
    #[serde(flatten)]
    pub message: MessageResponse,
}

pub fn sessions_router(state: ChatState) -> Router {
    Router::new()
        .route(
            "/users/:name/sessions",
            post(create_session).get(list_sessions),
        )
        .route("/users/:name/messages", post(start_session))
        .route(
            "/sessions/:id",
            patch(rename_session).delete(delete_session),
        )
        .route("/sessions/:id/turns", get(load_turns))
        .route("/sessions/:id/history", get(load_history))
        .route("/sessions/:id/messages", post(send_message))
        .with_state(state)
}

async fn create_session(
    State(state): State<ChatState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let session = state.service.create_session(&name).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<ChatState>,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<SessionListing>>> {
    if let Some(limit) = params.limit {
        if limit < 1 {
            return Err(ApiError::InvalidQueryParam {
                name: "limit",
                reason: "must be at least 1".to_string(),
            });
        }
    }

    let sessions = state.service.list_sessions(&name, params.limit).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|summary| SessionListing {
                display: summary.display(),
                summary,
            })
            .collect(),
    ))
}

async fn rename_session(
    State(state): State<ChatState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameRequest>,
) -> ApiResult<StatusCode> {
    state.service.rename_session(id, &body.label).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_session(
    State(state): State<ChatState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.service.delete_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn load_turns(
    State(state): State<ChatState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Turn>>> {
    Ok(Json(state.service.load(id).await?))
}

async fn load_history(
    State(state): State<ChatState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.service.history(id).await?))
}

/// 200 with the reply, or 204 when the message was blank
async fn send_message(
    State(state): State<ChatState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageRequest>,
) -> ApiResult<Response> {
    match state.service.advance(id, &body.message).await? {
        Some(outcome) => Ok(Json(MessageResponse::from(outcome)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn start_session(
    State(state): State<ChatState>,
    Path(name): Path<String>,
    Json(body): Json<MessageRequest>,
) -> ApiResult<Response> {
    match state.service.start(&name, &body.message).await? {
        Some((session, outcome)) => Ok((
            StatusCode::CREATED,
            Json(StartResponse {
                session,
                message: outcome.into(),
            }),
        )
            .into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
