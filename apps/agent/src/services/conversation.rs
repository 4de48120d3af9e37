//! Conversation service
//!
//! Owns the session directory and drives agent runs. Runs on the same
//! session are serialized; runs on different sessions proceed in parallel.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::agent::{AgentGraph, ChatError, ChatResult, RunOutcome, TurnSink};
use crate::models::{pair_history, unanswered_requests, HistoryEntry, Session, SessionSummary, Turn};
use crate::repositories::{ConversationStore, StoreResult};

/// Maximum accepted user message length, in characters
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Maximum accepted session label length, in characters
pub const MAX_LABEL_LENGTH: usize = 100;

/// Upper bound on a session listing
pub const MAX_LIST_LIMIT: i64 = 100;

/// Result text recorded for requests a crashed run never answered
pub const INTERRUPTED_TOOL_RESULT: &str = "tool run was interrupted before a result was recorded";

/// Persists each turn of a run as it is produced
struct StoreSink<'a> {
    store: &'a dyn ConversationStore,
    session_id: Uuid,
}

#[async_trait]
impl TurnSink for StoreSink<'_> {
    async fn record(&self, turn: &Turn) -> StoreResult<()> {
        self.store.append_turn(self.session_id, turn).await?;
        Ok(())
    }
}

pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    graph: AgentGraph,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    list_limit: i64,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, graph: AgentGraph, list_limit: i64) -> Self {
        Self {
            store,
            graph,
            locks: DashMap::new(),
            list_limit: list_limit.clamp(1, MAX_LIST_LIMIT),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    fn session_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop `lock` and forget the entry unless another caller still holds it
    fn release_lock(&self, session_id: Uuid, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(&session_id, |_, entry| Arc::strong_count(entry) == 1);
    }

    // ==================== Session Directory ====================

    /// Create an empty session, creating the user on first use
    #[instrument(skip(self))]
    pub async fn create_session(&self, display_name: &str) -> ChatResult<Session> {
        let display_name = validate_display_name(display_name)?;
        let user = self.store.get_or_create_user(display_name).await?;
        let session = self.store.create_session(user.id).await?;

        info!(session_id = %session.id, user_id = %user.id, "Session created");
        Ok(session)
    }

    /// Sessions of a user, most recent first; unknown users have none
    #[instrument(skip(self))]
    pub async fn list_sessions(
        &self,
        display_name: &str,
        limit: Option<i64>,
    ) -> ChatResult<Vec<SessionSummary>> {
        let limit = limit.unwrap_or(self.list_limit).clamp(1, MAX_LIST_LIMIT);

        match self.store.find_user(display_name).await? {
            Some(user) => Ok(self.store.list_sessions(user.id, limit).await?),
            None => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn rename_session(&self, session_id: Uuid, label: &str) -> ChatResult<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ChatError::InvalidInput("label cannot be empty".to_string()));
        }
        if label.chars().count() > MAX_LABEL_LENGTH {
            return Err(ChatError::InvalidInput(format!(
                "label exceeds maximum length of {} characters",
                MAX_LABEL_LENGTH
            )));
        }

        if !self.store.rename_session(session_id, label).await? {
            return Err(ChatError::SessionNotFound(session_id));
        }
        Ok(())
    }

    /// Delete a session and its turns, waiting for any run in progress
    #[instrument(skip(self))]
    pub async fn delete_session(&self, session_id: Uuid) -> ChatResult<()> {
        if self.store.get_session(session_id).await?.is_none() {
            return Err(ChatError::SessionNotFound(session_id));
        }

        let lock = self.session_lock(session_id);
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete_session(session_id).await
        };
        self.release_lock(session_id, lock);

        if !deleted? {
            return Err(ChatError::SessionNotFound(session_id));
        }

        info!(%session_id, "Session deleted");
        Ok(())
    }

    // ==================== Transcript ====================

    /// All turns of a session in order; empty for unknown sessions
    pub async fn load(&self, session_id: Uuid) -> ChatResult<Vec<Turn>> {
        let stored = self.store.load_turns(session_id).await?;
        Ok(stored.into_iter().map(Turn::from).collect())
    }

    /// User messages paired with their final replies
    pub async fn history(&self, session_id: Uuid) -> ChatResult<Vec<HistoryEntry>> {
        let turns = self.load(session_id).await?;
        Ok(pair_history(&turns))
    }

    /// Append one turn to a session
    pub async fn append(&self, session_id: Uuid, turn: &Turn) -> ChatResult<()> {
        self.store.append_turn(session_id, turn).await?;
        Ok(())
    }

    // ==================== Runs ====================

    /// Run the agent on a new user message
    ///
    /// Returns `None` without touching the session when the message is blank.
    #[instrument(skip(self, user_text), fields(len = user_text.len()))]
    pub async fn advance(
        &self,
        session_id: Uuid,
        user_text: &str,
    ) -> ChatResult<Option<RunOutcome>> {
        let Some(text) = validate_message(user_text)? else {
            debug!("Ignoring empty message");
            return Ok(None);
        };

        if self.store.get_session(session_id).await?.is_none() {
            return Err(ChatError::SessionNotFound(session_id));
        }

        let lock = self.session_lock(session_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.run_locked(session_id, text).await
        };
        self.release_lock(session_id, lock);

        let outcome = outcome?;
        info!(
            %session_id,
            rounds = outcome.rounds,
            appended = outcome.appended,
            "Message handled"
        );
        Ok(Some(outcome))
    }

    /// Body of [`advance`](Self::advance); the session lock is held
    async fn run_locked(&self, session_id: Uuid, text: &str) -> ChatResult<RunOutcome> {
        // The session may have been deleted while we waited for the lock
        if self.store.get_session(session_id).await?.is_none() {
            return Err(ChatError::SessionNotFound(session_id));
        }

        let sink = StoreSink {
            store: self.store.as_ref(),
            session_id,
        };

        let mut transcript = self.load(session_id).await?;
        let repaired = self.repair(&mut transcript, &sink).await?;

        let user_turn = Turn::user(text);
        sink.record(&user_turn).await?;
        transcript.push(user_turn);

        let mut outcome = self.graph.run(&mut transcript, &sink).await?;
        outcome.appended += repaired + 1;
        Ok(outcome)
    }

    /// Start a new session for `display_name` with its first message
    ///
    /// Blank messages create nothing.
    #[instrument(skip(self, user_text))]
    pub async fn start(
        &self,
        display_name: &str,
        user_text: &str,
    ) -> ChatResult<Option<(Session, RunOutcome)>> {
        if validate_message(user_text)?.is_none() {
            return Ok(None);
        }

        let session = self.create_session(display_name).await?;
        let outcome = self.advance(session.id, user_text).await?;

        // Re-read so the label set by the first user turn is included
        let session = self
            .store
            .get_session(session.id)
            .await?
            .unwrap_or(session);

        Ok(outcome.map(|outcome| (session, outcome)))
    }

    /// Answer requests a crashed run left without a tool turn
    async fn repair(&self, transcript: &mut Vec<Turn>, sink: &StoreSink<'_>) -> ChatResult<usize> {
        let dangling: Vec<String> = unanswered_requests(transcript)
            .into_iter()
            .map(|request| request.id.clone())
            .collect();

        if dangling.is_empty() {
            return Ok(0);
        }

        warn!(
            session_id = %sink.session_id,
            count = dangling.len(),
            "Recording results for interrupted tool requests"
        );

        let count = dangling.len();
        for request_id in dangling {
            let turn = Turn::tool(request_id, INTERRUPTED_TOOL_RESULT);
            sink.record(&turn).await?;
            transcript.push(turn);
        }
        Ok(count)
    }
}

fn validate_display_name(display_name: &str) -> ChatResult<&str> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(ChatError::InvalidInput(
            "display name cannot be empty".to_string(),
        ));
    }
    Ok(display_name)
}

/// Trimmed message, `None` when blank
fn validate_message(text: &str) -> ChatResult<Option<&str>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ChatError::InvalidInput(format!(
            "message exceeds maximum length of {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(Some(text))
}
