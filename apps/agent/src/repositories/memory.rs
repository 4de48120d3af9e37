//! In-memory conversation store
//!
//! Keeps users, sessions and turns in process-local maps behind a single
//! `RwLock`. Data does not survive a restart.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ConversationStore, StoreError, StoreResult};
use crate::models::{
    derive_label, Role, Session, SessionSummary, StoredTurn, Turn, User, UNNAMED_LABEL,
};

struct SessionEntry {
    session: Session,
    /// Creation order, breaks `created_at` ties in listings
    order: u64,
    turns: Vec<StoredTurn>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    sessions: HashMap<Uuid, SessionEntry>,
    next_order: u64,
}

/// Conversation store held entirely in memory
#[derive(Default)]
pub struct MemoryConversationStore {
    state: RwLock<MemoryState>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_or_create_user(&self, display_name: &str) -> StoreResult<User> {
        let mut state = self.write();
        let user = state
            .users
            .entry(display_name.to_string())
            .or_insert_with(|| User {
                id: Uuid::new_v4(),
                display_name: display_name.to_string(),
                created_at: Utc::now(),
            });
        Ok(user.clone())
    }

    async fn find_user(&self, display_name: &str) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(display_name).cloned())
    }

    async fn create_session(&self, user_id: Uuid) -> StoreResult<Session> {
        let mut state = self.write();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            label: None,
            created_at: Utc::now(),
        };
        let order = state.next_order;
        state.next_order += 1;
        state.sessions.insert(
            session.id,
            SessionEntry {
                session: session.clone(),
                order,
                turns: Vec::new(),
            },
        );
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        Ok(self
            .read()
            .sessions
            .get(&session_id)
            .map(|entry| entry.session.clone()))
    }

    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<SessionSummary>> {
        let state = self.read();
        let mut entries: Vec<&SessionEntry> = state
            .sessions
            .values()
            .filter(|entry| entry.session.user_id == user_id)
            .collect();

        entries.sort_by(|a, b| {
            b.session
                .created_at
                .cmp(&a.session.created_at)
                .then(b.order.cmp(&a.order))
        });

        Ok(entries
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|entry| SessionSummary {
                id: entry.session.id,
                label: entry
                    .session
                    .label
                    .clone()
                    .unwrap_or_else(|| UNNAMED_LABEL.to_string()),
                created_at: entry.session.created_at,
                turn_count: entry.turns.len() as i64,
            })
            .collect())
    }

    async fn rename_session(&self, session_id: Uuid, label: &str) -> StoreResult<bool> {
        let mut state = self.write();
        match state.sessions.get_mut(&session_id) {
            Some(entry) => {
                entry.session.label = Some(label.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, session_id: Uuid) -> StoreResult<bool> {
        Ok(self.write().sessions.remove(&session_id).is_some())
    }

    async fn load_turns(&self, session_id: Uuid) -> StoreResult<Vec<StoredTurn>> {
        Ok(self
            .read()
            .sessions
            .get(&session_id)
            .map(|entry| entry.turns.clone())
            .unwrap_or_default())
    }

    async fn append_turn(&self, session_id: Uuid, turn: &Turn) -> StoreResult<StoredTurn> {
        let mut state = self.write();
        let entry = state
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;

        let stored = StoredTurn {
            id: Uuid::new_v4(),
            session_id,
            sequence_number: entry.turns.len() as i32 + 1,
            role: turn.role,
            content: turn.content.clone(),
            tool_requests: turn.tool_requests.clone(),
            tool_request_id: turn.tool_request_id.clone(),
            created_at: Utc::now(),
        };

        if turn.role == Role::User && entry.session.label.is_none() {
            entry.session.label = Some(derive_label(&turn.content));
        }

        entry.turns.push(stored.clone());
        Ok(stored)
    }
}
