//! Conversation persistence layer for Cadence
//!
//! The [`ConversationStore`] trait is the seam between the conversation
//! service and storage. Two implementations are provided:
//! - [`PgConversationStore`] - PostgreSQL via sqlx, used in production
//! - [`MemoryConversationStore`] - process-local maps, for development and tests
//!
//! Every turn append is durable on return, so a crash mid-run leaves a
//! resumable prefix of the transcript.

pub mod memory;
pub mod postgres;

pub use memory::MemoryConversationStore;
pub use postgres::PgConversationStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Session, SessionSummary, StoredTurn, Turn, User};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("json serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence interface for users, sessions and transcripts
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Verify the backend is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Find the user with `display_name`, creating it if absent
    async fn get_or_create_user(&self, display_name: &str) -> StoreResult<User>;

    /// Find a user by display name without creating it
    async fn find_user(&self, display_name: &str) -> StoreResult<Option<User>>;

    /// Create an empty, unlabeled session owned by `user_id`
    async fn create_session(&self, user_id: Uuid) -> StoreResult<Session>;

    async fn get_session(&self, session_id: Uuid) -> StoreResult<Option<Session>>;

    /// Sessions of a user, most recent first, at most `limit` rows
    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<SessionSummary>>;

    /// Set a session label; returns false if the session does not exist
    async fn rename_session(&self, session_id: Uuid, label: &str) -> StoreResult<bool>;

    /// Delete a session and all of its turns; returns false if it did not exist
    async fn delete_session(&self, session_id: Uuid) -> StoreResult<bool>;

    /// All turns of a session in append order; empty for unknown sessions
    async fn load_turns(&self, session_id: Uuid) -> StoreResult<Vec<StoredTurn>>;

    /// Append one turn at the end of a session
    ///
    /// Appending the first user turn of an unlabeled session also sets the
    /// label from that turn's text, atomically with the append.
    async fn append_turn(&self, session_id: Uuid, turn: &Turn) -> StoreResult<StoredTurn>;
}
