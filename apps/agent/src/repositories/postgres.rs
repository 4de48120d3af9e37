//! PostgreSQL conversation store

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{ConversationStore, StoreError, StoreResult};
use crate::models::{derive_label, Role, Session, SessionSummary, StoredTurn, Turn, User};

const TURN_COLUMNS: &str =
    "id, session_id, sequence_number, role, content, tool_requests, tool_request_id, created_at";

/// Conversation store backed by PostgreSQL
///
/// Centralizes all user, session and turn queries.
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    /// Create a new PgConversationStore instance
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert keyed on the unique display name
    ///
    /// The no-op `DO UPDATE` makes `RETURNING` yield the existing row on conflict.
    #[instrument(skip(self))]
    async fn get_or_create_user(&self, display_name: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, display_name)
            VALUES ($1, $2)
            ON CONFLICT (display_name) DO UPDATE SET display_name = EXCLUDED.display_name
            RETURNING id, display_name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_user(&self, display_name: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, display_name, created_at FROM users WHERE display_name = $1",
        )
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn create_session(&self, user_id: Uuid) -> StoreResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id)
            VALUES ($1, $2)
            RETURNING id, user_id, label, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: Uuid) -> StoreResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, label, created_at FROM sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    #[instrument(skip(self))]
    async fn list_sessions(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<SessionSummary>> {
        let sessions = sqlx::query_as::<_, SessionSummary>(
            r#"
            SELECT s.id,
                   COALESCE(s.label, '[unnamed]') AS label,
                   s.created_at,
                   COUNT(t.id) AS turn_count
            FROM sessions s
            LEFT JOIN turns t ON t.session_id = s.id
            WHERE s.user_id = $1
            GROUP BY s.id, s.label, s.created_at
            ORDER BY s.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    #[instrument(skip(self))]
    async fn rename_session(&self, session_id: Uuid, label: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE sessions SET label = $2 WHERE id = $1")
            .bind(session_id)
            .bind(label)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Turns go with the session through `ON DELETE CASCADE`
    #[instrument(skip(self))]
    async fn delete_session(&self, session_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn load_turns(&self, session_id: Uuid) -> StoreResult<Vec<StoredTurn>> {
        let turns = sqlx::query_as::<_, StoredTurn>(&format!(
            "SELECT {} FROM turns WHERE session_id = $1 ORDER BY sequence_number ASC",
            TURN_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(turns)
    }

    /// Append a turn under a row lock on its session
    ///
    /// The lock serializes sequence number assignment with concurrent appends
    /// and with the label update for the first user turn.
    #[instrument(skip(self, turn), fields(role = %turn.role))]
    async fn append_turn(&self, session_id: Uuid, turn: &Turn) -> StoreResult<StoredTurn> {
        let tool_requests = serde_json::to_value(&turn.tool_requests)?;

        let mut tx = self.pool.begin().await?;

        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;

        if locked.is_none() {
            return Err(StoreError::SessionNotFound(session_id));
        }

        let stored = sqlx::query_as::<_, StoredTurn>(&format!(
            r#"
            INSERT INTO turns (id, session_id, sequence_number, role, content, tool_requests, tool_request_id)
            VALUES (
                $1, $2,
                (SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM turns WHERE session_id = $2),
                $3, $4, $5, $6
            )
            RETURNING {}
            "#,
            TURN_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(turn.role)
        .bind(&turn.content)
        .bind(tool_requests)
        .bind(&turn.tool_request_id)
        .fetch_one(&mut *tx)
        .await?;

        if turn.role == Role::User {
            sqlx::query("UPDATE sessions SET label = $2 WHERE id = $1 AND label IS NULL")
                .bind(session_id)
                .bind(derive_label(&turn.content))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(stored)
    }
}
