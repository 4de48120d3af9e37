//! User and session directory models

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::chat::{Role, Turn};

/// Number of leading characters of the first user turn used as a session label
pub const LABEL_MAX_CHARS: usize = 30;

/// Label shown for sessions that never received a user turn
pub const UNNAMED_LABEL: &str = "[unnamed]";

/// User record from the users table
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    /// Unique display name
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Session record from the sessions table
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Session {
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Human-readable label, `None` until the first user turn
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row of a session listing
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    /// Label, or [`UNNAMED_LABEL`]
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// Number of stored turns
    pub turn_count: i64,
}

impl SessionSummary {
    /// `"<label> (<n> messages)"`
    pub fn display(&self) -> String {
        format!("{} ({} messages)", self.label, self.turn_count)
    }
}

/// Derive a session label from the first user turn's text
pub fn derive_label(text: &str) -> String {
    text.trim().chars().take(LABEL_MAX_CHARS).collect()
}

/// One user message and the assistant's final reply to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub user: String,
    /// `None` when the run for this message failed
    pub assistant: Option<String>,
}

/// Pair user turns with the final assistant reply that followed them
///
/// Tool turns and tool-requesting assistant turns are omitted.
pub fn pair_history(turns: &[Turn]) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = Vec::new();

    for turn in turns {
        match turn.role {
            Role::User => entries.push(HistoryEntry {
                user: turn.content.clone(),
                assistant: None,
            }),
            Role::Assistant if turn.is_final_reply() => {
                if let Some(last) = entries.last_mut() {
                    if last.assistant.is_none() {
                        last.assistant = Some(turn.content.clone());
                    }
                }
            }
            _ => {}
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ToolRequest;

    #[test]
    fn test_derive_label_truncates_on_chars() {
        let text = "é".repeat(40);
        assert_eq!(derive_label(&text).chars().count(), LABEL_MAX_CHARS);
        assert_eq!(derive_label("  play lofi  "), "play lofi");
    }

    #[test]
    fn test_summary_display() {
        let summary = SessionSummary {
            id: Uuid::new_v4(),
            label: "play lofi".to_string(),
            created_at: Utc::now(),
            turn_count: 4,
        };
        assert_eq!(summary.display(), "play lofi (4 messages)");
    }

    #[test]
    fn test_pair_history_skips_tool_traffic() {
        let turns = vec![
            Turn::user("play Lofi Beats"),
            Turn::assistant(
                "",
                vec![ToolRequest::new("c1", "play_playlist", Default::default())],
            ),
            Turn::tool("c1", "playing playlist for Lofi Beats"),
            Turn::assistant("Enjoy!", vec![]),
            Turn::user("thanks"),
        ];

        let history = pair_history(&turns);
        assert_eq!(
            history,
            vec![
                HistoryEntry {
                    user: "play Lofi Beats".to_string(),
                    assistant: Some("Enjoy!".to_string()),
                },
                HistoryEntry {
                    user: "thanks".to_string(),
                    assistant: None,
                },
            ]
        );
    }
}
