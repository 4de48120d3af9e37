//! Data models for Cadence
//!
//! This module contains:
//! - Conversation turns and their persisted rows
//! - Users, sessions and session listings
//! - The playlist catalog

pub mod catalog;
pub mod chat;
pub mod session;

pub use catalog::{load_catalog, CatalogError, CatalogItem};
pub use chat::{unanswered_requests, Role, StoredTurn, ToolRequest, Turn};
pub use session::{
    derive_label, pair_history, HistoryEntry, Session, SessionSummary, User, LABEL_MAX_CHARS,
    UNNAMED_LABEL,
};
