//! HTTP route handlers for the Cadence agent
//!
//! - Health check and status endpoints
//! - Session directory and chat endpoints
//! - Playlist resolution

pub mod health;
pub mod resolve;
pub mod sessions;

pub use health::{health_router, HealthState};
pub use resolve::{resolve_router, ResolveState};
pub use sessions::{sessions_router, ChatState};

use axum::{routing::get, Router};

/// Assemble the full application router, without middleware layers
pub fn build_router(health: HealthState, chat: ChatState, resolve: ResolveState) -> Router {
    Router::new()
        .route("/", get(root))
        .nest("/health", health_router(health))
        .nest("/api", sessions_router(chat).merge(resolve_router(resolve)))
}

async fn root() -> &'static str {
    "Cadence - conversational music agent"
}
