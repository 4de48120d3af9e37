//! Playlist resolution endpoint
//!
//! `GET /api/resolve?q=<text>&k=<n>` returns up to `k` catalog items by
//! descending similarity. An empty catalog yields an empty list.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::services::{ChatError, EmbeddingIndex, Match};

/// Largest `k` accepted by the endpoint
pub const MAX_K: usize = 50;

#[derive(Clone)]
pub struct ResolveState {
    pub index: Arc<EmbeddingIndex>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub q: Option<String>,
    pub k: Option<usize>,
}

pub fn resolve_router(state: ResolveState) -> Router {
    Router::new().route("/resolve", get(resolve)).with_state(state)
}

async fn resolve(
    State(state): State<ResolveState>,
    Query(params): Query<ResolveParams>,
) -> ApiResult<Json<Vec<Match>>> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::InvalidQueryParam {
            name: "q",
            reason: "required".to_string(),
        })?;

    let k = params.k.unwrap_or(1);
    if k > MAX_K {
        return Err(ApiError::InvalidQueryParam {
            name: "k",
            reason: format!("must be at most {}", MAX_K),
        });
    }

    let matches = state
        .index
        .query(query, k)
        .await
        .map_err(ChatError::from)?;

    Ok(Json(matches))
}
