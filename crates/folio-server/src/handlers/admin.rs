use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use folio_core::{SnapshotId, DEFAULT_TREE_DEPTH};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(serde::Deserialize, Default)]
pub struct TreeQuery {
    pub depth: Option<usize>,
}

/// GET /health: unauthenticated health check.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.inner.start_time.elapsed().as_secs(),
    }))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store().stats())
}

/// GET /snapshots/{id}/resolve: live id for any id ever issued.
pub async fn resolve_historical(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let id = parse_id(id)?;
    let live = state.store().resolve_historical(&id);
    Ok(Json(serde_json::json!({
        "requested": id,
        "live": live,
        "redirected": live != id,
    }))
    .into_response())
}

/// GET /snapshots/{id}/tree?depth=
pub async fn display_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TreeQuery>,
) -> Result<Response, ServerError> {
    let id = parse_id(id)?;
    let depth = query.depth.unwrap_or(DEFAULT_TREE_DEPTH);
    Ok(Json(state.store().display_tree(&id, depth).await?).into_response())
}

fn parse_id(id: String) -> Result<SnapshotId, ServerError> {
    let id = SnapshotId::new(id);
    if !id.is_well_formed() {
        return Err(ServerError::BadRequest(format!("malformed snapshot id '{id}'")));
    }
    Ok(id)
}
