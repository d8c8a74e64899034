use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use folio_core::{Content, FileSet};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct PublishRequest {
    pub files: FileSet,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(serde::Deserialize)]
pub struct RollbackRequest {
    pub version: u32,
}

#[derive(serde::Deserialize)]
pub struct SiteFileRequest {
    pub content: Content,
}

fn require_caller(headers: &HeaderMap) -> Result<&str, ServerError> {
    super::caller(headers).ok_or_else(|| {
        ServerError::BadRequest(format!("missing {} header", super::CALLER_HEADER))
    })
}

/// GET /sites/{name}: where the site's content currently lives.
pub async fn locate_site(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    Ok(Json(state.store().locate_site(&name)?).into_response())
}

/// PUT /sites/{name}: publish a standalone version owned by the caller.
pub async fn publish_site(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PublishRequest>,
) -> Result<Response, ServerError> {
    let owner = require_caller(&headers)?;
    let outcome = state
        .store()
        .publish_site(owner, &name, body.files, body.metadata)
        .await?;
    let status = if outcome.version == 1 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)).into_response())
}

pub async fn site_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    Ok(Json(state.store().site_history(&name)?).into_response())
}

/// POST /sites/{name}/rollback
pub async fn rollback_site(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RollbackRequest>,
) -> Result<Response, ServerError> {
    let caller = require_caller(&headers)?;
    let outcome = state.store().rollback_site(caller, &name, body.version).await?;
    Ok(Json(outcome).into_response())
}

/// GET /sites/{name}/files: the site's index document.
pub async fn fetch_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    serve(&state, &name, "").await
}

/// GET /sites/{name}/files/{*path}
pub async fn fetch_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    serve(&state, &name, &path).await
}

/// PUT /sites/{name}/files/{*path}: add or replace one file of a standalone site.
pub async fn update_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<SiteFileRequest>,
) -> Result<Response, ServerError> {
    let caller = require_caller(&headers)?;
    let outcome = state
        .store()
        .update_site_file(caller, &name, &path, body.content)
        .await?;
    Ok(Json(outcome).into_response())
}

/// DELETE /sites/{name}/files/{*path}
pub async fn delete_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let caller = require_caller(&headers)?;
    let outcome = state.store().delete_site_file(caller, &name, &path).await?;
    Ok(Json(outcome).into_response())
}

async fn serve(state: &AppState, name: &str, path: &str) -> Result<Response, ServerError> {
    let bytes = state.store().fetch_site_file(name, path).await?;
    let served = if path.trim_matches('/').is_empty() {
        "index.html"
    } else {
        path
    };
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type(served))],
        bytes,
    )
        .into_response())
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt" | "md") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
