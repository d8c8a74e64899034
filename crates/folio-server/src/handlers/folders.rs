use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use folio_core::config::parse_size;
use folio_core::{Edit, EntryKind};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct RegisterRequest {
    pub alias: String,
    /// Human size such as "10M". Defaults to the store's default quota.
    pub quota: Option<String>,
}

#[derive(serde::Deserialize, Default)]
pub struct EntriesQuery {
    pub kind: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct QuotaQuery {
    pub bytes: u64,
}

/// POST /accounts: create an account without a folder.
pub async fn register_account(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response, ServerError> {
    let limit = match body.quota.as_deref() {
        Some(size) => parse_size(size).map_err(ServerError::BadRequest)?,
        None => state.store().config().default_quota,
    };
    let account = state.store().register_account(&body.alias, limit).await?;
    Ok((StatusCode::CREATED, Json(account)).into_response())
}

/// GET /accounts/{alias}: account record plus entry counts.
pub async fn get_account(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Response, ServerError> {
    let account = state.store().account(&alias)?;
    let counts = state.store().counts_by_kind(&alias)?;
    Ok(Json(serde_json::json!({
        "account": account,
        "counts": counts,
    }))
    .into_response())
}

/// POST /accounts/{alias}/edits: apply one edit to the folder.
///
/// With a caller header the caller must own the folder.
pub async fn apply_edit(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    headers: HeaderMap,
    Json(edit): Json<Edit>,
) -> Result<Response, ServerError> {
    let status = if edit == Edit::CreateFolder {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let outcome = match super::caller(&headers) {
        Some(caller) => state.store().mutate_as(caller, &alias, edit).await?,
        None => state.store().mutate(&alias, edit).await?,
    };
    Ok((status, Json(outcome)).into_response())
}

/// GET /accounts/{alias}/live
pub async fn resolve_live(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Response, ServerError> {
    let snapshot = state.store().resolve_live(&alias)?;
    Ok(Json(serde_json::json!({ "snapshot": snapshot })).into_response())
}

/// GET /accounts/{alias}/entries?kind=: all kinds when `kind` is absent.
pub async fn list_entries(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Query(query): Query<EntriesQuery>,
) -> Result<Response, ServerError> {
    let kinds = match query.kind.as_deref() {
        Some(kind) => vec![kind.parse::<EntryKind>()?],
        None => EntryKind::ALL.to_vec(),
    };
    let mut entries = Vec::new();
    for kind in kinds {
        entries.extend(state.store().list_entries(&alias, kind)?);
    }
    Ok(Json(entries).into_response())
}

pub async fn folder_history(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Response, ServerError> {
    Ok(Json(state.store().folder_history(&alias)?).into_response())
}

pub async fn list_sites(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Response, ServerError> {
    Ok(Json(state.store().list_sites(&alias)?).into_response())
}

/// GET /accounts/{alias}/quota?bytes=N: would `N` more bytes fit?
pub async fn check_quota(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Query(query): Query<QuotaQuery>,
) -> Result<Response, ServerError> {
    state.store().check_and_reserve(&alias, query.bytes)?;
    let quota = state.store().account(&alias)?.quota;
    Ok(Json(quota).into_response())
}

/// POST /accounts/{alias}/quota: recompute usage and correct drift.
pub async fn reconcile_quota(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Response, ServerError> {
    Ok(Json(state.store().reconcile_quota(&alias).await?).into_response())
}
