use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use folio_core::{FolderStore, FolioConfig, LocalContentStore};
use tower::ServiceExt;

use crate::config::ServerSection;
use crate::state::AppState;

pub const TEST_TOKEN: &str = "test-token";

/// Create a wired-up router and AppState backed by a temp directory.
pub fn setup_app() -> (Router, AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create tempdir");
    let folio = FolioConfig::with_data_dir(tmp.path().join("data"));
    let objects = LocalContentStore::new(tmp.path().join("objects")).unwrap();
    let store = FolderStore::open(folio, Arc::new(objects)).unwrap();

    let config = ServerSection {
        token: TEST_TOKEN.to_string(),
        ..Default::default()
    };

    let state = AppState::new(config, store);
    let router = super::router(state.clone());
    (router, state, tmp)
}

fn authed(method: &str, path: &str, caller: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("Authorization", format!("Bearer {TEST_TOKEN}"));
    if let Some(caller) = caller {
        builder = builder.header(super::CALLER_HEADER, caller);
    }
    builder
}

/// Send an authenticated GET request.
pub async fn authed_get(router: Router, path: &str) -> axum::response::Response {
    let req = authed("GET", path, None).body(Body::empty()).unwrap();
    router.oneshot(req).await.unwrap()
}

/// Send an authenticated request with a JSON body, optionally acting as `caller`.
pub async fn authed_json(
    router: Router,
    method: &str,
    path: &str,
    caller: Option<&str>,
    body: serde_json::Value,
) -> axum::response::Response {
    let req = authed(method, path, caller)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    router.oneshot(req).await.unwrap()
}

/// Send an authenticated POST request with a JSON body.
pub async fn authed_post(
    router: Router,
    path: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    authed_json(router, "POST", path, None, body).await
}

/// Read full response body into `Vec<u8>`.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect body")
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

/// Assert response has expected status.
pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "expected {expected}, got {}",
        response.status()
    );
}

/// Register `alias` and create its folder.
pub async fn create_account(router: &Router, alias: &str, quota: &str) {
    let resp = authed_post(
        router.clone(),
        "/accounts",
        serde_json::json!({ "alias": alias, "quota": quota }),
    )
    .await;
    assert_status(&resp, StatusCode::CREATED);
    let resp = authed_post(
        router.clone(),
        &format!("/accounts/{alias}/edits"),
        serde_json::json!({ "edit": "create-folder" }),
    )
    .await;
    assert_status(&resp, StatusCode::CREATED);
}
