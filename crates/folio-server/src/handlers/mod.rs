pub mod admin;
pub mod folders;
pub mod sites;

#[cfg(test)]
pub mod test_helpers;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Header naming the account a request acts for.
pub const CALLER_HEADER: &str = "X-Folio-Caller";

pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        // Accounts and their folders
        .route("/accounts", post(folders::register_account))
        .route("/accounts/{alias}", get(folders::get_account))
        .route("/accounts/{alias}/edits", post(folders::apply_edit))
        .route("/accounts/{alias}/live", get(folders::resolve_live))
        .route("/accounts/{alias}/entries", get(folders::list_entries))
        .route("/accounts/{alias}/history", get(folders::folder_history))
        .route("/accounts/{alias}/sites", get(folders::list_sites))
        .route(
            "/accounts/{alias}/quota",
            get(folders::check_quota).post(folders::reconcile_quota),
        )
        // Snapshot ids
        .route("/snapshots/{id}/resolve", get(admin::resolve_historical))
        .route("/snapshots/{id}/tree", get(admin::display_tree))
        // Public site names
        .route(
            "/sites/{name}",
            get(sites::locate_site).put(sites::publish_site),
        )
        .route("/sites/{name}/history", get(sites::site_history))
        .route("/sites/{name}/rollback", post(sites::rollback_site))
        .route("/sites/{name}/files", get(sites::fetch_index))
        .route(
            "/sites/{name}/files/{*path}",
            get(sites::fetch_file)
                .put(sites::update_file)
                .delete(sites::delete_file),
        )
        .route("/stats", get(admin::stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Health endpoint is unauthenticated
    let public = Router::new().route("/health", get(admin::health));

    public
        .merge(authed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The account named by [`CALLER_HEADER`], if any.
pub fn caller(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = state.inner.config.token.as_bytes();

    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if provided.as_bytes().ct_eq(expected).into() {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "invalid or missing token").into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::test_helpers::*;

    #[tokio::test]
    async fn health_needs_no_token() {
        let (router, _state, _tmp) = setup_app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_status(&resp, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let (router, _state, _tmp) = setup_app();
        let req = Request::builder()
            .uri("/stats")
            .header("Authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_status(&resp, StatusCode::UNAUTHORIZED);

        let req = Request::builder().uri("/stats").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_status(&resp, StatusCode::UNAUTHORIZED);
    }
}
