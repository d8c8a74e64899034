use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use folio_core::{ErrorKind, FolioError};

/// Server error type that maps to HTTP status codes.
#[derive(Debug)]
pub enum ServerError {
    /// Rejected by the request layer before reaching the folder store.
    BadRequest(String),
    Folio(FolioError),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::InvalidRequest,
            Self::Folio(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::QuotaExceeded => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Corrupt | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::Folio(e) => write!(f, "{e}"),
        }
    }
}

impl From<FolioError> for ServerError {
    fn from(e: FolioError) -> Self {
        Self::Folio(e)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %message);
        } else {
            tracing::debug!(status = %status, error = %message);
        }
        let body = axum::Json(serde_json::json!({
            "error": self.kind().as_str(),
            "message": message,
        }));
        (status, body).into_response()
    }
}
