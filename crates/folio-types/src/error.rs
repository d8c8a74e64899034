use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FolioError>;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("quota exceeded: requested {requested} bytes, {available} bytes available")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("content store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stable, machine-readable error kind surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    QuotaExceeded,
    AccessDenied,
    StoreUnavailable,
    Corrupt,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl FolioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FolioError::NotFound(_) => ErrorKind::NotFound,
            FolioError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            FolioError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            FolioError::AccessDenied(_) => ErrorKind::AccessDenied,
            FolioError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            FolioError::Corrupt(_) => ErrorKind::Corrupt,
            FolioError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            FolioError::Config(_) | FolioError::Io(_) | FolioError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }
}
