use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] verigate_core::ModelError),

    #[error("console configuration: {0}")]
    ConsoleConfig(String),

    /// The backend answered but refused the operation.
    #[error("{operation} rejected by backend: {reason}")]
    Rejected { operation: &'static str, reason: String },

    #[error("cache entry {0} holds a different resource type")]
    ResourceMismatch(&'static str),

    /// Error of a fetch shared by several concurrent readers.
    #[error(transparent)]
    Shared(Arc<SyncError>),
}

impl SyncError {
    /// Whether retrying on the next scheduled tick may succeed.
    ///
    /// Network failures, timeouts and 5xx answers are transient; malformed
    /// payloads and client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Server { status, .. } => *status >= 500,
            Self::Shared(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// HTTP status of a server error, looking through shared errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Shared(inner) => inner.status(),
            _ => None,
        }
    }
}
