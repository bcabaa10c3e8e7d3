//! Remote sync errors

use thiserror::Error;

/// Failure of a remote read or write
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Session expired or credentials rejected
    #[error("Not authorized by remote store: {0}. Sign in again to resume syncing.")]
    Unauthorized(String),

    /// Network or connection failure
    #[error("Remote store unreachable: {0}")]
    Transport(String),

    /// The remote store answered with an error
    #[error("Remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The remote payload could not be decoded
    #[error("Invalid document from remote store: {0}")]
    Decode(String),

    /// Backend-specific failure (database errors and the like)
    #[error("Remote backend error: {0}")]
    Backend(String),
}

impl SyncError {
    /// Whether re-authentication is needed before syncing can resume
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN =>
            {
                SyncError::Unauthorized(e.to_string())
            }
            Some(status) => SyncError::Rejected {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_decode() => SyncError::Decode(e.to_string()),
            None => SyncError::Transport(e.to_string()),
        }
    }
}

/// Result type for remote operations
pub type SyncResult<T> = Result<T, SyncError>;
