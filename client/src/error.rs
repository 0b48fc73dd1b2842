use http::StatusCode;
use shared::types::ErrorResponse;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The backend answered 401. The session has already been cleared.
    #[error("Unauthorized: session cleared")]
    Unauthorized,

    #[error("HTTP {status}: {code} {message}")]
    Status {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Token storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),
}

impl ClientError {
    /// Build a `Status` error from a non-2xx response body, using the
    /// backend's error envelope when it sent one.
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let envelope = ErrorResponse::from_body(body)
            .unwrap_or_else(|| ErrorResponse::new("HTTP_ERROR", &String::from_utf8_lossy(body)));
        Self::Status {
            status,
            code: envelope.code,
            message: envelope.message,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Outcome of a failed refresh flight. `Clone` so every waiter of the same
/// flight receives an identical copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("refresh rejected with status {0}")]
    Rejected(u16),

    #[error("refresh transport failure: {0}")]
    Transport(String),

    #[error("refresh response malformed: {0}")]
    Malformed(String),

    #[error("refresh task ended without an outcome")]
    Aborted,
}
