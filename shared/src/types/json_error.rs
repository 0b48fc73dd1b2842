use serde::{Deserialize, Serialize};

/// Standard error envelope returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, alias = "detail")]
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Best-effort parse of an error body. Returns `None` for non-JSON bodies.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

fn default_status() -> String {
    "error".to_string()
}
