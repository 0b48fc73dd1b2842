use serde::{Deserialize, Serialize};

use super::session::Identity;

// ---------------------------------------------------------------------------
// Login / refresh wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

/// Body returned by both the login and the refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub account: Identity,
}

impl TokenResponse {
    /// A response carrying an empty token is treated as no token at all.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }
}
