use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The authenticated account as returned by the login, refresh and profile
/// endpoints.
///
/// Only `id` is required. The remaining fields are carried through so a UI
/// can render them, but the session core never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_staff: bool,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.username, &self.email) {
            (Some(name), _) => write!(f, "{} (id {})", name, self.id),
            (None, Some(email)) => write!(f, "{} (id {})", email, self.id),
            (None, None) => write!(f, "id {}", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Snapshot of the client's authentication state.
///
/// `identity` is only ever present together with `access_token`. The reverse
/// is allowed: after a restart the persisted token is loaded on its own and
/// the identity is re-fetched from the profile endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub identity: Option<Identity>,
}

impl Session {
    pub fn new(access_token: String, identity: Identity) -> Self {
        Self {
            access_token: Some(access_token),
            identity: Some(identity),
        }
    }

    /// A session restored from storage: token only, identity unknown.
    pub fn from_token(access_token: String) -> Self {
        Self {
            access_token: Some(access_token),
            identity: None,
        }
    }

    /// The bearer token, if one is held and it is non-empty.
    pub fn bearer(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.identity.is_none()
    }
}

// Never print the token itself.
impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.access_token, &self.identity) {
            (None, _) => write!(f, "anonymous"),
            (Some(_), None) => write!(f, "token-only (identity pending)"),
            (Some(_), Some(identity)) => write!(f, "user_id={}", identity.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle events
// ---------------------------------------------------------------------------

/// Why a session was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// The user asked to log out.
    Logout,
    /// A request was answered with 401.
    Unauthorized,
    /// The single in-flight refresh failed; the UI must send the user back
    /// to the login entry point.
    RefreshFailed,
}

impl SignOutReason {
    /// Whether the UI should navigate to the login screen.
    ///
    /// An `Unauthorized` sign-out can be followed by `Refreshed` when the
    /// caller composed the request with a refresh-and-retry; such callers
    /// act on the final outcome.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::RefreshFailed)
    }
}

impl fmt::Display for SignOutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logout => write!(f, "logout"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::RefreshFailed => write!(f, "refresh failed"),
        }
    }
}

/// Broadcast by the token store whenever the session is replaced or cleared.
///
/// A 401 that is recovered by a refresh produces `SignedOut { Unauthorized }`
/// followed by `Refreshed`; an unrecoverable one is followed by
/// `SignedOut { RefreshFailed }` or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { identity: Option<Identity> },
    Refreshed,
    SignedOut { reason: SignOutReason },
}
