use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use shared::types::{Identity, Session, SessionEvent, SignOutReason};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::error::ClientResult;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Durable home of the access token. Only the token is persisted; identity
/// is re-derived after a restart.
#[async_trait]
pub trait TokenPersistence: Send + Sync + fmt::Debug {
    async fn load(&self) -> ClientResult<Option<String>>;
    async fn save(&self, token: &str) -> ClientResult<()>;
    async fn purge(&self) -> ClientResult<()>;
}

/// Single-string file on disk.
#[derive(Debug, Clone)]
pub struct FileTokenPersistence {
    path: PathBuf,
}

impl FileTokenPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenPersistence for FileTokenPersistence {
    async fn load(&self) -> ClientResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, token: &str) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, token).await?;
        Ok(())
    }

    async fn purge(&self) -> ClientResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local slot. Used when no token path is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryTokenPersistence {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenPersistence {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }

    pub fn stored(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TokenPersistence for MemoryTokenPersistence {
    async fn load(&self) -> ClientResult<Option<String>> {
        Ok(self.stored())
    }

    async fn save(&self, token: &str) -> ClientResult<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    async fn purge(&self) -> ClientResult<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Single source of truth for the access token and identity.
///
/// Cheaply cloneable; all clones share one session. Writers can only replace
/// the whole session or clear it. `persist` serialises the memory update
/// together with its disk write so the two never disagree about ordering.
#[derive(Clone, Debug)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

#[derive(Debug)]
struct TokenStoreInner {
    session: RwLock<Session>,
    persist: tokio::sync::Mutex<()>,
    persistence: Arc<dyn TokenPersistence>,
    events: broadcast::Sender<SessionEvent>,
}

impl TokenStore {
    /// Empty store backed by `persistence`.
    pub fn new(persistence: Arc<dyn TokenPersistence>) -> Self {
        Self::with_session(Session::default(), persistence)
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenPersistence::default()))
    }

    /// Build the store at process start from whatever token was persisted.
    pub async fn restore(persistence: Arc<dyn TokenPersistence>) -> Self {
        let session = match persistence.load().await {
            Ok(Some(token)) => {
                info!("Restored persisted access token");
                Session::from_token(token)
            }
            Ok(None) => {
                debug!("No persisted access token");
                Session::default()
            }
            Err(e) => {
                warn!("Failed to read persisted token, starting signed out: {}", e);
                Session::default()
            }
        };
        Self::with_session(session, persistence)
    }

    fn with_session(session: Session, persistence: Arc<dyn TokenPersistence>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(TokenStoreInner {
                session: RwLock::new(session),
                persist: tokio::sync::Mutex::new(()),
                persistence,
                events,
            }),
        }
    }

    /// Current session. No side effects.
    pub async fn get(&self) -> Session {
        self.inner.session.read().await.clone()
    }

    /// Current bearer token, if any.
    pub async fn token(&self) -> Option<String> {
        self.inner.session.read().await.bearer().map(str::to_owned)
    }

    /// Replace the session after a login or profile fetch.
    pub async fn set(&self, token: String, identity: Identity) {
        let event = SessionEvent::SignedIn {
            identity: Some(identity.clone()),
        };
        self.install(Session::new(token, identity), event).await;
    }

    /// Replace the session with the result of a token refresh.
    pub async fn set_refreshed(&self, token: String, identity: Identity) {
        self.install(Session::new(token, identity), SessionEvent::Refreshed)
            .await;
    }

    /// Install `(token, identity)` only while the store still holds
    /// `expected`. Returns `false` when the session was cleared or replaced in
    /// the meantime, leaving the newer state untouched.
    pub async fn set_if_token(&self, expected: &str, token: String, identity: Identity) -> bool {
        let _persist = self.inner.persist.lock().await;
        if self.inner.session.read().await.bearer() != Some(expected) {
            debug!("Session changed while identity was loading, not installing");
            return false;
        }
        let event = SessionEvent::SignedIn {
            identity: Some(identity.clone()),
        };
        self.write_locked(Session::new(token, identity), event).await;
        true
    }

    async fn install(&self, session: Session, event: SessionEvent) {
        let _persist = self.inner.persist.lock().await;
        self.write_locked(session, event).await;
    }

    /// Caller holds the persist lock.
    async fn write_locked(&self, session: Session, event: SessionEvent) {
        let token = session.access_token.clone().unwrap_or_default();
        info!("Session set: {}", session);
        *self.inner.session.write().await = session;

        if let Err(e) = self.inner.persistence.save(&token).await {
            warn!("Failed to persist access token: {}", e);
        }
        let _ = self.inner.events.send(event);
    }

    /// Drop token and identity, and purge durable storage.
    pub async fn clear(&self, reason: SignOutReason) {
        let _persist = self.inner.persist.lock().await;
        let previous = std::mem::take(&mut *self.inner.session.write().await);
        if previous.is_empty() {
            debug!("Session clear ({}) on an already empty session", reason);
        } else {
            info!("Session cleared ({}): was {}", reason, previous);
        }

        if let Err(e) = self.inner.persistence.purge().await {
            warn!("Failed to purge persisted token: {}", e);
        }
        let _ = self.inner.events.send(SessionEvent::SignedOut { reason });
    }

    /// Lifecycle notifications. `SignedOut` with a reason that
    /// `requires_login()` is the cue to show the login screen.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }
}
