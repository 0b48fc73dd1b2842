use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use shared::types::{ApiConfig, SignOutReason, TokenResponse};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, Transport};

pub type RefreshOutcome = Result<String, RefreshError>;

type OutcomeSlot = watch::Receiver<Option<RefreshOutcome>>;

/// `Idle -> Refreshing -> Idle`. While refreshing, the slot is the one
/// channel every waiter of the current flight reads its outcome from.
enum FlightState {
    Idle,
    Refreshing(OutcomeSlot),
}

/// Single-flight token refresh.
///
/// However many callers ask for a fresh token while a refresh is running,
/// exactly one refresh request reaches the backend and every caller gets
/// the same result. The refresh runs on its own task, so it always reaches
/// the token store even if every caller gives up waiting.
///
/// On failure the session is cleared with [`SignOutReason::RefreshFailed`],
/// which the UI treats as "go to the login screen". Failures are never
/// retried.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    transport: Arc<dyn Transport>,
    store: TokenStore,
    refresh_path: String,
    state: Mutex<FlightState>,
    flights: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn Transport>, store: TokenStore, api: &ApiConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                store,
                refresh_path: api.refresh_path.clone(),
                state: Mutex::new(FlightState::Idle),
                flights: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain a fresh access token, joining the in-flight refresh if there
    /// is one.
    pub async fn ensure_fresh_token(&self) -> RefreshOutcome {
        let mut slot = self.join_or_start();
        match slot.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Err(RefreshError::Aborted)),
            Err(_) => Err(RefreshError::Aborted),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), FlightState::Refreshing(_))
    }

    /// Number of refresh requests issued since construction.
    pub fn flights(&self) -> u64 {
        self.inner.flights.load(Ordering::Relaxed)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FlightState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_or_start(&self) -> OutcomeSlot {
        let mut state = self.lock_state();
        if let FlightState::Refreshing(slot) = &*state {
            debug!("Refresh already in flight, joining it");
            return slot.clone();
        }

        let (tx, slot) = watch::channel(None);
        *state = FlightState::Refreshing(slot.clone());
        drop(state);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.refresh_once().await;
            // Back to Idle before waiters wake, so a caller arriving after
            // this flight starts a new one rather than reading a stale slot.
            *inner.state.lock().unwrap_or_else(PoisonError::into_inner) = FlightState::Idle;
            let _ = tx.send(Some(outcome));
        });

        slot
    }
}

impl CoordinatorInner {
    async fn refresh_once(&self) -> RefreshOutcome {
        let flight = self.flights.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Refreshing access token (flight #{})", flight);

        let request = ApiRequest::post(self.refresh_path.clone());
        let result = match self.transport.execute(request).await {
            Ok(response) if response.is_success() => response
                .json::<TokenResponse>()
                .map_err(|e| RefreshError::Malformed(e.to_string()))
                .and_then(|tokens| {
                    if tokens.is_usable() {
                        Ok(tokens)
                    } else {
                        Err(RefreshError::Malformed("empty access_token".into()))
                    }
                }),
            Ok(response) => Err(RefreshError::Rejected(response.status.as_u16())),
            Err(e) => Err(RefreshError::Transport(e.to_string())),
        };

        match result {
            Ok(tokens) => {
                let token = tokens.access_token.clone();
                self.store
                    .set_refreshed(tokens.access_token, tokens.account)
                    .await;
                info!("Access token refreshed (flight #{})", flight);
                Ok(token)
            }
            Err(e) => {
                warn!("Token refresh failed (flight #{}): {}, signing out", flight, e);
                self.store.clear(SignOutReason::RefreshFailed).await;
                Err(e)
            }
        }
    }
}
