use std::sync::Arc;
use std::time::Duration;

use shared::types::{
    ApiConfig, ClientConfig, Identity, LoginData, PollingConfig, SessionEvent, SignOutReason,
    TokenResponse, TopicId,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::feed_handle::FeedHandle;
use crate::gateway::Gateway;
use crate::polling::PollingFeedClient;
use crate::refresh::RefreshCoordinator;
use crate::stream::NotificationStreamClient;
use crate::token_store::{
    FileTokenPersistence, MemoryTokenPersistence, TokenPersistence, TokenStore,
};
use crate::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

/// Everything a UI needs, wired around one token store.
#[derive(Clone)]
pub struct SessionClient {
    api: ApiConfig,
    polling: PollingConfig,
    store: TokenStore,
    gateway: Gateway,
    refresher: RefreshCoordinator,
    stream: NotificationStreamClient,
    poller: PollingFeedClient,
}

impl SessionClient {
    /// Production wiring: reqwest transport, token persisted to
    /// `storage.token_path` when set, restored from it now.
    pub async fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config.api)?);
        let persistence: Arc<dyn TokenPersistence> = match &config.storage.token_path {
            Some(path) => {
                let file = FileTokenPersistence::new(path);
                info!("Persisting access token to {}", file.path().display());
                Arc::new(file)
            }
            None => {
                debug!("No token_path configured, keeping the token in memory");
                Arc::new(MemoryTokenPersistence::default())
            }
        };
        let store = TokenStore::restore(persistence).await;
        Ok(Self::with_parts(config, transport, store))
    }

    pub fn with_parts(config: &ClientConfig, transport: Arc<dyn Transport>, store: TokenStore) -> Self {
        let gateway = Gateway::new(Arc::clone(&transport), store.clone(), &config.api);
        let refresher = RefreshCoordinator::new(Arc::clone(&transport), store.clone(), &config.api);
        let stream = NotificationStreamClient::new(transport, store.clone(), &config.api);
        let poller = PollingFeedClient::new(gateway.clone(), &config.api);
        Self {
            api: config.api.clone(),
            polling: config.polling.clone(),
            store,
            gateway,
            refresher,
            stream,
            poller,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.subscribe()
    }

    /// Log in. The gateway installs the returned token as a side effect.
    pub async fn login(&self, credentials: &LoginData) -> ClientResult<Identity> {
        let request = ApiRequest::post(self.api.login_path.clone()).json(credentials)?;
        let tokens: TokenResponse = self.gateway.send_json(&request).await?;
        Ok(tokens.account)
    }

    /// Best-effort server logout, then always clear locally.
    pub async fn logout(&self) {
        if let Some(path) = &self.api.logout_path {
            match self.gateway.send(&ApiRequest::post(path.clone())).await {
                Ok(response) if !response.is_success() => {
                    warn!("Server logout answered {}, clearing locally anyway", response.status)
                }
                Err(e) => warn!("Server logout failed, clearing locally anyway: {}", e),
                Ok(_) => {}
            }
        }
        self.store.clear(SignOutReason::Logout).await;
    }

    /// After a restart only the token is known; fetch the identity that
    /// belongs to it and install both together.
    pub async fn restore_identity(&self) -> ClientResult<Option<Identity>> {
        let session = self.store.get().await;
        let Some(token) = session.bearer().map(str::to_owned) else {
            return Ok(None);
        };
        if let Some(identity) = session.identity {
            return Ok(Some(identity));
        }

        let identity: Identity = self
            .gateway
            .send_json(&ApiRequest::get(self.api.profile_path.clone()))
            .await?;
        // A logout, 401 or failed refresh may have cleared the store while
        // the profile was loading; never resurrect that session.
        if !self
            .store
            .set_if_token(&token, token.clone(), identity.clone())
            .await
        {
            warn!("Session changed during identity restore, discarding profile");
            return Ok(None);
        }
        info!("Identity restored for user_id={}", identity.id);
        Ok(Some(identity))
    }

    /// Gateway + refresh, composed explicitly: a 401 on a safe method
    /// triggers one shared refresh and one retry. Writes are never replayed.
    ///
    /// Session events on that path are `SignedOut { Unauthorized }` from the
    /// gateway, then `Refreshed` or `SignedOut { RefreshFailed }`. A UI that
    /// calls this should wait for the outcome instead of redirecting on the
    /// first event.
    pub async fn send_with_refresh(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        match self.gateway.send(request).await {
            Err(ClientError::Unauthorized) if request.is_idempotent() => {
                info!("{} got 401, refreshing and retrying once", request);
                self.refresher.ensure_fresh_token().await?;
                self.gateway.send(request).await
            }
            other => other,
        }
    }

    /// Push-backed feed for an active event.
    pub fn subscribe_live(&self, topic_id: TopicId) -> FeedHandle {
        self.stream.subscribe(topic_id)
    }

    /// Polled feed for archived or ended events. Falls back to the configured
    /// interval when `interval` is `None`.
    pub fn subscribe_polling(&self, topic_id: TopicId, interval: Option<Duration>) -> FeedHandle {
        let interval = interval.unwrap_or_else(|| self.polling.interval());
        self.poller.subscribe(topic_id, interval)
    }
}
