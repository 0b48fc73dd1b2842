use std::sync::Arc;

use http::StatusCode;
use serde::de::DeserializeOwned;
use shared::types::{ApiConfig, SignOutReason, TokenResponse};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Attaches the bearer token to every outbound call and fails closed on 401.
///
/// The gateway never refreshes or retries. Callers that want
/// refresh-and-retry compose it with
/// [`RefreshCoordinator`](crate::refresh::RefreshCoordinator) themselves
/// (see [`SessionClient::send_with_refresh`](crate::session::SessionClient::send_with_refresh)).
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    store: TokenStore,
    login_path: String,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, store: TokenStore, api: &ApiConfig) -> Self {
        Self {
            transport,
            store,
            login_path: api.login_path.clone(),
        }
    }

    /// Send a copy of `request`, authenticated when a token is held.
    ///
    /// * 401 clears the token store and returns [`ClientError::Unauthorized`].
    /// * A 2xx answer from the login endpoint installs the returned token.
    /// * Every other response is handed back untouched.
    pub async fn send(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let mut outbound = request.clone();
        let session = self.store.get().await;
        match session.bearer() {
            Some(token) => outbound.set_bearer(token)?,
            None => debug!("Sending {} unauthenticated", request),
        }

        let response = self.transport.execute(outbound).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            warn!("{} answered 401, clearing session", request);
            self.store.clear(SignOutReason::Unauthorized).await;
            return Err(ClientError::Unauthorized);
        }

        if response.is_success() && request.route() == self.login_path {
            self.capture_login(&response).await;
        }

        Ok(response)
    }

    /// `send`, then require 2xx and decode the body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> ClientResult<T> {
        self.send(request).await?.error_for_status()?.json()
    }

    async fn capture_login(&self, response: &ApiResponse) {
        match response.json::<TokenResponse>() {
            Ok(tokens) if tokens.is_usable() => {
                info!("Login succeeded for user_id={}", tokens.account.id);
                self.store.set(tokens.access_token, tokens.account).await;
            }
            Ok(_) => warn!("Login response carried an empty access_token, session unchanged"),
            Err(e) => warn!("Login response did not carry a token: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, json_response};
    use http::header::AUTHORIZATION;
    use serde_json::json;
    use shared::types::{Identity, SessionEvent};
    use tokio_test::assert_ok;

    fn api() -> ApiConfig {
        ApiConfig::with_base_url("http://backend.test")
    }

    fn alice() -> Identity {
        Identity {
            id: "u1".into(),
            username: Some("alice".into()),
            email: None,
            is_active: true,
            is_staff: false,
        }
    }

    fn backend() -> Arc<ScriptedTransport> {
        Arc::new(routes())
    }

    fn routes() -> ScriptedTransport {
        ScriptedTransport::new(|req| match req.route() {
            "/auth/login" => Ok(json_response(
                StatusCode::OK,
                json!({"access_token": "abc", "account": {"id": "u1", "is_active": true}}),
            )),
            "/events" => Ok(json_response(StatusCode::OK, json!([]))),
            "/registrations" => Ok(json_response(
                StatusCode::UNAUTHORIZED,
                json!({"code": "TOKEN_EXPIRED", "message": "expired"}),
            )),
            "/broken" => Ok(json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"code": "INTERNAL_ERROR", "message": "boom"}),
            )),
            _ => Ok(json_response(StatusCode::NOT_FOUND, json!({}))),
        })
    }

    #[tokio::test]
    async fn login_protected_call_then_401_clears_session() {
        let transport = backend();
        let store = TokenStore::in_memory();
        let gateway = Gateway::new(transport.clone(), store.clone(), &api());

        let login = ApiRequest::post("/auth/login")
            .json(&json!({"username": "alice", "password": "pw"}))
            .unwrap();
        assert_ok!(gateway.send(&login).await);

        let session = store.get().await;
        assert_eq!(session.access_token.as_deref(), Some("abc"));
        assert_eq!(session.identity.map(|i| i.id).as_deref(), Some("u1"));

        assert_ok!(gateway.send(&ApiRequest::get("/events")).await);
        let sent = transport.requests();
        assert_eq!(sent.last().unwrap().headers[AUTHORIZATION], "Bearer abc");

        let err = gateway.send(&ApiRequest::get("/registrations")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(store.get().await.is_empty());
    }

    #[tokio::test]
    async fn caller_request_is_not_mutated() {
        let store = TokenStore::in_memory();
        store.set("abc".into(), alice()).await;
        let gateway = Gateway::new(backend(), store, &api());

        let request = ApiRequest::get("/events");
        assert_ok!(gateway.send(&request).await);
        assert!(request.headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn no_token_means_no_authorization_header() {
        let transport = backend();
        let gateway = Gateway::new(transport.clone(), TokenStore::in_memory(), &api());

        assert_ok!(gateway.send(&ApiRequest::get("/events")).await);
        assert!(transport.requests()[0].headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn non_auth_errors_are_returned_untouched() {
        let store = TokenStore::in_memory();
        store.set("abc".into(), alice()).await;
        let gateway = Gateway::new(backend(), store.clone(), &api());

        let response = assert_ok!(gateway.send(&ApiRequest::get("/broken")).await);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(store.get().await.is_authenticated());

        match gateway.send_json::<serde_json::Value>(&ApiRequest::get("/broken")).await {
            Err(ClientError::Status { code, .. }) => assert_eq!(code, "INTERNAL_ERROR"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn concurrent_401_always_leaves_store_empty() {
        let transport = Arc::new(routes().with_delay(std::time::Duration::from_millis(5)));
        let store = TokenStore::in_memory();
        store.set("abc".into(), alice()).await;
        let gateway = Gateway::new(transport, store.clone(), &api());
        let mut events = store.subscribe();

        let ok = ApiRequest::get("/events");
        let denied = ApiRequest::get("/registrations");
        let (a, b, c) = tokio::join!(gateway.send(&ok), gateway.send(&denied), gateway.send(&ok));
        assert!(a.is_ok() && c.is_ok());
        assert!(b.unwrap_err().is_unauthorized());
        assert!(store.get().await.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedOut { reason: SignOutReason::Unauthorized }
        );
    }

    #[tokio::test]
    async fn login_without_token_leaves_session_alone() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(json_response(StatusCode::OK, json!({"detail": "check your inbox"})))
        }));
        let store = TokenStore::in_memory();
        let gateway = Gateway::new(transport, store.clone(), &api());
        assert_ok!(gateway.send(&ApiRequest::post("/auth/login")).await);
        assert!(store.get().await.is_empty());
    }
}
