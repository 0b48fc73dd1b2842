use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use http::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::types::ApiConfig;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// An outbound call, addressed by path relative to the API root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus optional query string, e.g. `/notifications/stream/4?token=…`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        let bytes = serde_json::to_vec(body)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    /// Append one query parameter, percent-encoded.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .append_pair(key, value)
            .finish();
        let sep = if self.path.contains('?') { '&' } else { '?' };
        self.path = format!("{}{}{}", self.path, sep, encoded);
        self
    }

    /// Set `Authorization: Bearer <token>`, replacing any existing value.
    pub fn set_bearer(&mut self, token: &str) -> ClientResult<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ClientError::InvalidRequest("token is not a valid header value".into()))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
    }

    /// The path without its query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    /// Safe to replay after a refresh.
    pub fn is_idempotent(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

// Query strings may carry the stream token; log the route only.
impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.route())
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx response into `ClientError::Status`.
    pub fn error_for_status(self) -> ClientResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::from_status(self.status, &self.body))
        }
    }
}

pub type ByteStream = BoxStream<'static, ClientResult<Bytes>>;

/// A long-lived response whose body is consumed incrementally. Dropping
/// `body` releases the connection.
pub struct StreamResponse {
    pub status: StatusCode,
    pub body: ByteStream,
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Network boundary of the session core. Every component takes an
/// `Arc<dyn Transport>` so tests can script the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and buffer the whole response.
    async fn execute(&self, request: ApiRequest) -> ClientResult<ApiResponse>;

    /// Open a server-push connection. Only the status line is awaited.
    async fn open_stream(&self, request: ApiRequest) -> ClientResult<StreamResponse>;
}

/// Production transport backed by `reqwest`.
///
/// The cookie store is enabled so the refresh call carries whatever session
/// cookie the login response set.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    api: ApiConfig,
}

impl ReqwestTransport {
    pub fn new(api: &ApiConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(api.connect_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api: api.clone(),
        })
    }

    fn build(&self, request: ApiRequest) -> reqwest::RequestBuilder {
        let url = self.api.url(&request.path);
        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        debug!("HTTP {}", request);
        let response = self
            .build(request)
            .timeout(self.api.request_timeout())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    async fn open_stream(&self, request: ApiRequest) -> ClientResult<StreamResponse> {
        debug!("SSE {}", request);
        let response = self
            .build(request)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed();

        Ok(StreamResponse { status, body })
    }
}
