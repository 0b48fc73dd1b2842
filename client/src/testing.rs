//! Scripted backend for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::StatusCode;
use tokio::sync::mpsc;

use crate::error::{ClientError, ClientResult};
use crate::transport::{ApiRequest, ApiResponse, ByteStream, StreamResponse, Transport};

type Handler = Arc<dyn Fn(&ApiRequest) -> ClientResult<ApiResponse> + Send + Sync>;

pub(crate) struct ScriptedTransport {
    handler: Handler,
    delay: Duration,
    streams: Mutex<VecDeque<ClientResult<StreamResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
    stream_requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        handler: impl Fn(&ApiRequest) -> ClientResult<ApiResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            delay: Duration::ZERO,
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            stream_requests: Mutex::new(Vec::new()),
        }
    }

    /// Transport with no buffered endpoints, for stream-only tests.
    pub(crate) fn streams_only() -> Self {
        Self::new(|_| Ok(ApiResponse::new(StatusCode::NOT_FOUND, Bytes::new())))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a stream whose body is exactly `frames`, then ends.
    pub(crate) fn push_stream(&self, status: StatusCode, frames: Vec<ClientResult<Bytes>>) {
        let body = futures_util::stream::iter(frames).boxed();
        self.push_stream_body(status, body);
    }

    /// Queue a stream fed by the returned sender. Dropping the receiving end
    /// (i.e. the client closing the connection) makes `is_closed()` true.
    pub(crate) fn push_live_stream(&self) -> mpsc::UnboundedSender<ClientResult<Bytes>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let body = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();
        self.push_stream_body(StatusCode::OK, body);
        tx
    }

    pub(crate) fn push_stream_body(&self, status: StatusCode, body: ByteStream) {
        self.streams
            .lock()
            .unwrap()
            .push_back(Ok(StreamResponse { status, body }));
    }

    pub(crate) fn push_stream_error(&self, error: ClientError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn stream_requests(&self) -> Vec<ApiRequest> {
        self.stream_requests.lock().unwrap().clone()
    }

    /// Number of buffered calls made to `route`.
    pub(crate) fn calls_to(&self, route: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.route() == route)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(&request)
    }

    async fn open_stream(&self, request: ApiRequest) -> ClientResult<StreamResponse> {
        self.stream_requests.lock().unwrap().push(request);
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Transport("no stream scripted".into())))
    }
}

pub(crate) fn json_response(status: StatusCode, value: serde_json::Value) -> ApiResponse {
    ApiResponse::new(status, Bytes::from(value.to_string()))
}

/// One SSE frame in wire format.
pub(crate) fn frame(event: &str, data: &str) -> ClientResult<Bytes> {
    Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", event, data)))
}
