use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use http::StatusCode;
use shared::types::{
    ApiConfig, FeedEvent, FeedState, NotificationMessage, SignOutReason, TopicId,
};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::feed_handle::FeedHandle;
use crate::sse::{SseFrame, SseFrameParser};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, ByteStream, Transport};

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

/// Map one SSE frame to a feed event.
///
/// | event          | payload                      |
/// |----------------|------------------------------|
/// | `initial`      | array of messages (snapshot) |
/// | `notification` | one message                  |
/// | `timeout`      | none                         |
///
/// Unnamed frames are heartbeats. A frame whose JSON does not parse is
/// logged and dropped; it never closes the connection.
pub fn decode_frame(frame: &SseFrame) -> Option<FeedEvent> {
    match frame.event.as_deref() {
        Some("initial") => match serde_json::from_str::<Vec<NotificationMessage>>(&frame.data) {
            Ok(snapshot) => Some(FeedEvent::Initial(snapshot)),
            Err(e) => {
                warn!("Dropping malformed initial frame: {}", e);
                None
            }
        },
        Some("notification") => match serde_json::from_str::<NotificationMessage>(&frame.data) {
            Ok(message) => Some(FeedEvent::New(message)),
            Err(e) => {
                warn!("Dropping malformed notification frame: {}", e);
                None
            }
        },
        Some("timeout") => Some(FeedEvent::Timeout),
        Some(other) => {
            debug!("Ignoring unknown stream event '{}'", other);
            None
        }
        None => None,
    }
}

/// Turn a raw push body into feed events.
///
/// Transport errors and the server hanging up both surface as a final
/// `FeedEvent::Error`; nothing is yielded after it.
pub fn feed_events(mut body: ByteStream) -> impl Stream<Item = FeedEvent> + Send {
    async_stream::stream! {
        let mut parser = SseFrameParser::new();
        let mut failure = None;

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in parser.feed(&bytes).into_iter().filter(|f| !f.is_heartbeat()) {
                        if let Some(event) = decode_frame(&frame) {
                            yield event;
                        }
                    }
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        match failure {
            Some(reason) => yield FeedEvent::Error(reason),
            None => {
                if let Some(event) = parser.flush().as_ref().and_then(decode_frame) {
                    yield event;
                }
                yield FeedEvent::Error("connection closed by server".to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Notification stream client
// ---------------------------------------------------------------------------

/// Live feed over a server-push connection, one connection per subscription.
///
/// `Connecting -> Live -> Degraded | Closed`. A timeout signal or transport
/// error leaves the feed `Degraded` with its messages intact and does not
/// reconnect; a fresh [`subscribe`](Self::subscribe) fetches a new snapshot.
#[derive(Clone)]
pub struct NotificationStreamClient {
    transport: Arc<dyn Transport>,
    store: TokenStore,
    api: ApiConfig,
}

impl NotificationStreamClient {
    pub fn new(transport: Arc<dyn Transport>, store: TokenStore, api: &ApiConfig) -> Self {
        Self {
            transport,
            store,
            api: api.clone(),
        }
    }

    pub fn subscribe(&self, topic_id: TopicId) -> FeedHandle {
        let client = self.clone();
        info!("Subscribing to live notifications for topic {}", topic_id);
        FeedHandle::spawn(topic_id, move |state, shutdown| {
            client.run(topic_id, state, shutdown)
        })
    }

    /// The push endpoint cannot take headers, so the token rides in the query.
    async fn stream_request(&self, topic_id: TopicId) -> ApiRequest {
        let request = ApiRequest::get(self.api.topic_stream_path(topic_id));
        match self.store.token().await {
            Some(token) => request.query("token", &token),
            None => {
                debug!("Opening topic {} stream without a token", topic_id);
                request
            }
        }
    }

    async fn run(
        self,
        topic_id: TopicId,
        state: watch::Sender<FeedState>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let request = self.stream_request(topic_id).await;

        let opened = tokio::select! {
            _ = &mut shutdown => {
                debug!("Topic {} unsubscribed while connecting", topic_id);
                state.send_modify(|s| s.mark_closed());
                return;
            }
            opened = self.transport.open_stream(request) => opened,
        };

        let body = match opened {
            Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                warn!("Topic {} stream rejected with 401, clearing session", topic_id);
                self.store.clear(SignOutReason::Unauthorized).await;
                state.send_modify(|s| s.mark_degraded("unauthorized"));
                return;
            }
            Ok(response) if !response.status.is_success() => {
                warn!("Topic {} stream rejected with status {}", topic_id, response.status);
                state.send_modify(|s| {
                    s.mark_degraded(format!("stream rejected with status {}", response.status))
                });
                return;
            }
            Ok(response) => response.body,
            Err(e) => {
                warn!("Topic {} stream failed to open: {}", topic_id, e);
                state.send_modify(|s| s.mark_degraded(e.to_string()));
                return;
            }
        };

        info!("Topic {} stream open", topic_id);
        let mut events = Box::pin(feed_events(body));

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Topic {} stream closed by subscriber", topic_id);
                    state.send_modify(|s| s.mark_closed());
                    break;
                }
                event = events.next() => {
                    let Some(event) = event else {
                        state.send_modify(|s| s.mark_degraded("stream ended"));
                        break;
                    };
                    if let FeedEvent::Error(reason) = &event {
                        warn!("Topic {} stream failed: {}", topic_id, reason);
                    } else if event == FeedEvent::Timeout {
                        info!("Topic {} stream timed out server-side", topic_id);
                    }
                    let mut keep_open = true;
                    state.send_modify(|s| keep_open = s.apply(event));
                    if !keep_open {
                        break;
                    }
                }
            }
        }
        // `events` owns the connection; dropping it here releases it on
        // every exit path.
    }
}
