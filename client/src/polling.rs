use std::time::Duration;

use shared::types::{ApiConfig, FeedState, NotificationMessage, PollingConfig, TopicId};
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::ClientResult;
use crate::feed_handle::FeedHandle;
use crate::gateway::Gateway;
use crate::transport::ApiRequest;

/// Feed for topics that do not need push latency (archived or ended events).
///
/// Fetches the whole, unscoped notification collection on a fixed interval,
/// keeps this topic's messages, and replaces the feed wholesale. A failed
/// fetch is logged and skipped; the previous feed stays exactly as it was.
#[derive(Clone)]
pub struct PollingFeedClient {
    gateway: Gateway,
    notifications_path: String,
}

impl PollingFeedClient {
    pub fn new(gateway: Gateway, api: &ApiConfig) -> Self {
        Self {
            gateway,
            notifications_path: api.notifications_path.clone(),
        }
    }

    /// Fetch immediately, then every `interval` until unsubscribed. A zero
    /// interval falls back to the default poll interval.
    pub fn subscribe(&self, topic_id: TopicId, interval: Duration) -> FeedHandle {
        let interval = if interval.is_zero() {
            let fallback = PollingConfig::default().interval();
            warn!(
                "Zero poll interval for topic {}, using {:?}",
                topic_id, fallback
            );
            fallback
        } else {
            interval
        };
        let client = self.clone();
        info!(
            "Polling notifications for topic {} every {:?}",
            topic_id, interval
        );
        FeedHandle::spawn(topic_id, move |state, shutdown| {
            client.run(topic_id, interval, state, shutdown)
        })
    }

    async fn fetch_all(&self) -> ClientResult<Vec<NotificationMessage>> {
        self.gateway
            .send_json(&ApiRequest::get(self.notifications_path.clone()))
            .await
    }

    async fn run(
        self,
        topic_id: TopicId,
        interval: Duration,
        state: watch::Sender<FeedState>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                _ = &mut shutdown => break,
                fetched = self.fetch_all() => fetched,
            };

            match fetched {
                Ok(collection) => {
                    debug!(
                        "Poll for topic {} returned {} messages (all topics)",
                        topic_id,
                        collection.len()
                    );
                    state.send_modify(|s| {
                        s.replace_from(collection);
                        s.mark_live();
                    });
                }
                Err(e) => warn!(
                    "Poll for topic {} failed, keeping previous feed: {}",
                    topic_id, e
                ),
            }
        }

        info!("Stopped polling topic {}", topic_id);
        state.send_modify(|s| s.mark_closed());
    }
}
