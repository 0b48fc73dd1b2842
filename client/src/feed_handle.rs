use std::future::Future;

use shared::types::{ConnectionStatus, FeedState, TopicId};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A subscriber's view of one topic, kept current by a background task.
///
/// Both the push client and the polling client hand out this same handle.
/// The subscription is a scoped resource: [`unsubscribe`](Self::unsubscribe)
/// or dropping the handle releases the connection or timer. Unsubscribing is
/// idempotent, including after the task already stopped on its own.
#[derive(Debug)]
pub struct FeedHandle {
    topic_id: TopicId,
    state: watch::Receiver<FeedState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Spawn `run` with the sending half of the feed and a shutdown signal.
    /// The signal also fires when the handle is dropped.
    pub(crate) fn spawn<F, Fut>(topic_id: TopicId, run: F) -> Self
    where
        F: FnOnce(watch::Sender<FeedState>, oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (state_tx, state) = watch::channel(FeedState::connecting(topic_id));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(state_tx, shutdown_rx));
        Self {
            topic_id,
            state,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    /// Copy of the current feed.
    pub fn current(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// Another receiver on the same feed, e.g. for a second widget.
    pub fn watch(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Wait for the next update. `None` once the background task is gone and
    /// its final state has been observed.
    pub async fn changed(&mut self) -> Option<FeedState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Whether the background task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop updates and release the underlying connection or timer.
    pub fn unsubscribe(&mut self) {
        match self.shutdown.take() {
            Some(tx) => {
                debug!("Unsubscribing from topic {}", self.topic_id);
                // Err means the task already exited on its own.
                let _ = tx.send(());
            }
            None => debug!("Topic {} already unsubscribed", self.topic_id),
        }
    }

    /// Wait for the background task to finish.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Feed task for topic {} ended abnormally: {}", self.topic_id, e);
            }
        }
    }

    /// Unsubscribe, wait for teardown and return the final state.
    pub async fn shutdown(mut self) -> FeedState {
        self.unsubscribe();
        self.closed().await;
        self.current()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
