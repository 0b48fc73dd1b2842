// shared/src/types/feed.rs
// Ordered, de-duplicated notification feed shared by the stream and polling clients

use std::collections::HashSet;
use std::fmt;

use super::notification::{MessageId, NotificationMessage, TopicId};

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Live,
    /// The connection dropped or timed out. Messages already received stay
    /// visible; the subscriber must re-subscribe to recover.
    Degraded,
    Closed,
}

impl ConnectionStatus {
    /// Whether the UI should show its "disconnected" indicator.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Degraded | Self::Closed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Live => write!(f, "live"),
            Self::Degraded => write!(f, "degraded"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Feed events
// ---------------------------------------------------------------------------

/// Everything a push connection can deliver, in one tagged union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The snapshot sent once when the connection opens.
    Initial(Vec<NotificationMessage>),
    /// A single message pushed after the snapshot.
    New(NotificationMessage),
    /// The server is closing the stream.
    Timeout,
    /// Transport-level failure. The connection is unusable.
    Error(String),
}

// ---------------------------------------------------------------------------
// Feed state
// ---------------------------------------------------------------------------

/// The view one subscriber holds of one topic.
///
/// Invariants kept by every mutating method:
///   * `messages` is sorted by `created_at`, oldest first (ties keep arrival order)
///   * no `id` appears twice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedState {
    pub topic_id: TopicId,
    pub messages: Vec<NotificationMessage>,
    pub status: ConnectionStatus,
    /// Reason for the most recent degradation, for the disconnected indicator.
    pub last_error: Option<String>,
}

impl FeedState {
    pub fn connecting(topic_id: TopicId) -> Self {
        Self {
            topic_id,
            messages: Vec::new(),
            status: ConnectionStatus::Connecting,
            last_error: None,
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|m| m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Merge a snapshot with whatever is already in the feed.
    ///
    /// Pushes that raced ahead of the snapshot are kept; snapshot entries win
    /// on duplicate ids.
    pub fn merge_snapshot(&mut self, snapshot: Vec<NotificationMessage>) {
        let existing = std::mem::take(&mut self.messages);
        let combined = snapshot.into_iter().chain(existing).collect();
        self.messages = normalize(combined);
    }

    /// Insert one message at its sorted position. Returns `false` when the id
    /// is already present and the message was dropped.
    pub fn insert(&mut self, message: NotificationMessage) -> bool {
        if self.contains(message.id) {
            return false;
        }
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(pos, message);
        true
    }

    /// Replace the whole feed with the messages of this topic found in an
    /// unscoped collection.
    pub fn replace_from(&mut self, collection: Vec<NotificationMessage>) {
        let topic_id = self.topic_id;
        self.messages = normalize(
            collection
                .into_iter()
                .filter(|m| m.belongs_to(topic_id))
                .collect(),
        );
    }

    pub fn mark_live(&mut self) {
        self.status = ConnectionStatus::Live;
        self.last_error = None;
    }

    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        self.status = ConnectionStatus::Degraded;
        self.last_error = Some(reason.into());
    }

    pub fn mark_closed(&mut self) {
        self.status = ConnectionStatus::Closed;
    }

    /// Apply one push event. Returns `true` while the connection should stay
    /// open.
    pub fn apply(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Initial(snapshot) => {
                self.merge_snapshot(snapshot);
                self.mark_live();
                true
            }
            FeedEvent::New(message) => {
                self.insert(message);
                self.mark_live();
                true
            }
            FeedEvent::Timeout => {
                self.mark_degraded("server timeout");
                false
            }
            FeedEvent::Error(reason) => {
                self.mark_degraded(reason);
                false
            }
        }
    }
}

/// De-duplicate by id (first occurrence wins) then stable-sort by timestamp.
fn normalize(messages: Vec<NotificationMessage>) -> Vec<NotificationMessage> {
    let mut seen = HashSet::with_capacity(messages.len());
    let mut out: Vec<NotificationMessage> =
        messages.into_iter().filter(|m| seen.insert(m.id)).collect();
    out.sort_by_key(|m| m.created_at);
    out
}
