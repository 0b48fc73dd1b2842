use std::fmt;

use serde::{Deserialize, Serialize};

pub type MessageId = i64;

/// Identifier of a notification channel. Each event has exactly one.
pub type TopicId = i64;

/// One notification posted to an event's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: MessageId,
    #[serde(alias = "event_id", alias = "event")]
    pub topic_id: TopicId,
    #[serde(alias = "message", alias = "text")]
    pub body: String,
    /// Unix timestamp in milliseconds.
    #[serde(alias = "timestamp")]
    pub created_at: i64,
}

impl NotificationMessage {
    pub fn belongs_to(&self, topic_id: TopicId) -> bool {
        self.topic_id == topic_id
    }
}

impl fmt::Display for NotificationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] #{} (topic {}): {}",
            self.created_at, self.id, self.topic_id, self.body
        )
    }
}
