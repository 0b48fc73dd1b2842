pub mod auth;
pub mod client_config;
pub mod feed;
pub mod json_error;
pub mod notification;
pub mod session;

pub use self::auth::{LoginData, TokenResponse};
pub use self::client_config::{
    ApiConfig, ClientConfig, ConfigError, LoggingConfig, PollingConfig, StorageConfig,
};
pub use self::feed::{ConnectionStatus, FeedEvent, FeedState};
pub use self::json_error::ErrorResponse;
pub use self::notification::{MessageId, NotificationMessage, TopicId};
pub use self::session::{Identity, Session, SessionEvent, SignOutReason};
