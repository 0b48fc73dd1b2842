//! Session and live-notification core.
//!
//! One [`TokenStore`] is shared by the [`Gateway`] (authenticated calls),
//! the [`RefreshCoordinator`] (single-flight token refresh) and the two feed
//! clients: [`NotificationStreamClient`] over SSE and [`PollingFeedClient`]
//! as the fallback. [`SessionClient`] wires them together.

pub mod error;
pub mod feed_handle;
pub mod gateway;
pub mod polling;
pub mod refresh;
pub mod session;
pub mod sse;
pub mod stream;
pub mod token_store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ClientError, ClientResult, RefreshError};
pub use feed_handle::FeedHandle;
pub use gateway::Gateway;
pub use polling::PollingFeedClient;
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use session::SessionClient;
pub use stream::NotificationStreamClient;
pub use token_store::{FileTokenPersistence, MemoryTokenPersistence, TokenPersistence, TokenStore};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, StreamResponse, Transport};
