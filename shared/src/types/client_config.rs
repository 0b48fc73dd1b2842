use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Optional server-side logout. When absent, logout is purely local.
    #[serde(default)]
    pub logout_path: Option<String>,
    #[serde(default = "default_profile_path")]
    pub profile_path: String,
    #[serde(default = "default_notifications_path")]
    pub notifications_path: String,
    /// Prefix of the per-topic push endpoint; the topic id is appended.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Applies to buffered requests only, never to push connections.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// File holding the persisted access token. Memory-only when unset.
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ApiConfig {
    /// Minimal config pointing every endpoint at its default path.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            login_path: default_login_path(),
            refresh_path: default_refresh_path(),
            logout_path: None,
            profile_path: default_profile_path(),
            notifications_path: default_notifications_path(),
            stream_path: default_stream_path(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    /// Absolute URL for a path relative to the API root.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Path of the push endpoint for one topic, without the token query.
    pub fn topic_stream_path(&self, topic_id: i64) -> String {
        format!("{}/{}", self.stream_path.trim_end_matches('/'), topic_id)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn paths(&self) -> Vec<(&'static str, &str)> {
        let mut paths = vec![
            ("login_path", self.login_path.as_str()),
            ("refresh_path", self.refresh_path.as_str()),
            ("profile_path", self.profile_path.as_str()),
            ("notifications_path", self.notifications_path.as_str()),
            ("stream_path", self.stream_path.as_str()),
        ];
        if let Some(logout) = &self.logout_path {
            paths.push(("logout_path", logout.as_str()));
        }
        paths
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ClientConfig {
    pub fn new(api: ApiConfig) -> Self {
        Self {
            api,
            polling: PollingConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Structural checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api.base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::InvalidConfig("api.base_url cannot be empty".into()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidConfig(format!(
                "api.base_url must start with http:// or https:// (got {})",
                base
            )));
        }

        for (name, path) in self.api.paths() {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidConfig(format!(
                    "api.{} must start with '/' (got {:?})",
                    name, path
                )));
            }
        }

        if self.api.connect_timeout_secs == 0 || self.api.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "api timeouts must be greater than 0".into(),
            ));
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "polling.interval_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_login_path() -> String {
    "/auth/login".to_string()
}

pub fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

pub fn default_profile_path() -> String {
    "/users/me".to_string()
}

pub fn default_notifications_path() -> String {
    "/notifications".to_string()
}

pub fn default_stream_path() -> String {
    "/notifications/stream".to_string()
}

pub fn default_connect_timeout() -> u64 {
    10
}

pub fn default_request_timeout() -> u64 {
    30
}

pub fn default_poll_interval() -> u64 {
    5000
}

pub fn default_log_level() -> String {
    "info".to_string()
}
