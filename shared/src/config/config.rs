use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

use crate::types::client_config::{ClientConfig, ConfigError};

pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path.display());

    let config = parse_config(&contents)?;

    info!("Configuration loaded successfully");
    Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(contents: &str) -> Result<ClientConfig, ConfigError> {
    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: ClientConfig = toml::from_str(contents)?;
    debug!("Config: {:?}", config);

    config.validate()?;

    info!("Config validated");

    Ok(config)
}
