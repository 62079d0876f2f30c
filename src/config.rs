use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reconnect::ReconnectPolicy;

const DEFAULT_CONFIG_FILE: &str = "farmlink";
const ENV_PREFIX: &str = "FARMLINK";

/// What happens to joined conversations when the connection comes back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejoinPolicy {
    /// Joins are not remembered; the caller re-joins after reconnecting.
    #[default]
    Never,
    /// Conversations whose join reached the socket are joined again after
    /// every reconnect, until left or until an explicit disconnect.
    ReplayOnReconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub rejoin: RejoinPolicy,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:3003/ws".to_string(),
            rejoin: RejoinPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rejoin(mut self, policy: RejoinPolicy) -> Self {
        self.rejoin = policy;
        self
    }

    /// Defaults, then `path` (or an optional `farmlink.toml` in the working
    /// directory), then `FARMLINK__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: Self = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!("Loaded client configuration for {}", config.endpoint);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://") {
            Ok(())
        } else {
            Err(ConfigError::Scheme(self.endpoint.clone()))
        }
    }
}
