//! Server configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use optimax_core::{RulesConfig, RulesError};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server
    pub bind_address: SocketAddr,
    /// Maximum simultaneous connections (agents + spectators)
    pub max_clients: usize,
    /// Maximum spectators attached to one lobby
    pub max_spectators: usize,
    /// Per-tick action window; missing actions default to `Stay` after it
    pub tick_timeout_ms: u64,
    /// Lower bound on the time between two resolved ticks
    pub min_tick_interval_ms: u64,
    /// How long an ended lobby stays queryable before it is reaped
    pub lobby_retention_ms: u64,
    /// Fixed world seed for every lobby (random per lobby when unset)
    pub seed: Option<u64>,
    pub rate_limit: RateLimitConfig,
    pub rules: RulesConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 7777)),
            max_clients: 64,
            max_spectators: 8,
            tick_timeout_ms: 1_000,
            min_tick_interval_ms: 100,
            lobby_retention_ms: 30_000,
            seed: None,
            rate_limit: RateLimitConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

/// Per-client message rate limit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Messages allowed per window
    pub messages: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages: 60,
            window_ms: 1_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl ServerConfig {
    /// Load a YAML config file; fields it omits keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients < 2 {
            return Err(ConfigError::Invalid("max_clients must allow two agents".into()));
        }
        if self.tick_timeout_ms == 0 {
            return Err(ConfigError::Invalid("tick_timeout_ms must be positive".into()));
        }
        if self.rate_limit.messages == 0 || self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Invalid("rate limit must allow some traffic".into()));
        }
        self.rules.validate()?;
        Ok(())
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_millis(self.tick_timeout_ms)
    }

    pub fn min_tick_interval(&self) -> Duration {
        Duration::from_millis(self.min_tick_interval_ms)
    }

    pub fn lobby_retention(&self) -> Duration {
        Duration::from_millis(self.lobby_retention_ms)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid rules: {0}")]
    Rules(#[from] RulesError),
}
