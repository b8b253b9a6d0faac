//! Server configuration
//!
//! Loaded from an optional TOML file; every section and field has a default,
//! and command-line flags override what the file says.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agentmem_graph::{RetryPolicy, StoreConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreSettings,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loading config from: {}", path.display());
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> ServerResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ServerResult<()> {
        let retry = &self.store.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("store.retry.max_attempts must be > 0"));
        }
        if retry.initial_delay_ms == 0 {
            return Err(invalid("store.retry.initial_delay_ms must be > 0"));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(invalid(
                "store.retry.max_delay_ms must be >= store.retry.initial_delay_ms",
            ));
        }
        if self.server.default_zone.trim().is_empty() {
            return Err(invalid("server.default_zone must not be empty"));
        }
        if self.server.transport == TransportType::Http {
            self.bind_addr()?;
        }
        Ok(())
    }

    /// Address the HTTP transport listens on.
    pub fn bind_addr(&self) -> ServerResult<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|e| invalid(format!("server.bind '{}': {}", self.server.bind, e)))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.store.data_dir)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.store.retry.max_attempts,
            initial_delay: Duration::from_millis(self.store.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.store.retry.max_delay_ms),
        }
    }
}

fn invalid(message: impl Into<String>) -> ServerError {
    ServerError::InvalidConfig(message.into())
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Transport type: "stdio" or "http"
    pub transport: TransportType,
    /// Listen address (only used when transport is "http")
    pub bind: String,
    /// Zone used by tool calls that do not name one; created on startup
    pub default_zone: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportType::Stdio,
            bind: "127.0.0.1:8765".to_string(),
            default_zone: "default".to_string(),
        }
    }
}

/// Transport type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Stdio,
    Http,
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// RocksDB directory
    pub data_dir: PathBuf,
    pub retry: RetrySettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".agentmem"),
            retry: RetrySettings::default(),
        }
    }
}

/// Startup connection retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}
