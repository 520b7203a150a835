//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`OWN_`-prefixed)
//!
//! The gateway section seeds a [`GatewayDescriptor`]; the handler section
//! bounds the command worker pool and timeouts.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::discovery::GatewayDescriptor;
use crate::error::{OwnError, Result};

/// Smallest allowed command worker pool.
pub const MIN_WORKER_COUNT: usize = 1;

/// Largest allowed command worker pool.
pub const MAX_WORKER_COUNT: usize = 10;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway connection configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Handler configuration.
    #[serde(default)]
    pub handler: HandlerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| OwnError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| OwnError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("OWN_ADDRESS") {
            config.gateway.address = address;
        }
        if let Ok(port) = std::env::var("OWN_PORT") {
            if let Ok(port) = port.parse() {
                config.gateway.port = port;
            }
        }
        if let Ok(password) = std::env::var("OWN_PASSWORD") {
            config.gateway.password = Some(password);
        }
        if let Ok(count) = std::env::var("OWN_WORKER_COUNT") {
            if let Ok(count) = count.parse() {
                config.handler.worker_count = count;
            }
        }

        config
    }

    /// Merge with another config (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            gateway: GatewayConfig {
                address: if other.gateway.address != defaults.gateway.address {
                    other.gateway.address
                } else {
                    self.gateway.address
                },
                port: if other.gateway.port != defaults.gateway.port {
                    other.gateway.port
                } else {
                    self.gateway.port
                },
                password: other.gateway.password.or(self.gateway.password),
            },
            handler: other.handler,
        }
    }

    /// Descriptor seeding a [`Gateway`](crate::gateway::Gateway) from the
    /// configured connection parameters.
    pub fn gateway_descriptor(&self) -> GatewayDescriptor {
        GatewayDescriptor {
            address: Some(self.gateway.address.clone()),
            port: Some(self.gateway.port),
            password: self.gateway.password.clone(),
            ..GatewayDescriptor::default()
        }
    }
}

/// Gateway connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway network address.
    pub address: String,

    /// Gateway TCP port.
    pub port: u16,

    /// OPEN password, when the gateway demands authentication.
    pub password: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: crate::gateway::DEFAULT_PORT,
            password: None,
        }
    }
}

/// Handler configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Command worker pool size, bounded 1-10.
    pub worker_count: usize,

    /// Per-command response deadline in seconds.
    pub command_timeout_secs: u64,

    /// Capacity of the subscriber event channel.
    pub event_buffer: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            command_timeout_secs: 10,
            event_buffer: 64,
        }
    }
}

impl HandlerConfig {
    /// Worker count clamped to the allowed 1-10 range.
    pub fn effective_worker_count(&self) -> usize {
        if !(MIN_WORKER_COUNT..=MAX_WORKER_COUNT).contains(&self.worker_count) {
            warn!(
                "worker_count {} outside {}..={}, clamping",
                self.worker_count, MIN_WORKER_COUNT, MAX_WORKER_COUNT
            );
        }
        self.worker_count.clamp(MIN_WORKER_COUNT, MAX_WORKER_COUNT)
    }

    /// Per-command response deadline.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Event channel capacity, never zero.
    pub fn effective_event_buffer(&self) -> usize {
        self.event_buffer.max(1)
    }
}
