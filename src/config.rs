//! # Slave Configuration
//!
//! Layered configuration: built-in defaults, then an optional file, then
//! `SLAVE__`-prefixed environment variables (`SLAVE__SOCKETS__BIND_HOST=127.0.0.1`).

use crate::cluster::PeerDescriptor;
use crate::constants::{self, env};
use crate::error::{Result, SlaveError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    pub server: ServerConfig,
    pub sockets: SocketConfig,
    pub cluster: ClusterConfig,
}

/// Identity of this node as published to its peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub root_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "slave".to_string(),
            hostname: "localhost".to_string(),
            port: 8081,
            root_prefix: constants::DEFAULT_ROOT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub bind_host: String,
    pub retry_interval_seconds: u64,
    pub retry_ceiling_seconds: u64,
    pub port_range_start: u16,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_host: constants::sockets::DEFAULT_BIND_HOST.to_string(),
            retry_interval_seconds: constants::sockets::BIND_RETRY_INTERVAL.as_secs(),
            retry_ceiling_seconds: constants::sockets::BIND_RETRY_CEILING.as_secs(),
            port_range_start: constants::sockets::DEFAULT_PORT_RANGE_START,
        }
    }
}

impl SocketConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }

    pub fn retry_ceiling(&self) -> Duration {
        Duration::from_secs(self.retry_ceiling_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub monitor_enabled: bool,
    pub probe_interval_seconds: u64,
    pub probe_timeout_ms: u64,
    /// Masters known at startup; seeded into the cluster registry
    pub masters: Vec<PeerDescriptor>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            monitor_enabled: false,
            probe_interval_seconds: constants::cluster::PROBE_INTERVAL.as_secs(),
            probe_timeout_ms: constants::cluster::PROBE_TIMEOUT.as_millis() as u64,
            masters: Vec::new(),
        }
    }
}

impl ClusterConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl SlaveConfig {
    /// Defaults overlaid with environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Defaults, then the given file (if any), then environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(
            &SlaveConfig::default(),
        )?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: SlaveConfig = builder
            .add_source(
                config::Environment::with_prefix(env::CONFIG_PREFIX)
                    .prefix_separator(env::CONFIG_SEPARATOR)
                    .separator(env::CONFIG_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.root_prefix.trim_matches(constants::PATH_SEPARATOR).is_empty() {
            return Err(SlaveError::ConfigurationError(
                "server.root_prefix cannot be empty".to_string(),
            ));
        }

        if self.sockets.retry_interval_seconds == 0 {
            return Err(SlaveError::ConfigurationError(
                "sockets.retry_interval_seconds must be greater than zero".to_string(),
            ));
        }

        if self.sockets.retry_ceiling_seconds < self.sockets.retry_interval_seconds {
            return Err(SlaveError::ConfigurationError(format!(
                "sockets.retry_ceiling_seconds ({}) is shorter than the retry interval ({})",
                self.sockets.retry_ceiling_seconds, self.sockets.retry_interval_seconds
            )));
        }

        if self.cluster.monitor_enabled && self.cluster.probe_interval_seconds == 0 {
            return Err(SlaveError::ConfigurationError(
                "cluster.probe_interval_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
