//! Error types for the slave coordination core.
//!
//! Lookup misses (`get`, `find_by_id`, an unknown dispatch path) are not errors:
//! they come back as `None` or [`DispatchOutcome::NotFound`](crate::dispatch::DispatchOutcome).
//! Everything in [`SlaveError`] is something the immediate caller has to report.

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlaveError {
    /// The port is leased by someone else
    #[error("Server socket on port {port} is already in use by '{holder}'")]
    PortInUse { port: u16, holder: String },

    #[error("Port {port} was never allocated")]
    PortNotAllocated { port: u16 },

    #[error("Unable to bind server socket on port {port}: {source}")]
    BindFailed {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The bind retry ceiling elapsed; carries the last bind error
    #[error("Unable to bind server socket on port {port} after waiting {waited:?}: {source}")]
    BindTimeout {
        port: u16,
        waited: Duration,
        #[source]
        source: io::Error,
    },

    #[error("Bind of port {port} was cancelled after waiting {waited:?}")]
    BindCancelled { port: u16, waited: Duration },

    #[error("Delegation failed for sub-unit '{unit}' of '{parent}': {reason}")]
    DelegationFailed {
        parent: String,
        unit: String,
        reason: String,
    },

    /// A resolved handler raised while serving the request
    #[error("Handler for '{path}' failed: {source}")]
    HandlerFailed {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SlaveError {
    /// True when the caller lost a race for a held resource
    pub fn is_contention(&self) -> bool {
        matches!(self, SlaveError::PortInUse { .. })
    }
}

impl From<serde_json::Error> for SlaveError {
    fn from(error: serde_json::Error) -> Self {
        SlaveError::SerializationError(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for SlaveError {
    fn from(error: config::ConfigError) -> Self {
        SlaveError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SlaveError>;
