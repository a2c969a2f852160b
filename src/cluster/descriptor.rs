//! Peer identity and liveness records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    #[default]
    Regular,
    FailoverMaster,
}

/// A cluster member. Identity is the name, compared case-insensitively.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerDescriptor {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub web_app_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy_hostname: Option<String>,
    pub proxy_port: Option<u16>,
    pub non_proxy_hosts: Option<String>,
    pub role: PeerRole,
    pub ssl_mode: bool,
}

impl PeerDescriptor {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_role(mut self, role: PeerRole) -> Self {
        self.role = role;
        self
    }

    pub fn is_same_member(&self, other: &PeerDescriptor) -> bool {
        self.has_name(&other.name)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_failover_master(&self) -> bool {
        self.role == PeerRole::FailoverMaster
    }

    /// `host:port`, the address probes connect to
    pub fn server_and_port(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl PartialEq for PeerDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_member(other)
    }
}

impl Eq for PeerDescriptor {}

impl fmt::Debug for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerDescriptor")
            .field("name", &self.name)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("web_app_name", &self.web_app_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("proxy_hostname", &self.proxy_hostname)
            .field("proxy_port", &self.proxy_port)
            .field("role", &self.role)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.server_and_port())
    }
}

/// What this node last observed about a peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDetection {
    pub server: PeerDescriptor,
    pub active: bool,
    pub last_active: Option<DateTime<Utc>>,
    pub last_inactive: Option<DateTime<Utc>>,
}

impl PeerDetection {
    pub fn active(server: PeerDescriptor, at: DateTime<Utc>) -> Self {
        Self {
            server,
            active: true,
            last_active: Some(at),
            last_inactive: None,
        }
    }

    pub fn inactive(server: PeerDescriptor, at: DateTime<Utc>) -> Self {
        Self {
            server,
            active: false,
            last_active: None,
            last_inactive: Some(at),
        }
    }

    pub fn name(&self) -> &str {
        &self.server.name
    }
}

impl PartialEq for PeerDetection {
    fn eq(&self, other: &Self) -> bool {
        self.server.is_same_member(&other.server)
    }
}

impl Eq for PeerDetection {}
