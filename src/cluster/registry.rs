//! # Cluster Registry
//!
//! The peers this node knows about, in the order they first registered.
//! Members are never dropped; a peer that stops answering is only marked
//! inactive.

use super::descriptor::{PeerDescriptor, PeerDetection};
use crate::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Checks whether a peer is reachable
pub trait PeerProbe: Send + Sync {
    fn probe(&self, peer: &PeerDescriptor) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Added,
    Updated,
}

pub struct ClusterRegistry {
    members: Mutex<Vec<PeerDetection>>,
    clock: Arc<dyn Clock>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Add a peer, or refresh the one with the same identity in place
    pub fn upsert(&self, detection: PeerDetection) -> UpsertOutcome {
        let now = self.clock.now();
        let mut members = self.members.lock();

        if let Some(existing) = members
            .iter_mut()
            .find(|member| member.server.is_same_member(&detection.server))
        {
            existing.server = detection.server;
            existing.active = detection.active;
            if detection.active {
                existing.last_active = Some(detection.last_active.unwrap_or(now));
            } else {
                existing.last_inactive = Some(detection.last_inactive.unwrap_or(now));
            }
            debug!(peer = %existing.server, active = existing.active, "Cluster member refreshed");
            return UpsertOutcome::Updated;
        }

        info!(peer = %detection.server, active = detection.active, "🤝 Cluster member registered");
        members.push(detection);
        UpsertOutcome::Added
    }

    pub fn list(&self) -> Vec<PeerDetection> {
        self.members.lock().clone()
    }

    pub fn get(&self, name: &str) -> Option<PeerDetection> {
        self.members
            .lock()
            .iter()
            .find(|member| member.server.has_name(name))
            .cloned()
    }

    pub fn active_members(&self) -> Vec<PeerDetection> {
        self.members
            .lock()
            .iter()
            .filter(|member| member.active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Check one member and record the result. Probe failures never escape.
    ///
    /// Returns the observed state, or `None` for an unknown member.
    pub fn probe(&self, name: &str, prober: &dyn PeerProbe) -> Option<bool> {
        let server = self.get(name)?.server;

        // The lock is not held while the probe talks to the network
        let reachable = match prober.probe(&server) {
            Ok(()) => true,
            Err(err) => {
                warn!(peer = %server, error = %err, "Cluster member did not answer");
                false
            }
        };

        let now = self.clock.now();
        let mut members = self.members.lock();
        let member = members.iter_mut().find(|member| member.server.has_name(name))?;
        member.active = reachable;
        if reachable {
            member.last_active = Some(now);
        } else {
            member.last_inactive = Some(now);
        }
        Some(reachable)
    }
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
