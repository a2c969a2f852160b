//! Port number bookkeeping for clustered runs.
//!
//! Every source/target step pair of a clustered run needs its own port on
//! the host that receives the rows. Asking again for the same pair returns
//! the same port; ports freed by a finished run are handed out again.

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SlaveError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Who needs a port: one data channel of one clustered run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAllocationRequest {
    pub hostname: String,
    pub clustered_run_id: String,
    pub unit_name: String,
    pub source_slave: String,
    pub source_step: String,
    pub source_copy: String,
    pub target_slave: String,
    pub target_step: String,
    pub target_copy: String,
    /// Lowest port the caller is willing to use
    pub range_start: u16,
}

impl PortAllocationRequest {
    fn same_channel(&self, other: &PortAllocationRequest) -> bool {
        self.clustered_run_id == other.clustered_run_id
            && self.unit_name == other.unit_name
            && self.source_slave == other.source_slave
            && self.source_step == other.source_step
            && self.source_copy == other.source_copy
            && self.target_slave == other.target_slave
            && self.target_step == other.target_step
            && self.target_copy == other.target_copy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortAllocation {
    pub port: u16,
    pub request: PortAllocationRequest,
    pub allocated: bool,
    pub allocated_at: DateTime<Utc>,
}

pub struct PortAllocationTable {
    hosts: Mutex<HashMap<String, Vec<PortAllocation>>>,
    clock: Arc<dyn Clock>,
}

impl PortAllocationTable {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn allocate(&self, request: PortAllocationRequest) -> Result<u16> {
        let now = self.clock.now();
        let mut hosts = self.hosts.lock();
        let allocations = hosts.entry(request.hostname.clone()).or_default();

        if let Some(existing) = allocations
            .iter_mut()
            .find(|allocation| allocation.allocated && allocation.request.same_channel(&request))
        {
            existing.allocated_at = now;
            debug!(port = existing.port, run = %request.clustered_run_id, "Port already allocated to channel");
            return Ok(existing.port);
        }

        if let Some(freed) = allocations
            .iter_mut()
            .filter(|allocation| !allocation.allocated && allocation.port >= request.range_start)
            .min_by_key(|allocation| allocation.port)
        {
            freed.allocated = true;
            freed.allocated_at = now;
            freed.request = request;
            info!(port = freed.port, hostname = %freed.request.hostname, "Reallocated freed port");
            return Ok(freed.port);
        }

        let port = match allocations.iter().map(|allocation| allocation.port).max() {
            Some(highest) => highest
                .checked_add(1)
                .ok_or_else(|| {
                    SlaveError::InvalidRequest(format!(
                        "No ports left on host '{}'",
                        request.hostname
                    ))
                })?
                .max(request.range_start),
            None => request.range_start,
        };

        info!(port, hostname = %request.hostname, run = %request.clustered_run_id, "Allocated port");
        allocations.push(PortAllocation {
            port,
            request,
            allocated: true,
            allocated_at: now,
        });
        Ok(port)
    }

    /// Free every port held by a run; returns how many were freed
    pub fn deallocate_run(&self, unit_name: &str, clustered_run_id: &str) -> usize {
        let mut hosts = self.hosts.lock();
        let mut freed = 0;
        for allocation in hosts.values_mut().flatten() {
            if allocation.allocated
                && allocation.request.unit_name == unit_name
                && allocation.request.clustered_run_id == clustered_run_id
            {
                allocation.allocated = false;
                freed += 1;
            }
        }
        info!(unit = unit_name, run = clustered_run_id, freed, "Deallocated run ports");
        freed
    }

    pub fn deallocate_port(&self, hostname: &str, port: u16) -> bool {
        let mut hosts = self.hosts.lock();
        hosts
            .get_mut(hostname)
            .and_then(|allocations| allocations.iter_mut().find(|a| a.port == port && a.allocated))
            .map(|allocation| allocation.allocated = false)
            .is_some()
    }

    pub fn allocations(&self, hostname: &str) -> Vec<PortAllocation> {
        let hosts = self.hosts.lock();
        let mut allocations = hosts.get(hostname).cloned().unwrap_or_default();
        allocations.sort_by_key(|allocation| allocation.port);
        allocations
    }
}

impl Default for PortAllocationTable {
    fn default() -> Self {
        Self::new()
    }
}
