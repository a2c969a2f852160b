//! # Cluster Monitor
//!
//! Background liveness checks. Every interval the monitor probes each
//! registered peer and records the result in the [`ClusterRegistry`]. A
//! failing peer never stops the loop.

use super::descriptor::PeerDescriptor;
use super::registry::{ClusterRegistry, PeerProbe};
use crate::error::{Result, SlaveError};
use anyhow::Context;
use crossbeam::channel::{self, Sender};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Opens a TCP connection to the peer's web port
#[derive(Debug, Clone, Copy)]
pub struct TcpPeerProbe {
    timeout: Duration,
}

impl TcpPeerProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PeerProbe for TcpPeerProbe {
    fn probe(&self, peer: &PeerDescriptor) -> anyhow::Result<()> {
        let address = peer.server_and_port();
        let socket_addr = address
            .to_socket_addrs()
            .with_context(|| format!("resolving {address}"))?
            .next()
            .with_context(|| format!("no address for {address}"))?;
        TcpStream::connect_timeout(&socket_addr, self.timeout)
            .with_context(|| format!("connecting to {address}"))?;
        Ok(())
    }
}

pub struct ClusterMonitor {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ClusterMonitor {
    pub fn start(
        registry: Arc<ClusterRegistry>,
        probe: Arc<dyn PeerProbe>,
        interval: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(SlaveError::ConfigurationError(
                "cluster probe interval must be greater than zero".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);

        let handle = std::thread::Builder::new()
            .name("cluster-monitor".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "Starting cluster monitor");
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => probe_all(&registry, probe.as_ref()),
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                info!("Cluster monitor stopped");
            })
            .map_err(|e| {
                SlaveError::ConfigurationError(format!("Failed to spawn cluster monitor: {e}"))
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop and wait for the current round to finish
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the select
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Cluster monitor thread panicked");
            }
        }
    }
}

impl Drop for ClusterMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn probe_all(registry: &ClusterRegistry, probe: &dyn PeerProbe) {
    let start = Instant::now();
    let members = registry.list();
    let mut reachable = 0;

    for member in &members {
        if registry.probe(member.name(), probe) == Some(true) {
            reachable += 1;
        }
    }

    debug!(
        members = members.len(),
        reachable,
        duration_ms = start.elapsed().as_millis() as u64,
        "Cluster probe round completed"
    );
}
