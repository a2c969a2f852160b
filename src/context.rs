//! # Slave Context
//!
//! Owns every shared component of a running slave node: the execution
//! registries and delegation relay, socket leases, port allocations, cluster
//! membership and the dispatch router. Build one with [`SlaveContext::builder`]
//! and call [`SlaveContext::shutdown`] to close sockets and stop the monitor.

use crate::clock::{Clock, RetryTimer, SystemClock, SystemTimer};
use crate::cluster::{ClusterMonitor, ClusterRegistry, PeerDetection, PeerProbe, TcpPeerProbe};
use crate::config::SlaveConfig;
use crate::dispatch::{BuiltinHandlers, DispatchRouter};
use crate::error::{Result, SlaveError};
use crate::execution::UnitKind;
use crate::identity::{ExecutionKey, IdSource, UuidIdSource};
use crate::registry::{DelegationRelay, ExecutionRegistry};
use crate::sockets::{
    BindRetryPolicy, PortAllocationTable, SocketAllocator, SocketBinder, SocketLeaseInfo, TcpBinder,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared state of one slave node
///
/// Explicit dependency container for everything request handlers and the
/// execution engine share:
/// - Job and transformation registries, and the relay feeding them
/// - Socket allocator and port allocation table
/// - Cluster registry and its optional monitor
/// - Dispatch router, pre-loaded with the built-in control handlers
pub struct SlaveContext {
    pub node_id: Uuid,
    pub config: SlaveConfig,
    pub jobs: Arc<ExecutionRegistry>,
    pub transformations: Arc<ExecutionRegistry>,
    pub relay: Arc<DelegationRelay>,
    pub sockets: Arc<SocketAllocator>,
    pub ports: Arc<PortAllocationTable>,
    pub cluster: Arc<ClusterRegistry>,
    pub router: Arc<DispatchRouter>,
    pub clock: Arc<dyn Clock>,
    reporter: Arc<StatusReporter>,
    monitor: Mutex<Option<ClusterMonitor>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for SlaveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlaveContext")
            .field("node_id", &self.node_id)
            .field("server", &self.config.server.name)
            .field("jobs", &self.jobs.len())
            .field("transformations", &self.transformations.len())
            .field("cluster_members", &self.cluster.len())
            .field("router", &self.router)
            .field("monitor_running", &self.monitor.lock().is_some())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl SlaveContext {
    /// Context with the standard binder, timers, id source and probe
    pub fn new(config: SlaveConfig) -> Result<Self> {
        SlaveContextBuilder::new(config).build()
    }

    pub fn builder(config: SlaveConfig) -> SlaveContextBuilder {
        SlaveContextBuilder::new(config)
    }

    pub fn registry(&self, kind: UnitKind) -> &Arc<ExecutionRegistry> {
        self.relay.registry(kind)
    }

    pub fn status(&self) -> SlaveStatus {
        self.reporter.snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop the cluster monitor and close every server socket.
    /// Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(server = %self.config.server.name, "🛑 Shutting down slave context");
        if let Some(mut monitor) = self.monitor.lock().take() {
            monitor.stop();
        }
        let closed = self.sockets.close_all();
        info!(closed_sockets = closed, "✅ Slave context shut down");
    }
}

impl Drop for SlaveContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Overrides for the pieces of a [`SlaveContext`] that touch the outside world
pub struct SlaveContextBuilder {
    config: SlaveConfig,
    binder: Option<Arc<dyn SocketBinder>>,
    timer: Option<Arc<dyn RetryTimer>>,
    clock: Option<Arc<dyn Clock>>,
    id_source: Option<Arc<dyn IdSource>>,
    probe: Option<Arc<dyn PeerProbe>>,
}

impl SlaveContextBuilder {
    pub fn new(config: SlaveConfig) -> Self {
        Self {
            config,
            binder: None,
            timer: None,
            clock: None,
            id_source: None,
            probe: None,
        }
    }

    pub fn binder(mut self, binder: Arc<dyn SocketBinder>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn timer(mut self, timer: Arc<dyn RetryTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_source(mut self, id_source: Arc<dyn IdSource>) -> Self {
        self.id_source = Some(id_source);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn PeerProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> Result<SlaveContext> {
        let config = self.config;
        config.validate()?;

        let node_id = Uuid::new_v4();
        info!(
            node_id = %node_id,
            server = %config.server.name,
            "🔧 Initializing slave context"
        );

        let binder: Arc<dyn SocketBinder> = match self.binder {
            Some(binder) => binder,
            None => {
                let host: IpAddr = config.sockets.bind_host.parse().map_err(|e| {
                    SlaveError::ConfigurationError(format!(
                        "sockets.bind_host '{}' is not an IP address: {e}",
                        config.sockets.bind_host
                    ))
                })?;
                Arc::new(TcpBinder::new(host))
            }
        };
        let timer = self.timer.unwrap_or_else(|| Arc::new(SystemTimer));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_source = self.id_source.unwrap_or_else(|| Arc::new(UuidIdSource));

        let jobs = Arc::new(ExecutionRegistry::with_id_source(UnitKind::Job, id_source.clone()));
        let transformations = Arc::new(ExecutionRegistry::with_id_source(
            UnitKind::Transformation,
            id_source,
        ));
        let relay = DelegationRelay::new(jobs.clone(), transformations.clone());

        let sockets = Arc::new(SocketAllocator::with_binder(
            binder,
            timer,
            BindRetryPolicy {
                interval: config.sockets.retry_interval(),
                ceiling: config.sockets.retry_ceiling(),
            },
        ));
        let ports = Arc::new(PortAllocationTable::with_clock(clock.clone()));

        let cluster = Arc::new(ClusterRegistry::with_clock(clock.clone()));
        for master in &config.cluster.masters {
            cluster.upsert(PeerDetection {
                server: master.clone(),
                active: false,
                last_active: None,
                last_inactive: None,
            });
        }

        let reporter = Arc::new(StatusReporter {
            server_name: config.server.name.clone(),
            started_at: clock.now(),
            clock: clock.clone(),
            jobs: jobs.clone(),
            transformations: transformations.clone(),
            sockets: sockets.clone(),
            cluster: cluster.clone(),
        });

        let router = Arc::new(DispatchRouter::new(config.server.root_prefix.clone()));
        let builtins = BuiltinHandlers {
            reporter: reporter.clone(),
            jobs: jobs.clone(),
            transformations: transformations.clone(),
            cluster: cluster.clone(),
            ports: ports.clone(),
            default_range_start: config.sockets.port_range_start,
        };
        for handler in builtins.into_handlers() {
            router.register_static(handler);
        }

        let monitor = if config.cluster.monitor_enabled {
            let probe: Arc<dyn PeerProbe> = self
                .probe
                .unwrap_or_else(|| Arc::new(TcpPeerProbe::new(config.cluster.probe_timeout())));
            Some(ClusterMonitor::start(
                cluster.clone(),
                probe,
                config.cluster.probe_interval(),
            )?)
        } else {
            None
        };

        info!(
            routes = router.len(),
            masters = config.cluster.masters.len(),
            monitor = monitor.is_some(),
            "✅ Slave context ready"
        );

        Ok(SlaveContext {
            node_id,
            config,
            jobs,
            transformations,
            relay,
            sockets,
            ports,
            cluster,
            router,
            clock,
            reporter,
            monitor: Mutex::new(monitor),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Point-in-time view of the node, served by the status handler
#[derive(Debug, Clone, Serialize)]
pub struct SlaveStatus {
    pub server_name: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub jobs: Vec<ExecutionKey>,
    pub transformations: Vec<ExecutionKey>,
    pub sockets: Vec<SocketLeaseInfo>,
    pub cluster_members: usize,
    pub active_members: usize,
}

/// Builds [`SlaveStatus`] snapshots from the shared components
pub struct StatusReporter {
    server_name: String,
    started_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    jobs: Arc<ExecutionRegistry>,
    transformations: Arc<ExecutionRegistry>,
    sockets: Arc<SocketAllocator>,
    cluster: Arc<ClusterRegistry>,
}

impl StatusReporter {
    pub fn snapshot(&self) -> SlaveStatus {
        SlaveStatus {
            server_name: self.server_name.clone(),
            started_at: self.started_at,
            uptime_seconds: (self.clock.now() - self.started_at).num_seconds(),
            jobs: self.jobs.list(),
            transformations: self.transformations.list(),
            sockets: self.sockets.leases(),
            cluster_members: self.cluster.len(),
            active_members: self.cluster.active_members().len(),
        }
    }
}
