//! Test doubles for the engine, the OS socket layer, time and the network.

#![allow(dead_code)]

use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use slave_core::clock::RetryTimer;
use slave_core::cluster::{PeerDescriptor, PeerProbe};
use slave_core::execution::{
    DelegationEvent, DelegationListener, ExecutionParameters, ExecutionUnit, StopMode, SubUnit,
    UnitDefinition,
};
use slave_core::sockets::SocketBinder;
use slave_core::{ExecutionKey, Result};
use std::collections::HashSet;
use std::io;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Engine-side unit that records what the registries do to it
#[derive(Default)]
pub struct FakeUnit {
    name: String,
    id: OnceLock<String>,
    listeners: Mutex<Vec<Arc<dyn DelegationListener>>>,
    stops: Mutex<Vec<StopMode>>,
}

impl FakeUnit {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn stops(&self) -> Vec<StopMode> {
        self.stops.lock().clone()
    }

    /// Announce a sub-job to every listener, the way the engine does on start
    pub fn start_sub_job(&self, child: Arc<FakeUnit>) -> Vec<Result<ExecutionKey>> {
        let event = DelegationEvent::JobStarted(sub_unit(child));
        self.notify(event)
    }

    pub fn start_sub_transformation(&self, child: Arc<FakeUnit>) -> Vec<Result<ExecutionKey>> {
        let event = DelegationEvent::TransformationStarted(sub_unit(child));
        self.notify(event)
    }

    pub fn notify(&self, event: DelegationEvent) -> Vec<Result<ExecutionKey>> {
        let listeners = self.listeners.lock().clone();
        listeners
            .iter()
            .map(|listener| listener.sub_unit_started(&self.name, event.clone()))
            .collect()
    }
}

fn sub_unit(child: Arc<FakeUnit>) -> SubUnit {
    let definition = UnitDefinition::new(child.name.clone());
    SubUnit {
        unit: child,
        definition: Some(definition),
        parameters: ExecutionParameters::default().with_variable("Internal.Parent", "yes"),
    }
}

impl ExecutionUnit for FakeUnit {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn assign_execution_id(&self, id: &str) -> bool {
        self.id.set(id.to_string()).is_ok()
    }

    fn execution_id(&self) -> Option<String> {
        self.id.get().cloned()
    }

    fn stop(&self, mode: StopMode) {
        self.stops.lock().push(mode);
    }

    fn add_delegation_listener(&self, listener: Arc<dyn DelegationListener>) {
        self.listeners.lock().push(listener);
    }
}

/// Monotonic time that only moves when slept on
pub struct FakeTimer {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: AtomicUsize,
}

impl FakeTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: AtomicUsize::new(0),
        })
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl RetryTimer for FakeTimer {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reports "address in use" until the fake clock passes `busy_for`,
/// then binds an ephemeral loopback port
pub struct FlakyBinder {
    timer: Arc<FakeTimer>,
    busy_for: Option<Duration>,
    attempts: AtomicUsize,
}

impl FlakyBinder {
    pub fn busy_for(timer: Arc<FakeTimer>, busy_for: Duration) -> Arc<Self> {
        Arc::new(Self {
            timer,
            busy_for: Some(busy_for),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn always_busy(timer: Arc<FakeTimer>) -> Arc<Self> {
        Arc::new(Self {
            timer,
            busy_for: None,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SocketBinder for FlakyBinder {
    fn bind(&self, port: u16) -> io::Result<TcpListener> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.busy_for {
            Some(busy_for) if self.timer.elapsed() >= busy_for => TcpListener::bind(("127.0.0.1", 0)),
            _ => Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("port {port} in TIME_WAIT"),
            )),
        }
    }
}

/// Binds an ephemeral loopback port whatever port is asked for
pub struct LoopbackBinder;

impl SocketBinder for LoopbackBinder {
    fn bind(&self, _port: u16) -> io::Result<TcpListener> {
        TcpListener::bind(("127.0.0.1", 0))
    }
}

/// Blocks binds of one port until the test opens the gate; other ports bind at once
pub struct GatedBinder {
    gated_port: u16,
    entered: Sender<()>,
    gate: Receiver<()>,
}

impl GatedBinder {
    /// Returns the binder, a receiver signalled when the gated bind starts,
    /// and the sender that lets it finish
    pub fn new(gated_port: u16) -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered, entered_rx) = crossbeam::channel::unbounded();
        let (gate_tx, gate) = crossbeam::channel::unbounded();
        let binder = Arc::new(Self {
            gated_port,
            entered,
            gate,
        });
        (binder, entered_rx, gate_tx)
    }
}

impl SocketBinder for GatedBinder {
    fn bind(&self, port: u16) -> io::Result<TcpListener> {
        if port == self.gated_port {
            let _ = self.entered.send(());
            let _ = self.gate.recv();
        }
        TcpListener::bind(("127.0.0.1", 0))
    }
}

/// Answers probes from a fixed set of reachable peer names
#[derive(Default)]
pub struct ScriptedProbe {
    reachable: Mutex<HashSet<String>>,
    probes: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reachable(&self, name: &str, reachable: bool) {
        let mut set = self.reachable.lock();
        if reachable {
            set.insert(name.to_lowercase());
        } else {
            set.remove(&name.to_lowercase());
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl PeerProbe for ScriptedProbe {
    fn probe(&self, peer: &PeerDescriptor) -> anyhow::Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.reachable.lock().contains(&peer.name.to_lowercase()) {
            Ok(())
        } else {
            anyhow::bail!("{} is not answering", peer.server_and_port())
        }
    }
}

pub fn launch(name: &str) -> slave_core::execution::LaunchConfiguration {
    slave_core::execution::LaunchConfiguration::new(
        UnitDefinition::new(name),
        ExecutionParameters::default(),
    )
}
