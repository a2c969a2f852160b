//! # Socket Allocator
//!
//! Exclusive leases on reusable listening sockets, keyed by port.
//!
//! Clustered step-to-step channels open and close ports quickly, and the
//! operating system keeps a recently closed port in TIME_WAIT for a while.
//! Binding therefore retries on "address in use" for a bounded time instead
//! of failing the run, and a socket that did get bound is never closed
//! between leases.
//!
//! The registry lock is only held to inspect or update the lease table; the
//! retry loop runs without it.

use crate::clock::{RetryTimer, SystemTimer};
use crate::constants;
use crate::error::{Result, SlaveError};
use crate::logging::log_socket_operation;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A listening socket owned by the allocator
pub struct ServerSocket {
    port: u16,
    listener: Mutex<Option<TcpListener>>,
}

impl ServerSocket {
    pub fn new(port: u16, listener: TcpListener) -> Self {
        Self {
            port,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// The port this socket was leased under
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self.listener.lock().as_ref() {
            Some(listener) => listener.local_addr(),
            None => Err(closed_error()),
        }
    }

    /// An independent handle to accept on without holding our lock
    pub fn try_clone_listener(&self) -> io::Result<TcpListener> {
        match self.listener.lock().as_ref() {
            Some(listener) => listener.try_clone(),
            None => Err(closed_error()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.listener.lock().is_none()
    }

    /// Close the socket; returns `false` when it was already closed
    pub fn close(&self) -> bool {
        self.listener.lock().take().is_some()
    }
}

impl fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSocket")
            .field("port", &self.port)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "server socket is closed")
}

/// Binds a listening socket for a port
pub trait SocketBinder: Send + Sync {
    fn bind(&self, port: u16) -> io::Result<TcpListener>;
}

#[derive(Debug, Clone, Copy)]
pub struct TcpBinder {
    host: IpAddr,
}

impl TcpBinder {
    pub fn new(host: IpAddr) -> Self {
        Self { host }
    }
}

impl Default for TcpBinder {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl SocketBinder for TcpBinder {
    fn bind(&self, port: u16) -> io::Result<TcpListener> {
        TcpListener::bind((self.host, port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRetryPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for BindRetryPolicy {
    fn default() -> Self {
        Self {
            interval: constants::sockets::BIND_RETRY_INTERVAL,
            ceiling: constants::sockets::BIND_RETRY_CEILING,
        }
    }
}

/// Best-effort cancellation of a pending bind, honoured before the next attempt
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a successful acquire
#[derive(Debug, Clone)]
pub struct AcquiredSocket {
    pub socket: Arc<ServerSocket>,
    /// Time spent waiting for the port to become bindable
    pub waited: Duration,
    /// The socket was already bound by an earlier lease
    pub reused: bool,
}

/// Snapshot of one lease entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketLeaseInfo {
    pub port: u16,
    pub in_use: bool,
    pub holder: Option<String>,
    pub bound: bool,
}

struct SocketEntry {
    /// `None` while the first bind for this port is in progress
    socket: Option<Arc<ServerSocket>>,
    in_use: bool,
    holder: String,
}

impl SocketEntry {
    fn live_socket(&self) -> Option<&Arc<ServerSocket>> {
        self.socket.as_ref().filter(|socket| !socket.is_closed())
    }
}

pub struct SocketAllocator {
    entries: Mutex<HashMap<u16, SocketEntry>>,
    binder: Arc<dyn SocketBinder>,
    timer: Arc<dyn RetryTimer>,
    policy: BindRetryPolicy,
}

impl SocketAllocator {
    pub fn new() -> Self {
        Self::with_binder(
            Arc::new(TcpBinder::default()),
            Arc::new(SystemTimer),
            BindRetryPolicy::default(),
        )
    }

    pub fn with_binder(
        binder: Arc<dyn SocketBinder>,
        timer: Arc<dyn RetryTimer>,
        policy: BindRetryPolicy,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            binder,
            timer,
            policy,
        }
    }

    pub fn policy(&self) -> BindRetryPolicy {
        self.policy
    }

    /// Lease the socket for `port`, binding it first if needed
    pub fn acquire(&self, port: u16, holder: &str) -> Result<AcquiredSocket> {
        self.acquire_cancellable(port, holder, &CancelToken::new())
    }

    pub fn acquire_cancellable(
        &self,
        port: u16,
        holder: &str,
        cancel: &CancelToken,
    ) -> Result<AcquiredSocket> {
        {
            let mut entries = self.entries.lock();
            match entries.get_mut(&port) {
                Some(entry) if entry.in_use => {
                    log_socket_operation("acquire", port, Some(holder), "contention");
                    return Err(SlaveError::PortInUse {
                        port,
                        holder: entry.holder.clone(),
                    });
                }
                Some(entry) => {
                    entry.in_use = true;
                    entry.holder = holder.to_string();
                    if let Some(socket) = entry.live_socket() {
                        log_socket_operation("acquire", port, Some(holder), "reused");
                        return Ok(AcquiredSocket {
                            socket: socket.clone(),
                            waited: Duration::ZERO,
                            reused: true,
                        });
                    }
                    debug!(port, "Leased socket was closed externally, rebinding");
                }
                None => {
                    entries.insert(
                        port,
                        SocketEntry {
                            socket: None,
                            in_use: true,
                            holder: holder.to_string(),
                        },
                    );
                }
            }
        }

        match self.bind_with_retry(port, cancel) {
            Ok((listener, waited)) => self.install(port, holder, listener, waited),
            Err(err) => {
                let mut entries = self.entries.lock();
                if entries.get(&port).is_some_and(|entry| entry.live_socket().is_none()) {
                    entries.remove(&port);
                }
                log_socket_operation("acquire", port, Some(holder), "bind_failed");
                Err(err)
            }
        }
    }

    fn install(
        &self,
        port: u16,
        holder: &str,
        listener: TcpListener,
        waited: Duration,
    ) -> Result<AcquiredSocket> {
        let socket = Arc::new(ServerSocket::new(port, listener));
        let mut entries = self.entries.lock();
        match entries.get_mut(&port) {
            Some(entry) => {
                entry.socket = Some(socket.clone());
                entry.in_use = true;
                entry.holder = holder.to_string();
            }
            None => {
                // close_all ran while we were binding
                socket.close();
                return Err(SlaveError::BindCancelled { port, waited });
            }
        }
        drop(entries);

        log_socket_operation("acquire", port, Some(holder), "bound");
        Ok(AcquiredSocket {
            socket,
            waited,
            reused: false,
        })
    }

    fn bind_with_retry(&self, port: u16, cancel: &CancelToken) -> Result<(TcpListener, Duration)> {
        let start = self.timer.now();
        let mut attempt: u32 = 1;

        loop {
            let err = match self.binder.bind(port) {
                Ok(listener) => {
                    let waited = self.timer.now().duration_since(start);
                    if attempt > 1 {
                        info!(port, attempt, waited_secs = waited.as_secs(), "✅ Port bound after waiting");
                    }
                    return Ok((listener, waited));
                }
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => err,
                Err(err) => return Err(SlaveError::BindFailed { port, source: err }),
            };

            let waited = self.timer.now().duration_since(start);
            if waited >= self.policy.ceiling {
                warn!(port, attempt, waited_secs = waited.as_secs(), "Giving up on binding port");
                return Err(SlaveError::BindTimeout {
                    port,
                    waited,
                    source: err,
                });
            }
            if cancel.is_cancelled() {
                return Err(SlaveError::BindCancelled { port, waited });
            }

            warn!(
                port,
                attempt,
                waited_secs = waited.as_secs(),
                retry_in_secs = self.policy.interval.as_secs(),
                "Port still in use, waiting before the next bind attempt"
            );
            self.timer.sleep(self.policy.interval);
            attempt += 1;

            if cancel.is_cancelled() {
                let waited = self.timer.now().duration_since(start);
                return Err(SlaveError::BindCancelled { port, waited });
            }
        }
    }

    /// End a lease. The socket stays bound for the next one.
    pub fn release(&self, port: u16) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&port)
            .filter(|entry| entry.socket.is_some())
            .ok_or(SlaveError::PortNotAllocated { port })?;

        let holder = std::mem::take(&mut entry.holder);
        entry.in_use = false;
        drop(entries);

        log_socket_operation("release", port, Some(&holder), "released");
        Ok(())
    }

    /// Close every socket and forget every lease. Safe to call repeatedly.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(u16, SocketEntry)> = self.entries.lock().drain().collect();

        let mut closed = 0;
        for (port, entry) in drained {
            match entry.socket {
                Some(socket) if socket.close() => {
                    closed += 1;
                    debug!(port, "Closed server socket");
                }
                Some(_) => debug!(port, "Server socket was already closed"),
                None => debug!(port, "Socket still binding at shutdown"),
            }
        }

        if closed > 0 {
            info!(closed, "Closed all server sockets");
        }
        closed
    }

    pub fn is_in_use(&self, port: u16) -> bool {
        self.entries
            .lock()
            .get(&port)
            .is_some_and(|entry| entry.in_use)
    }

    pub fn leases(&self) -> Vec<SocketLeaseInfo> {
        let entries = self.entries.lock();
        let mut leases: Vec<SocketLeaseInfo> = entries
            .iter()
            .map(|(port, entry)| SocketLeaseInfo {
                port: *port,
                in_use: entry.in_use,
                holder: Some(entry.holder.clone()).filter(|holder| !holder.is_empty()),
                bound: entry.live_socket().is_some(),
            })
            .collect();
        leases.sort_by_key(|lease| lease.port);
        leases
    }
}

impl Default for SocketAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SocketAllocator {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds an ephemeral loopback port whatever port is asked for
    struct LoopbackBinder;

    impl SocketBinder for LoopbackBinder {
        fn bind(&self, _port: u16) -> io::Result<TcpListener> {
            TcpListener::bind(("127.0.0.1", 0))
        }
    }

    struct RefusingBinder;

    impl SocketBinder for RefusingBinder {
        fn bind(&self, _port: u16) -> io::Result<TcpListener> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "privileged port"))
        }
    }

    fn allocator(binder: Arc<dyn SocketBinder>) -> SocketAllocator {
        SocketAllocator::with_binder(binder, Arc::new(SystemTimer), BindRetryPolicy::default())
    }

    #[test]
    fn test_release_then_acquire_reuses_socket() {
        let allocator = allocator(Arc::new(LoopbackBinder));

        let first = allocator.acquire(41000, "trans-a").unwrap();
        assert!(!first.reused);
        allocator.release(41000).unwrap();

        let second = allocator.acquire(41000, "trans-b").unwrap();
        assert!(second.reused);
        assert!(Arc::ptr_eq(&first.socket, &second.socket));
    }

    #[test]
    fn test_in_use_port_names_holder() {
        let allocator = allocator(Arc::new(LoopbackBinder));
        allocator.acquire(41001, "trans-a").unwrap();

        match allocator.acquire(41001, "trans-b") {
            Err(SlaveError::PortInUse { port, holder }) => {
                assert_eq!(port, 41001);
                assert_eq!(holder, "trans-a");
            }
            other => panic!("Expected PortInUse, got {other:?}"),
        }
    }

    #[test]
    fn test_release_unknown_port_fails() {
        let allocator = allocator(Arc::new(LoopbackBinder));
        assert!(matches!(
            allocator.release(41002),
            Err(SlaveError::PortNotAllocated { port: 41002 })
        ));
    }

    #[test]
    fn test_closed_socket_is_rebound() {
        let allocator = allocator(Arc::new(LoopbackBinder));
        let first = allocator.acquire(41003, "a").unwrap();
        allocator.release(41003).unwrap();
        first.socket.close();

        let second = allocator.acquire(41003, "b").unwrap();
        assert!(!second.reused);
        assert!(!Arc::ptr_eq(&first.socket, &second.socket));
        assert!(!second.socket.is_closed());
    }

    #[test]
    fn test_other_bind_errors_fail_immediately() {
        let allocator = allocator(Arc::new(RefusingBinder));
        let err = allocator.acquire(80, "a").unwrap_err();
        assert!(matches!(err, SlaveError::BindFailed { port: 80, .. }));
        assert!(!allocator.is_in_use(80));
        assert!(allocator.leases().is_empty());
    }

    #[test]
    fn test_close_all_is_idempotent() {
        let allocator = allocator(Arc::new(LoopbackBinder));
        let lease = allocator.acquire(41004, "a").unwrap();
        allocator.acquire(41005, "b").unwrap();

        assert_eq!(allocator.close_all(), 2);
        assert!(lease.socket.is_closed());
        assert_eq!(allocator.close_all(), 0);
        assert!(allocator.leases().is_empty());
    }

    #[test]
    fn test_leases_snapshot() {
        let allocator = allocator(Arc::new(LoopbackBinder));
        allocator.acquire(41007, "b").unwrap();
        allocator.acquire(41006, "a").unwrap();
        allocator.release(41006).unwrap();

        let leases = allocator.leases();
        assert_eq!(leases.len(), 2);
        assert_eq!(leases[0].port, 41006);
        assert!(!leases[0].in_use);
        assert_eq!(leases[0].holder, None);
        assert_eq!(leases[1].holder.as_deref(), Some("b"));
        assert!(leases[1].bound);
    }
}
