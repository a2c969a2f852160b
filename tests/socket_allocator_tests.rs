//! Socket Allocator Integration Tests
//!
//! Lease reuse, contention and the bind retry loop driven by a fake timer.

mod common;

use common::*;
use slave_core::sockets::{BindRetryPolicy, CancelToken, SocketAllocator};
use slave_core::SlaveError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn allocator_with(binder: Arc<FlakyBinder>, timer: Arc<FakeTimer>) -> SocketAllocator {
    SocketAllocator::with_binder(binder, timer, BindRetryPolicy::default())
}

#[test]
fn released_port_hands_back_same_socket() {
    let timer = FakeTimer::new();
    let allocator =
        SocketAllocator::with_binder(Arc::new(LoopbackBinder), timer, BindRetryPolicy::default());

    let first = allocator.acquire(40100, "trans-a").unwrap();
    allocator.release(40100).unwrap();
    let second = allocator.acquire(40100, "trans-b").unwrap();

    assert!(Arc::ptr_eq(&first.socket, &second.socket));
    assert!(second.reused);
    assert_eq!(second.waited, Duration::ZERO);
}

#[test]
fn contention_names_current_holder() {
    let allocator = SocketAllocator::with_binder(
        Arc::new(LoopbackBinder),
        FakeTimer::new(),
        BindRetryPolicy::default(),
    );
    allocator.acquire(40101, "trans-a (1234)").unwrap();

    let err = allocator.acquire(40101, "trans-b").unwrap_err();
    assert!(err.is_contention());
    assert!(err.to_string().contains("trans-a (1234)"));
}

#[test]
fn bind_succeeds_after_port_frees_up() {
    let timer = FakeTimer::new();
    let binder = FlakyBinder::busy_for(timer.clone(), Duration::from_secs(30));
    let allocator = allocator_with(binder.clone(), timer.clone());

    let lease = allocator.acquire(40102, "trans-a").unwrap();

    assert!(!lease.reused);
    assert!(lease.waited >= Duration::from_secs(30));
    assert!(lease.waited < Duration::from_secs(300));
    // Immediate attempt plus one every 10 seconds
    assert_eq!(binder.attempts(), 4);
    assert_eq!(timer.sleeps(), 3);
}

#[test]
fn bind_gives_up_at_ceiling_with_last_error() {
    let timer = FakeTimer::new();
    let binder = FlakyBinder::always_busy(timer.clone());
    let allocator = allocator_with(binder.clone(), timer.clone());

    let err = allocator.acquire(40103, "trans-a").unwrap_err();

    match err {
        SlaveError::BindTimeout {
            port,
            waited,
            source,
        } => {
            assert_eq!(port, 40103);
            assert!(waited >= Duration::from_secs(300));
            assert!(waited < Duration::from_secs(310));
            assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
        }
        other => panic!("Expected BindTimeout, got {other:?}"),
    }
    assert_eq!(binder.attempts(), 31);

    // The failed reservation does not linger
    assert!(!allocator.is_in_use(40103));
    assert!(allocator.release(40103).is_err());
}

#[test]
fn configured_policy_shortens_the_wait() {
    let timer = FakeTimer::new();
    let binder = FlakyBinder::always_busy(timer.clone());
    let allocator = SocketAllocator::with_binder(
        binder.clone(),
        timer.clone(),
        BindRetryPolicy {
            interval: Duration::from_secs(1),
            ceiling: Duration::from_secs(5),
        },
    );

    assert!(matches!(
        allocator.acquire(40104, "trans-a"),
        Err(SlaveError::BindTimeout { .. })
    ));
    assert_eq!(binder.attempts(), 6);
    assert_eq!(timer.elapsed(), Duration::from_secs(5));
}

#[test]
fn cancelled_bind_stops_before_next_attempt() {
    let timer = FakeTimer::new();
    let binder = FlakyBinder::always_busy(timer.clone());
    let allocator = allocator_with(binder.clone(), timer);

    let token = CancelToken::new();
    token.cancel();

    let err = allocator
        .acquire_cancellable(40105, "trans-a", &token)
        .unwrap_err();
    assert!(matches!(err, SlaveError::BindCancelled { port: 40105, .. }));
    assert_eq!(binder.attempts(), 1);
    assert!(!allocator.is_in_use(40105));
}

#[test]
fn release_of_unknown_port_fails() {
    let allocator = SocketAllocator::with_binder(
        Arc::new(LoopbackBinder),
        FakeTimer::new(),
        BindRetryPolicy::default(),
    );
    assert!(matches!(
        allocator.release(40106),
        Err(SlaveError::PortNotAllocated { port: 40106 })
    ));
}

#[test]
fn racing_acquires_yield_one_winner() {
    let allocator = Arc::new(SocketAllocator::with_binder(
        Arc::new(LoopbackBinder),
        FakeTimer::new(),
        BindRetryPolicy::default(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let allocator = allocator.clone();
            thread::spawn(move || allocator.acquire(40107, &format!("trans-{i}")))
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let winners = results.iter().filter(|result| result.is_ok()).count();
    let contended = results
        .iter()
        .filter(|result| matches!(result, Err(err) if err.is_contention()))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(contended, 7);
}

#[test]
fn close_all_closes_and_forgets() {
    let allocator = SocketAllocator::with_binder(
        Arc::new(LoopbackBinder),
        FakeTimer::new(),
        BindRetryPolicy::default(),
    );
    let a = allocator.acquire(40108, "a").unwrap();
    let b = allocator.acquire(40109, "b").unwrap();
    allocator.release(40109).unwrap();

    assert_eq!(allocator.close_all(), 2);
    assert!(a.socket.is_closed());
    assert!(b.socket.is_closed());
    assert!(allocator.leases().is_empty());
    assert_eq!(allocator.close_all(), 0);
}

#[test]
fn pending_bind_does_not_block_other_operations() {
    let (binder, entered, gate) = GatedBinder::new(40120);
    let allocator = Arc::new(SocketAllocator::with_binder(
        binder,
        FakeTimer::new(),
        BindRetryPolicy::default(),
    ));

    let pending = {
        let allocator = allocator.clone();
        thread::spawn(move || allocator.acquire(40120, "trans-slow"))
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    // Run the other operations off-thread so a held lock fails the test instead of hanging it
    let (done_tx, done_rx) = crossbeam::channel::bounded(1);
    let others = {
        let allocator = allocator.clone();
        thread::spawn(move || {
            let other = allocator.acquire(40121, "trans-fast").is_ok();
            let released = allocator.release(40121).is_ok();
            let leases = allocator.leases();
            let contended = allocator
                .acquire(40120, "trans-late")
                .is_err_and(|err| err.is_contention());
            let _ = done_tx.send((other, released, leases, contended));
        })
    };

    let (other, released, leases, contended) =
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(other && released && contended);
    let pending_lease = leases.iter().find(|lease| lease.port == 40120).unwrap();
    assert!(pending_lease.in_use);
    assert!(!pending_lease.bound);
    others.join().unwrap();

    gate.send(()).unwrap();
    let lease = pending.join().unwrap().unwrap();
    assert!(!lease.reused);
    assert!(allocator.is_in_use(40120));
}

#[test]
fn leaseholder_accepts_on_cloned_listener() {
    let allocator = SocketAllocator::with_binder(
        Arc::new(LoopbackBinder),
        FakeTimer::new(),
        BindRetryPolicy::default(),
    );
    let lease = allocator.acquire(40122, "trans-a").unwrap();
    let listener = lease.socket.try_clone_listener().unwrap();
    let addr = lease.socket.local_addr().unwrap();

    let client = thread::spawn(move || std::net::TcpStream::connect(addr).is_ok());
    let (_stream, peer) = listener.accept().unwrap();

    assert!(client.join().unwrap());
    assert!(peer.ip().is_loopback());

    lease.socket.close();
    assert!(lease.socket.try_clone_listener().is_err());
}

#[test]
fn allocator_reports_its_retry_policy() {
    let policy = BindRetryPolicy {
        interval: Duration::from_secs(1),
        ceiling: Duration::from_secs(5),
    };
    let allocator = SocketAllocator::with_binder(Arc::new(LoopbackBinder), FakeTimer::new(), policy);

    assert_eq!(allocator.policy().interval, Duration::from_secs(1));
    assert_eq!(allocator.policy().ceiling, Duration::from_secs(5));
}
