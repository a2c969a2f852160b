//! # Clustered Data-Transfer Sockets
//!
//! Slaves taking part in a clustered run stream rows to each other over
//! plain TCP. Two pieces of bookkeeping support that:
//!
//! - [`SocketAllocator`] owns the listening sockets and leases them out by
//!   port. A bound socket is kept and reused across leases; only shutdown
//!   closes it.
//! - [`PortAllocationTable`] decides which port number a given source/target
//!   step pair of a run gets on a host.

pub mod allocator;
pub mod ports;

pub use allocator::{
    AcquiredSocket, BindRetryPolicy, CancelToken, ServerSocket, SocketAllocator, SocketBinder,
    SocketLeaseInfo, TcpBinder,
};
pub use ports::{PortAllocation, PortAllocationRequest, PortAllocationTable};
