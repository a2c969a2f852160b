//! # Cluster Membership
//!
//! Peers that registered with this node, plus an optional background
//! monitor that keeps their liveness current.

pub mod descriptor;
pub mod monitor;
pub mod registry;

pub use descriptor::{PeerDescriptor, PeerDetection, PeerRole};
pub use monitor::{ClusterMonitor, TcpPeerProbe};
pub use registry::{ClusterRegistry, PeerProbe, UpsertOutcome};
