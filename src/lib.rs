#![allow(clippy::doc_markdown)] // Allow technical terms like TIME_WAIT in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Slave Core
//!
//! Control plane of a slave node in a distributed data-integration cluster.
//!
//! ## Overview
//!
//! A slave runs jobs and transformations on behalf of a master. The engine
//! that actually executes them lives elsewhere; this crate keeps track of
//! what is running and coordinates the shared resources around it:
//!
//! - Units in flight, addressable by name and generated id, including every
//!   sub-unit they spawn
//! - Listening sockets leased to clustered data channels, kept bound between
//!   leases and rebound patiently while the OS releases a port
//! - Port numbers handed out per clustered run
//! - Cluster peers and their last observed liveness
//! - Routing of control requests to built-in and plugin handlers
//!
//! ## Module Organization
//!
//! - [`registry`] - Execution registries and the delegation relay
//! - [`execution`] - The engine-facing unit trait and launch configuration
//! - [`sockets`] - Socket leases and port allocation
//! - [`cluster`] - Peer registry and liveness monitor
//! - [`dispatch`] - Request router and built-in control handlers
//! - [`context`] - [`SlaveContext`], the node's shared state
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slave_core::config::SlaveConfig;
//! use slave_core::context::SlaveContext;
//! use slave_core::dispatch::DispatchRequest;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! slave_core::logging::init_structured_logging();
//!
//! let context = SlaveContext::new(SlaveConfig::from_env()?)?;
//! let outcome = context.router.dispatch(&DispatchRequest::new("/kettle/status"))?;
//! println!("{outcome:?}");
//!
//! context.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Unit tests live beside the code; integration tests under `tests/` use
//! the fakes in `tests/common` for units, timers, binders and probes.

pub mod clock;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod identity;
pub mod logging;
pub mod registry;
pub mod sockets;

pub use config::SlaveConfig;
pub use context::{SlaveContext, SlaveStatus};
pub use error::{Result, SlaveError};
pub use identity::ExecutionKey;
