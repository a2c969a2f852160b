//! # Execution Engine Interface
//!
//! The coordination core never runs a job or a transformation itself. It
//! talks to the engine through the traits in this module:
//!
//! - [`ExecutionUnit`]: a running job or transformation handle
//! - [`DelegationListener`]: callback the engine fires when a tracked unit
//!   spawns a sub-job or a sub-transformation
//! - [`LaunchConfiguration`]: what a unit was started with, kept next to the
//!   handle so it can be described or re-launched later

pub mod configuration;
pub mod unit;

pub use configuration::{ExecutionParameters, LaunchConfiguration, LogLevel, UnitDefinition};
pub use unit::{
    DelegationEvent, DelegationListener, ExecutionUnit, StopMode, SubUnit, UnitHandle, UnitKind,
};
