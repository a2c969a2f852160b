//! # Execution Registries
//!
//! Tracking of running units and the relay that keeps tracking them as
//! they fan out.
//!
//! ```text
//! Registry Infrastructure
//! ├── ExecutionRegistry   (key -> unit + launch configuration, one per kind)
//! └── DelegationRelay     (auto-registers sub-units, shared by both registries)
//! ```

pub mod delegation;
pub mod execution_registry;

pub use delegation::{DelegationRelay, RelaySubscription};
pub use execution_registry::{ExecutionRegistry, RegistryEntry, RegistryStats};
