//! Running-unit handles and the delegation callback.

use crate::error::Result;
use crate::execution::configuration::{ExecutionParameters, UnitDefinition};
use crate::identity::ExecutionKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Job,
    Transformation,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Job => write!(f, "job"),
            UnitKind::Transformation => write!(f, "transformation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// Stop every step of the unit
    Full,
    /// Stop only the input steps and let the rest drain
    InputOnly,
}

/// A running job or transformation owned by the engine.
///
/// The registries store and hand back these handles; they never create or
/// destroy them.
pub trait ExecutionUnit: Send + Sync {
    fn name(&self) -> String;

    /// Record the id this unit reports under. Returns `false` when an id was
    /// already assigned; the first assignment wins.
    fn assign_execution_id(&self, id: &str) -> bool;

    fn execution_id(&self) -> Option<String>;

    fn stop(&self, mode: StopMode);

    /// Subscribe a listener to sub-unit notifications of this unit
    fn add_delegation_listener(&self, listener: Arc<dyn DelegationListener>);
}

pub type UnitHandle = Arc<dyn ExecutionUnit>;

/// A sub-unit just started by a tracked unit
#[derive(Clone)]
pub struct SubUnit {
    pub unit: UnitHandle,
    /// `None` when the engine could not hand over the definition
    pub definition: Option<UnitDefinition>,
    pub parameters: ExecutionParameters,
}

impl fmt::Debug for SubUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubUnit")
            .field("unit", &self.unit.name())
            .field("definition", &self.definition)
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum DelegationEvent {
    JobStarted(SubUnit),
    TransformationStarted(SubUnit),
}

impl DelegationEvent {
    pub fn kind(&self) -> UnitKind {
        match self {
            DelegationEvent::JobStarted(_) => UnitKind::Job,
            DelegationEvent::TransformationStarted(_) => UnitKind::Transformation,
        }
    }

    pub fn sub_unit(&self) -> &SubUnit {
        match self {
            DelegationEvent::JobStarted(sub) | DelegationEvent::TransformationStarted(sub) => sub,
        }
    }
}

/// Fired by the engine on the parent's thread whenever a unit spawns a sub-unit
pub trait DelegationListener: Send + Sync {
    fn sub_unit_started(&self, parent: &str, event: DelegationEvent) -> Result<ExecutionKey>;
}
