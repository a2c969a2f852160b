//! # Delegation Relay
//!
//! One listener shared by the whole spawn tree. It is subscribed to every
//! tracked unit; when a unit starts a sub-job or a sub-transformation the
//! relay registers the sub-unit in the matching registry and subscribes
//! itself to it, so the chain continues however deep the fan-out goes.
//!
//! Units only ever hold a [`RelaySubscription`], which refers back to the
//! relay weakly. The registries own the units, so a strong handle there
//! would keep the registries alive after their owner is gone.

use crate::error::{Result, SlaveError};
use crate::execution::{
    DelegationEvent, DelegationListener, LaunchConfiguration, UnitHandle, UnitKind,
};
use crate::identity::ExecutionKey;
use crate::logging::log_error;
use crate::registry::ExecutionRegistry;
use std::sync::{Arc, Weak};
use tracing::info;

pub struct DelegationRelay {
    jobs: Arc<ExecutionRegistry>,
    transformations: Arc<ExecutionRegistry>,
    /// Handle to ourselves, wrapped into every subscription we hand out
    this: Weak<DelegationRelay>,
}

/// Listener handed to tracked units; forwards to the relay while it lives
pub struct RelaySubscription {
    relay: Weak<DelegationRelay>,
}

impl DelegationListener for RelaySubscription {
    fn sub_unit_started(&self, parent: &str, event: DelegationEvent) -> Result<ExecutionKey> {
        match self.relay.upgrade() {
            Some(relay) => relay.sub_unit_started(parent, event),
            None => Err(SlaveError::DelegationFailed {
                parent: parent.to_string(),
                unit: event.sub_unit().unit.name(),
                reason: "delegation relay has shut down".to_string(),
            }),
        }
    }
}

impl DelegationRelay {
    pub fn new(
        jobs: Arc<ExecutionRegistry>,
        transformations: Arc<ExecutionRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            jobs,
            transformations,
            this: this.clone(),
        })
    }

    pub fn registry(&self, kind: UnitKind) -> &Arc<ExecutionRegistry> {
        match kind {
            UnitKind::Job => &self.jobs,
            UnitKind::Transformation => &self.transformations,
        }
    }

    /// Subscribe the relay to a unit's sub-unit notifications
    pub fn attach(&self, unit: &UnitHandle) {
        unit.add_delegation_listener(Arc::new(RelaySubscription {
            relay: self.this.clone(),
        }));
    }

    /// Register a top-level unit and start relaying its sub-units
    pub fn track(
        &self,
        kind: UnitKind,
        unit: UnitHandle,
        configuration: LaunchConfiguration,
    ) -> ExecutionKey {
        let key = self.registry(kind).register(unit.clone(), configuration);
        self.attach(&unit);
        key
    }
}

impl DelegationListener for DelegationRelay {
    fn sub_unit_started(&self, parent: &str, event: DelegationEvent) -> Result<ExecutionKey> {
        let kind = event.kind();
        let sub = event.sub_unit();

        let Some(definition) = sub.definition.clone() else {
            let err = SlaveError::DelegationFailed {
                parent: parent.to_string(),
                unit: sub.unit.name(),
                reason: format!("no {kind} definition handed over"),
            };
            log_error("DelegationRelay", "sub_unit_started", &err.to_string(), None);
            return Err(err);
        };

        let configuration = LaunchConfiguration::new(definition, sub.parameters.clone());
        let key = self.registry(kind).register(sub.unit.clone(), configuration);
        self.attach(&sub.unit);

        info!(
            parent = parent,
            kind = %kind,
            name = key.name(),
            id = key.id(),
            "Delegated sub-unit registered"
        );
        Ok(key)
    }
}
