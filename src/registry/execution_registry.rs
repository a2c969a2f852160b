//! # Execution Registry
//!
//! In-memory map from [`ExecutionKey`] to a running unit and the
//! configuration it was launched with. One instance tracks jobs, another
//! tracks transformations.
//!
//! ## Concurrency
//!
//! All state sits behind one `parking_lot::Mutex` per registry, so every
//! operation (including compound reads such as "first key for a name") is
//! atomic with respect to the others on the same registry. Engine callbacks
//! (`assign_execution_id`, `stop`) run after the lock is released.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use slave_core::execution::{LaunchConfiguration, UnitKind};
//! use slave_core::registry::ExecutionRegistry;
//!
//! let registry = ExecutionRegistry::new(UnitKind::Transformation);
//! let key = registry.register(unit, configuration);
//! assert!(registry.get(&key).is_some());
//! registry.remove(&key);
//! ```

use crate::execution::{LaunchConfiguration, StopMode, UnitHandle, UnitKind};
use crate::identity::{ExecutionKey, IdSource, UuidIdSource};
use crate::logging::log_registry_operation;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A tracked unit and what it was started with
#[derive(Clone)]
pub struct RegistryEntry {
    pub unit: UnitHandle,
    pub configuration: LaunchConfiguration,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("unit", &self.unit.name())
            .field("configuration", &self.configuration)
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    /// Ordered by (name, id); the first key of a name is its "first match"
    entries: BTreeMap<ExecutionKey, RegistryEntry>,
    /// id -> stored key, the identity index
    ids: HashMap<String, ExecutionKey>,
}

impl RegistryState {
    fn insert(&mut self, key: ExecutionKey, entry: RegistryEntry) -> Option<RegistryEntry> {
        let previous = self.remove_id(key.id());
        self.ids.insert(key.id().to_string(), key.clone());
        self.entries.insert(key, entry);
        previous
    }

    fn remove_id(&mut self, id: &str) -> Option<RegistryEntry> {
        let stored = self.ids.remove(id)?;
        self.entries.remove(&stored)
    }

    fn stored_key(&self, id: &str) -> Option<&ExecutionKey> {
        self.ids.get(id)
    }

    fn entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.stored_key(id).and_then(|key| self.entries.get(key))
    }

    fn first_for_name(&self, name: &str) -> Option<(&ExecutionKey, &RegistryEntry)> {
        self.entries
            .range(ExecutionKey::new(name, "")..)
            .next()
            .filter(|(key, _)| key.name() == name)
    }
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub kind: UnitKind,
    pub total_units: usize,
    pub distinct_names: usize,
}

pub struct ExecutionRegistry {
    kind: UnitKind,
    state: Mutex<RegistryState>,
    id_source: Arc<dyn IdSource>,
}

impl ExecutionRegistry {
    pub fn new(kind: UnitKind) -> Self {
        Self::with_id_source(kind, Arc::new(UuidIdSource))
    }

    pub fn with_id_source(kind: UnitKind, id_source: Arc<dyn IdSource>) -> Self {
        Self {
            kind,
            state: Mutex::new(RegistryState::default()),
            id_source,
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Track a unit under a freshly generated id and return its key
    pub fn register(&self, unit: UnitHandle, configuration: LaunchConfiguration) -> ExecutionKey {
        let name = unit.name();
        let key = {
            let mut state = self.state.lock();
            let id = loop {
                let candidate = self.id_source.next_id();
                if state.stored_key(&candidate).is_none() {
                    break candidate;
                }
                warn!(kind = %self.kind, id = %candidate, "Generated id already tracked, drawing another");
            };
            let key = ExecutionKey::new(name, id);
            state.insert(
                key.clone(),
                RegistryEntry {
                    unit: unit.clone(),
                    configuration,
                },
            );
            key
        };

        if !unit.assign_execution_id(key.id()) {
            warn!(
                kind = %self.kind,
                name = key.name(),
                id = key.id(),
                "Unit already reports another id; registered under the new one"
            );
        }

        log_registry_operation(
            "register",
            &self.kind.to_string(),
            Some(key.name()),
            Some(key.id()),
            "registered",
        );
        key
    }

    /// Track a unit under a caller-supplied id, overwriting any entry with that id
    pub fn register_with_id(
        &self,
        name: &str,
        id: &str,
        unit: UnitHandle,
        configuration: LaunchConfiguration,
    ) -> ExecutionKey {
        let key = ExecutionKey::new(name, id);
        let previous = self.state.lock().insert(
            key.clone(),
            RegistryEntry {
                unit: unit.clone(),
                configuration,
            },
        );

        if !unit.assign_execution_id(id) && unit.execution_id().as_deref() != Some(id) {
            warn!(kind = %self.kind, name, id, "Unit already reports another id");
        }

        log_registry_operation(
            "register_with_id",
            &self.kind.to_string(),
            Some(name),
            Some(id),
            if previous.is_some() { "replaced" } else { "registered" },
        );
        key
    }

    /// Replace the whole entry of `key`; returns whether an entry existed
    pub fn replace(
        &self,
        key: &ExecutionKey,
        unit: UnitHandle,
        configuration: LaunchConfiguration,
    ) -> bool {
        let existed = self
            .state
            .lock()
            .insert(key.clone(), RegistryEntry { unit, configuration })
            .is_some();
        debug!(kind = %self.kind, key = %key, existed, "Replaced registry entry");
        existed
    }

    pub fn get(&self, key: &ExecutionKey) -> Option<UnitHandle> {
        self.state.lock().entry(key.id()).map(|entry| entry.unit.clone())
    }

    pub fn get_entry(&self, key: &ExecutionKey) -> Option<RegistryEntry> {
        self.state.lock().entry(key.id()).cloned()
    }

    pub fn get_configuration(&self, key: &ExecutionKey) -> Option<LaunchConfiguration> {
        self.state
            .lock()
            .entry(key.id())
            .map(|entry| entry.configuration.clone())
    }

    /// First unit carrying `name`, in key order
    pub fn get_by_name(&self, name: &str) -> Option<UnitHandle> {
        self.state
            .lock()
            .first_for_name(name)
            .map(|(_, entry)| entry.unit.clone())
    }

    pub fn find_first_key(&self, name: &str) -> Option<ExecutionKey> {
        self.state
            .lock()
            .first_for_name(name)
            .map(|(key, _)| key.clone())
    }

    pub fn find_by_id(&self, id: &str) -> Option<UnitHandle> {
        self.state.lock().entry(id).map(|entry| entry.unit.clone())
    }

    pub fn find_key_by_id(&self, id: &str) -> Option<ExecutionKey> {
        self.state.lock().stored_key(id).cloned()
    }

    /// Resolve a request that names a unit and optionally gives its id.
    /// Without an id the first unit of that name is chosen.
    pub fn resolve(&self, name: &str, id: Option<&str>) -> Option<(ExecutionKey, UnitHandle)> {
        let state = self.state.lock();
        match id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let key = state.stored_key(id)?;
                let entry = state.entries.get(key)?;
                Some((key.clone(), entry.unit.clone()))
            }
            None => state
                .first_for_name(name)
                .map(|(key, entry)| (key.clone(), entry.unit.clone())),
        }
    }

    /// Forget a unit. Removing an unknown key is a no-op.
    pub fn remove(&self, key: &ExecutionKey) -> Option<RegistryEntry> {
        let removed = self.state.lock().remove_id(key.id());
        if removed.is_some() {
            log_registry_operation(
                "remove",
                &self.kind.to_string(),
                Some(key.name()),
                Some(key.id()),
                "removed",
            );
        } else {
            debug!(kind = %self.kind, key = %key, "Remove of untracked key ignored");
        }
        removed
    }

    /// Forward a stop to the unit; `false` when the key is not tracked
    pub fn stop(&self, key: &ExecutionKey, mode: StopMode) -> bool {
        match self.get(key) {
            Some(unit) => {
                unit.stop(mode);
                debug!(kind = %self.kind, key = %key, ?mode, "Stop forwarded to unit");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the tracked keys, ordered by name then id.
    ///
    /// Keys compare equal by id alone while they sort by (name, id), so
    /// membership checks should go through [`Self::find_key_by_id`] rather
    /// than an ordered-set lookup.
    pub fn list(&self) -> Vec<ExecutionKey> {
        self.state.lock().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        let distinct_names = state
            .entries
            .keys()
            .map(ExecutionKey::name)
            .collect::<BTreeSet<_>>()
            .len();
        RegistryStats {
            kind: self.kind,
            total_units: state.entries.len(),
            distinct_names,
        }
    }
}

impl fmt::Debug for ExecutionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRegistry")
            .field("kind", &self.kind)
            .field("units", &self.len())
            .finish()
    }
}
