//! Launch configuration stored alongside every tracked unit.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logging verbosity requested for a unit run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Nothing,
    Error,
    Minimal,
    #[default]
    Basic,
    Detailed,
    Debug,
    Rowlevel,
}

/// The unit's own definition, opaque to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDefinition {
    pub name: String,
    /// Where the definition was loaded from (file, repository path), if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub document: serde_json::Value,
}

impl UnitDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            document: serde_json::Value::Null,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_document(mut self, document: serde_json::Value) -> Self {
        self.document = document;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionParameters {
    pub variables: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
    pub arguments: Vec<String>,
    pub log_level: LogLevel,
    pub clustered: bool,
    /// Shared by every slave taking part in the same clustered run
    pub clustered_run_id: Option<String>,
    pub safe_mode: bool,
    pub gathering_metrics: bool,
}

impl ExecutionParameters {
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn clustered(mut self, run_id: impl Into<String>) -> Self {
        self.clustered = true;
        self.clustered_run_id = Some(run_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfiguration {
    pub definition: UnitDefinition,
    #[serde(default)]
    pub parameters: ExecutionParameters,
}

impl LaunchConfiguration {
    pub fn new(definition: UnitDefinition, parameters: ExecutionParameters) -> Self {
        Self {
            definition,
            parameters,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
