//! Request, response and handler types shared by the router and the
//! built-in handlers.

use crate::constants::web_result;
use crate::error::{Result, SlaveError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An inbound control request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchRequest {
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl DispatchRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn required_param(&self, name: &str) -> Result<&str> {
        self.param(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SlaveError::InvalidRequest(format!("missing parameter '{name}'")))
    }

    pub fn flag(&self, name: &str) -> bool {
        self.param(name)
            .is_some_and(|value| value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("y"))
    }

    pub fn required_body(&self) -> Result<&str> {
        self.body
            .as_deref()
            .filter(|body| !body.trim().is_empty())
            .ok_or_else(|| SlaveError::InvalidRequest("request body is empty".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl DispatchResponse {
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: serde_json::to_string(value)?,
        })
    }
}

/// Acknowledgement body used by the control handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebResult {
    pub result: String,
    pub message: String,
    pub id: Option<String>,
}

impl WebResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            result: web_result::OK.to_string(),
            message: message.into(),
            id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: web_result::ERROR.to_string(),
            message: message.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.result == web_result::OK
    }
}

/// Outcome of a dispatch. An unknown path is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    NotFound { path: String },
    Handled(DispatchResponse),
}

impl DispatchOutcome {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchOutcome::NotFound { .. })
    }

    pub fn response(&self) -> Option<&DispatchResponse> {
        match self {
            DispatchOutcome::Handled(response) => Some(response),
            DispatchOutcome::NotFound { .. } => None,
        }
    }
}

/// A routable request handler
pub trait RequestHandler: Send + Sync {
    /// Declared path, possibly carrying the root prefix
    fn path(&self) -> &str;

    fn name(&self) -> &str;

    fn handle(&self, request: &DispatchRequest) -> anyhow::Result<DispatchResponse>;
}

pub type HandlerHandle = Arc<dyn RequestHandler>;

/// Where a route came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOrigin {
    /// Registered by the node itself; plugins cannot displace it
    Static,
    Dynamic,
}

impl fmt::Display for RouteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteOrigin::Static => write!(f, "static"),
            RouteOrigin::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Plugin lifecycle notifications from an external loader
#[derive(Clone)]
pub enum PluginEvent {
    Discovered(HandlerHandle),
    Withdrawn(HandlerHandle),
    Changed(HandlerHandle),
}

impl fmt::Debug for PluginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (event, handler) = match self {
            PluginEvent::Discovered(handler) => ("Discovered", handler),
            PluginEvent::Withdrawn(handler) => ("Withdrawn", handler),
            PluginEvent::Changed(handler) => ("Changed", handler),
        };
        f.debug_tuple(event).field(&handler.path()).finish()
    }
}

/// Supplies the handlers present at startup
pub trait HandlerSource {
    fn handlers(&self) -> Vec<HandlerHandle>;
}

impl HandlerSource for Vec<HandlerHandle> {
    fn handlers(&self) -> Vec<HandlerHandle> {
        self.clone()
    }
}

/// One row of the routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub path: String,
    pub handler: String,
    pub origin: RouteOrigin,
}
