//! # Dispatch Router
//!
//! Maps request paths to handlers. Routes come from two places: the node's
//! own control handlers, registered as static routes, and plugin handlers
//! discovered at startup or announced later by a plugin loader. A static
//! route always wins over a dynamic one for the same path.
//!
//! Routing keys are the declared path with the configured root prefix
//! stripped and one trailing separator trimmed, so `/kettle/status/` and
//! `/status` address the same route.

use super::types::{
    DispatchOutcome, DispatchRequest, HandlerHandle, HandlerSource, PluginEvent, RouteInfo,
    RouteOrigin,
};
use crate::constants::PATH_SEPARATOR;
use crate::error::{Result, SlaveError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use tracing::{debug, info, warn};

struct RouteEntry {
    handler: HandlerHandle,
    origin: RouteOrigin,
}

pub struct DispatchRouter {
    root_prefix: String,
    table: DashMap<String, RouteEntry>,
}

impl DispatchRouter {
    pub fn new(root_prefix: impl Into<String>) -> Self {
        let root_prefix = root_prefix.into();
        Self {
            root_prefix: root_prefix.trim_end_matches(PATH_SEPARATOR).to_string(),
            table: DashMap::new(),
        }
    }

    pub fn root_prefix(&self) -> &str {
        &self.root_prefix
    }

    /// Normalize a declared or requested path into a routing key
    pub fn routing_key(&self, path: &str) -> String {
        let stripped = match path.strip_prefix(self.root_prefix.as_str()) {
            Some(rest)
                if !self.root_prefix.is_empty()
                    && (rest.is_empty() || rest.starts_with(PATH_SEPARATOR)) =>
            {
                rest
            }
            _ => path,
        };

        let mut key = String::with_capacity(stripped.len() + 1);
        if !stripped.starts_with(PATH_SEPARATOR) {
            key.push(PATH_SEPARATOR);
        }
        key.push_str(stripped);
        if key.len() > 1 && key.ends_with(PATH_SEPARATOR) {
            key.pop();
        }
        key
    }

    /// Install a node-owned route, replacing whatever held the key
    pub fn register_static(&self, handler: HandlerHandle) {
        let key = self.routing_key(handler.path());
        let previous = self.table.insert(
            key.clone(),
            RouteEntry {
                handler: handler.clone(),
                origin: RouteOrigin::Static,
            },
        );
        if let Some(previous) = previous {
            warn!(
                path = %key,
                replaced = previous.handler.name(),
                "Replacing existing route with static handler"
            );
        }
        info!(path = %key, handler = handler.name(), "Registered static route");
    }

    /// Install a plugin route. Returns `false` when a static route holds the key.
    pub fn handler_discovered(&self, handler: HandlerHandle) -> bool {
        let key = self.routing_key(handler.path());
        match self.table.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().origin == RouteOrigin::Static => {
                debug!(
                    path = %key,
                    handler = handler.name(),
                    "Static route kept over discovered handler"
                );
                false
            }
            Entry::Occupied(mut entry) => {
                entry.insert(RouteEntry {
                    handler: handler.clone(),
                    origin: RouteOrigin::Dynamic,
                });
                info!(path = %key, handler = handler.name(), "Replaced plugin route");
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(RouteEntry {
                    handler: handler.clone(),
                    origin: RouteOrigin::Dynamic,
                });
                info!(path = %key, handler = handler.name(), "Registered plugin route");
                true
            }
        }
    }

    /// Remove a plugin route. Static routes are never withdrawn.
    pub fn handler_withdrawn(&self, handler: &HandlerHandle) -> bool {
        let key = self.routing_key(handler.path());
        let removed = self
            .table
            .remove_if(&key, |_, entry| entry.origin == RouteOrigin::Dynamic)
            .is_some();
        if removed {
            info!(path = %key, handler = handler.name(), "Withdrew plugin route");
        } else {
            debug!(path = %key, "No plugin route to withdraw");
        }
        removed
    }

    pub fn handler_changed(&self, handler: HandlerHandle) -> bool {
        self.handler_discovered(handler)
    }

    pub fn apply(&self, event: PluginEvent) -> bool {
        match event {
            PluginEvent::Discovered(handler) => self.handler_discovered(handler),
            PluginEvent::Withdrawn(handler) => self.handler_withdrawn(&handler),
            PluginEvent::Changed(handler) => self.handler_changed(handler),
        }
    }

    /// Discover every handler a source offers; returns how many were installed
    pub fn scan(&self, source: &dyn HandlerSource) -> usize {
        let installed = source
            .handlers()
            .into_iter()
            .filter(|handler| self.handler_discovered(handler.clone()))
            .count();
        info!(installed, "Handler scan completed");
        installed
    }

    pub fn resolve(&self, path: &str) -> Option<HandlerHandle> {
        let key = self.routing_key(path);
        self.table.get(&key).map(|entry| entry.handler.clone())
    }

    /// Route a request to its handler
    pub fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome> {
        // The table guard is released before the handler runs
        let Some(handler) = self.resolve(&request.path) else {
            debug!(path = %request.path, "No route for request");
            return Ok(DispatchOutcome::NotFound {
                path: request.path.clone(),
            });
        };

        debug!(path = %request.path, handler = handler.name(), "Dispatching request");
        handler
            .handle(request)
            .map(DispatchOutcome::Handled)
            .map_err(|source| {
                warn!(path = %request.path, handler = handler.name(), error = %source, "Handler failed");
                SlaveError::HandlerFailed {
                    path: request.path.clone(),
                    source,
                }
            })
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes: Vec<RouteInfo> = self
            .table
            .iter()
            .map(|entry| RouteInfo {
                path: entry.key().clone(),
                handler: entry.value().handler.name().to_string(),
                origin: entry.value().origin,
            })
            .collect();
        routes.sort_by(|a, b| a.path.cmp(&b.path));
        routes
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl fmt::Debug for DispatchRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRouter")
            .field("root_prefix", &self.root_prefix)
            .field("routes", &self.table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchResponse, RequestHandler};
    use std::sync::Arc;

    struct EchoHandler {
        path: String,
        name: String,
    }

    impl RequestHandler for EchoHandler {
        fn path(&self) -> &str {
            &self.path
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn handle(&self, _request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
            Ok(DispatchResponse {
                status: 200,
                content_type: "text/plain".to_string(),
                body: self.name.clone(),
            })
        }
    }

    fn handler(path: &str, name: &str) -> HandlerHandle {
        Arc::new(EchoHandler {
            path: path.to_string(),
            name: name.to_string(),
        })
    }

    #[test]
    fn test_routing_key_normalization() {
        let router = DispatchRouter::new("/kettle/");
        assert_eq!(router.routing_key("/kettle/status"), "/status");
        assert_eq!(router.routing_key("/kettle/status/"), "/status");
        assert_eq!(router.routing_key("status"), "/status");
        assert_eq!(router.routing_key("/kettlebell"), "/kettlebell");
        assert_eq!(router.routing_key("/kettle"), "/");
        assert_eq!(router.routing_key("/"), "/");
    }

    #[test]
    fn test_withdraw_keeps_static_route() {
        let router = DispatchRouter::new("/kettle");
        router.register_static(handler("/kettle/status", "builtin"));

        let plugin = handler("/status", "plugin");
        assert!(!router.handler_discovered(plugin.clone()));
        assert!(!router.handler_withdrawn(&plugin));
        assert_eq!(router.resolve("/status").unwrap().name(), "builtin");
    }

    #[test]
    fn test_plugin_lifecycle() {
        let router = DispatchRouter::new("/kettle");
        let v1 = handler("/kettle/export", "export-v1");
        let v2 = handler("/kettle/export", "export-v2");

        assert!(router.apply(PluginEvent::Discovered(v1)));
        assert!(router.apply(PluginEvent::Changed(v2.clone())));
        assert_eq!(router.resolve("/export/").unwrap().name(), "export-v2");

        assert!(router.apply(PluginEvent::Withdrawn(v2)));
        assert!(router.resolve("/export").is_none());
    }

    #[test]
    fn test_scan_reports_installed() {
        let router = DispatchRouter::new("/kettle");
        router.register_static(handler("/status", "builtin"));

        let source: Vec<HandlerHandle> = vec![handler("/status", "shadowed"), handler("/a", "a")];
        assert_eq!(router.scan(&source), 1);

        let routes = router.routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].path, "/a");
        assert_eq!(routes[0].origin, RouteOrigin::Dynamic);
        assert_eq!(routes[1].origin, RouteOrigin::Static);
    }
}
