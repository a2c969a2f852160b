//! Built-in control handlers.
//!
//! Every handler answers with JSON. Requests that name something the node
//! does not track get a [`WebResult`] with an `ERROR` result rather than a
//! handler failure; malformed requests fail with
//! [`SlaveError::InvalidRequest`].

use super::types::{DispatchRequest, DispatchResponse, HandlerHandle, RequestHandler, WebResult};
use crate::cluster::{ClusterRegistry, PeerDetection, UpsertOutcome};
use crate::constants::routes;
use crate::context::StatusReporter;
use crate::error::SlaveError;
use crate::execution::{StopMode, UnitKind};
use crate::registry::ExecutionRegistry;
use crate::sockets::{PortAllocationRequest, PortAllocationTable};
use std::sync::Arc;
use tracing::info;

const PARAM_NAME: &str = "name";
const PARAM_ID: &str = "id";
const PARAM_INPUT_ONLY: &str = "inputOnly";
const PARAM_HOSTNAME: &str = "hostname";
const PARAM_RANGE_START: &str = "rangeStart";

pub struct StatusHandler {
    reporter: Arc<StatusReporter>,
}

impl StatusHandler {
    pub fn new(reporter: Arc<StatusReporter>) -> Self {
        Self { reporter }
    }
}

impl RequestHandler for StatusHandler {
    fn path(&self) -> &str {
        routes::STATUS
    }

    fn name(&self) -> &str {
        "status"
    }

    fn handle(&self, _request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
        Ok(DispatchResponse::json(&self.reporter.snapshot())?)
    }
}

/// Accepts a peer detection document in the request body
pub struct RegisterSlaveHandler {
    cluster: Arc<ClusterRegistry>,
}

impl RegisterSlaveHandler {
    pub fn new(cluster: Arc<ClusterRegistry>) -> Self {
        Self { cluster }
    }
}

impl RequestHandler for RegisterSlaveHandler {
    fn path(&self) -> &str {
        routes::REGISTER_SLAVE
    }

    fn name(&self) -> &str {
        "register_slave"
    }

    fn handle(&self, request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
        let detection: PeerDetection = serde_json::from_str(request.required_body()?)
            .map_err(|e| SlaveError::InvalidRequest(format!("bad peer detection: {e}")))?;
        let name = detection.name().to_string();

        let message = match self.cluster.upsert(detection) {
            UpsertOutcome::Added => format!("Slave server '{name}' was added"),
            UpsertOutcome::Updated => format!("Slave server '{name}' was updated"),
        };
        Ok(DispatchResponse::json(&WebResult::ok(message))?)
    }
}

pub struct GetSlavesHandler {
    cluster: Arc<ClusterRegistry>,
}

impl GetSlavesHandler {
    pub fn new(cluster: Arc<ClusterRegistry>) -> Self {
        Self { cluster }
    }
}

impl RequestHandler for GetSlavesHandler {
    fn path(&self) -> &str {
        routes::GET_SLAVES
    }

    fn name(&self) -> &str {
        "get_slaves"
    }

    fn handle(&self, _request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
        Ok(DispatchResponse::json(&self.cluster.list())?)
    }
}

/// Stops a tracked job or transformation, addressed by name and optional id
pub struct StopUnitHandler {
    registry: Arc<ExecutionRegistry>,
}

impl StopUnitHandler {
    pub fn new(registry: Arc<ExecutionRegistry>) -> Self {
        Self { registry }
    }
}

impl RequestHandler for StopUnitHandler {
    fn path(&self) -> &str {
        match self.registry.kind() {
            UnitKind::Job => routes::STOP_JOB,
            UnitKind::Transformation => routes::STOP_TRANS,
        }
    }

    fn name(&self) -> &str {
        match self.registry.kind() {
            UnitKind::Job => "stop_job",
            UnitKind::Transformation => "stop_trans",
        }
    }

    fn handle(&self, request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
        let kind = self.registry.kind();
        let name = request.required_param(PARAM_NAME)?;
        let Some((key, _)) = self.registry.resolve(name, request.param(PARAM_ID)) else {
            return Ok(DispatchResponse::json(&WebResult::error(format!(
                "Could not find {kind} '{name}'"
            )))?);
        };

        // Only transformations can stop their input steps alone
        let mode = if kind == UnitKind::Transformation && request.flag(PARAM_INPUT_ONLY) {
            StopMode::InputOnly
        } else {
            StopMode::Full
        };
        self.registry.stop(&key, mode);
        info!(kind = %kind, key = %key, ?mode, "Stop requested");

        let result = WebResult::ok(format!("The {kind} '{}' is stopping", key.name())).with_id(key.id());
        Ok(DispatchResponse::json(&result)?)
    }
}

pub struct RemoveUnitHandler {
    registry: Arc<ExecutionRegistry>,
}

impl RemoveUnitHandler {
    pub fn new(registry: Arc<ExecutionRegistry>) -> Self {
        Self { registry }
    }
}

impl RequestHandler for RemoveUnitHandler {
    fn path(&self) -> &str {
        match self.registry.kind() {
            UnitKind::Job => routes::REMOVE_JOB,
            UnitKind::Transformation => routes::REMOVE_TRANS,
        }
    }

    fn name(&self) -> &str {
        match self.registry.kind() {
            UnitKind::Job => "remove_job",
            UnitKind::Transformation => "remove_trans",
        }
    }

    fn handle(&self, request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
        let kind = self.registry.kind();
        let name = request.required_param(PARAM_NAME)?;
        let result = match self.registry.resolve(name, request.param(PARAM_ID)) {
            Some((key, _)) => {
                self.registry.remove(&key);
                WebResult::ok(format!("The {kind} '{}' was removed", key.name())).with_id(key.id())
            }
            None => WebResult::error(format!("Could not find {kind} '{name}'")),
        };
        Ok(DispatchResponse::json(&result)?)
    }
}

/// Hands out the port for one data channel of a clustered run
pub struct AllocateServerSocketHandler {
    ports: Arc<PortAllocationTable>,
    default_range_start: u16,
}

impl AllocateServerSocketHandler {
    pub fn new(ports: Arc<PortAllocationTable>, default_range_start: u16) -> Self {
        Self {
            ports,
            default_range_start,
        }
    }
}

impl RequestHandler for AllocateServerSocketHandler {
    fn path(&self) -> &str {
        routes::ALLOCATE_SERVER_SOCKET
    }

    fn name(&self) -> &str {
        "allocate_server_socket"
    }

    fn handle(&self, request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
        let range_start = match request.param(PARAM_RANGE_START) {
            Some(value) => value.parse::<u16>().map_err(|e| {
                SlaveError::InvalidRequest(format!("bad {PARAM_RANGE_START} '{value}': {e}"))
            })?,
            None => self.default_range_start,
        };

        let allocation = PortAllocationRequest {
            hostname: request.required_param(PARAM_HOSTNAME)?.to_string(),
            clustered_run_id: request.required_param(PARAM_ID)?.to_string(),
            unit_name: request.required_param(PARAM_NAME)?.to_string(),
            source_slave: request.required_param("sourceSlave")?.to_string(),
            source_step: request.required_param("sourceStep")?.to_string(),
            source_copy: request.required_param("sourceCopy")?.to_string(),
            target_slave: request.required_param("targetSlave")?.to_string(),
            target_step: request.required_param("targetStep")?.to_string(),
            target_copy: request.required_param("targetCopy")?.to_string(),
            range_start,
        };

        let port = self.ports.allocate(allocation)?;
        Ok(DispatchResponse::json(
            &WebResult::ok(format!("Allocated port {port}")).with_id(port.to_string()),
        )?)
    }
}

/// Frees every port of a finished clustered run
pub struct DeallocateServerSocketsHandler {
    ports: Arc<PortAllocationTable>,
}

impl DeallocateServerSocketsHandler {
    pub fn new(ports: Arc<PortAllocationTable>) -> Self {
        Self { ports }
    }
}

impl RequestHandler for DeallocateServerSocketsHandler {
    fn path(&self) -> &str {
        routes::DEALLOCATE_SERVER_SOCKETS
    }

    fn name(&self) -> &str {
        "deallocate_server_sockets"
    }

    fn handle(&self, request: &DispatchRequest) -> anyhow::Result<DispatchResponse> {
        let name = request.required_param(PARAM_NAME)?;
        let run_id = request.required_param(PARAM_ID)?;
        let freed = self.ports.deallocate_run(name, run_id);
        Ok(DispatchResponse::json(&WebResult::ok(format!(
            "Deallocated {freed} port(s) of run '{run_id}'"
        )))?)
    }
}

/// Everything needed to build the built-in handler set
pub struct BuiltinHandlers {
    pub reporter: Arc<StatusReporter>,
    pub jobs: Arc<ExecutionRegistry>,
    pub transformations: Arc<ExecutionRegistry>,
    pub cluster: Arc<ClusterRegistry>,
    pub ports: Arc<PortAllocationTable>,
    pub default_range_start: u16,
}

impl BuiltinHandlers {
    pub fn into_handlers(self) -> Vec<HandlerHandle> {
        vec![
            Arc::new(StatusHandler::new(self.reporter)),
            Arc::new(RegisterSlaveHandler::new(self.cluster.clone())),
            Arc::new(GetSlavesHandler::new(self.cluster)),
            Arc::new(StopUnitHandler::new(self.jobs.clone())),
            Arc::new(StopUnitHandler::new(self.transformations.clone())),
            Arc::new(RemoveUnitHandler::new(self.jobs)),
            Arc::new(RemoveUnitHandler::new(self.transformations)),
            Arc::new(AllocateServerSocketHandler::new(
                self.ports.clone(),
                self.default_range_start,
            )),
            Arc::new(DeallocateServerSocketsHandler::new(self.ports)),
        ]
    }
}
