//! # System Constants
//!
//! Defaults and well-known names shared by the registries, the socket
//! allocator and the dispatch router.

use std::time::Duration;

/// Root prefix under which every control endpoint is published
pub const DEFAULT_ROOT_PREFIX: &str = "/kettle";

/// Separator used by dispatch paths
pub const PATH_SEPARATOR: char = '/';

/// Socket allocation defaults
pub mod sockets {
    use super::Duration;

    /// Pause between two bind attempts while the port is held in TIME_WAIT
    pub const BIND_RETRY_INTERVAL: Duration = Duration::from_secs(10);

    /// Give up binding once this much time has elapsed
    pub const BIND_RETRY_CEILING: Duration = Duration::from_secs(5 * 60);

    /// First port handed out to a clustered run when the caller gives no range
    pub const DEFAULT_PORT_RANGE_START: u16 = 40000;

    pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
}

/// Cluster membership defaults
pub mod cluster {
    use super::Duration;

    pub const PROBE_INTERVAL: Duration = Duration::from_secs(60);
    pub const PROBE_TIMEOUT: Duration = Duration::from_millis(2000);
}

/// Built-in control endpoint paths, relative to the root prefix
pub mod routes {
    pub const STATUS: &str = "/status";
    pub const REGISTER_SLAVE: &str = "/registerSlave";
    pub const GET_SLAVES: &str = "/getSlaves";
    pub const STOP_JOB: &str = "/stopJob";
    pub const STOP_TRANS: &str = "/stopTrans";
    pub const REMOVE_JOB: &str = "/removeJob";
    pub const REMOVE_TRANS: &str = "/removeTrans";
    pub const ALLOCATE_SERVER_SOCKET: &str = "/allocateSocket";
    pub const DEALLOCATE_SERVER_SOCKETS: &str = "/deallocateSockets";
}

/// Result markers of a control response
pub mod web_result {
    pub const OK: &str = "OK";
    pub const ERROR: &str = "ERROR";
}

/// Environment variables read by logging and configuration
pub mod env {
    pub const ENVIRONMENT: &str = "SLAVE_ENV";
    pub const LOG_FORMAT: &str = "SLAVE_LOG_FORMAT";
    pub const CONFIG_PREFIX: &str = "SLAVE";
    pub const CONFIG_SEPARATOR: &str = "__";
}
