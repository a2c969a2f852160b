//! # Request Dispatch
//!
//! Routing of control requests to built-in and plugin handlers.
//!
//! ```text
//! DispatchRequest ──► DispatchRouter ──► RequestHandler
//!                          │                  │
//!                     NotFound           DispatchResponse / HandlerFailed
//! ```

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::BuiltinHandlers;
pub use router::DispatchRouter;
pub use types::{
    DispatchOutcome, DispatchRequest, DispatchResponse, HandlerHandle, HandlerSource, PluginEvent,
    RequestHandler, RouteInfo, RouteOrigin, WebResult,
};
