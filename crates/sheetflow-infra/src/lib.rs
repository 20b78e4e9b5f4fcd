//! SheetFlow Infrastructure Library
//!
//! Shared infrastructure used by the SheetFlow binary:
//! - Middleware (request ID, request logging)
//! - Telemetry initialization (console and optional rolling file sink)

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "middleware")]
pub use middleware::{get_request_id, request_id_middleware, request_logging_middleware, RequestId};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};
