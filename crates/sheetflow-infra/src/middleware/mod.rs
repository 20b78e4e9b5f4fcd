//! Shared HTTP middleware for SheetFlow

pub mod request_id;
pub mod request_logging;

pub use request_id::{get_request_id, request_id_middleware, RequestId};
pub use request_logging::request_logging_middleware;
