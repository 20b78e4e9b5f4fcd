//! Data models for the application
//!
//! Task records and payloads live in `task`; HTTP request/response bodies in `upload`.

mod task;
mod upload;

pub use task::*;
pub use upload::*;
