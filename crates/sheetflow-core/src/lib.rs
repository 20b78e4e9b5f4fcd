//! SheetFlow Core Library
//!
//! Domain models, error types, configuration, and task outcome types shared by
//! the API, the worker runtime, and the storage/processing crates.

pub mod config;
pub mod error;
pub mod models;
pub mod task_error;

pub use config::{Config, EmailTransport, QueueBackend, WorkerMode};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use task_error::{TaskError, TaskOutcome, TaskResultExt};
