//! SheetFlow Database Layer
//!
//! The broker/result store for processing tasks: a `TaskStore` trait with a
//! PostgreSQL repository and a process-local in-memory implementation.

pub mod db;

pub use db::{InMemoryTaskStore, TaskRepository, TaskStore, TASK_NOTIFY_CHANNEL};
