//! Task handler context trait
//!
//! The API implements this trait for its application state. The worker calls
//! `dispatch_task` for each claimed task and turns the returned outcome into a
//! status transition.

use async_trait::async_trait;
use std::sync::Arc;

use sheetflow_core::models::Task;
use sheetflow_core::TaskOutcome;

/// Context for task dispatch.
///
/// The worker holds a weak reference, so the pool never keeps application
/// state alive on its own.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    /// Run the handler for `task` and report how it ended.
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> TaskOutcome;

    /// Called once the task has been recorded as `success`.
    async fn on_task_succeeded(self: Arc<Self>, _task: &Task) {}
}
