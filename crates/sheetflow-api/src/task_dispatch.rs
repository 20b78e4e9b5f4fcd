//! TaskHandlerContext implementation for AppState.
//!
//! Dispatches tasks to the appropriate handler based on task type.

use async_trait::async_trait;
use std::sync::Arc;

use sheetflow_core::models::{SpreadsheetPayload, Task, TaskType};
use sheetflow_core::TaskOutcome;
use sheetflow_worker::TaskHandlerContext;

use crate::state::AppState;
use crate::task_handlers::{SpreadsheetTaskHandler, TaskHandler};

#[async_trait]
impl TaskHandlerContext for AppState {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> TaskOutcome {
        let result = match task.task_type {
            TaskType::ProcessSpreadsheet => {
                let handler = SpreadsheetTaskHandler;
                handler.process(task, self).await
            }
        };
        TaskOutcome::from_result(result)
    }

    /// Removes the upload once its task has succeeded, when configured to.
    async fn on_task_succeeded(self: Arc<Self>, task: &Task) {
        if !self.config.delete_after_processing {
            return;
        }
        let Ok(payload) = task.try_payload_as::<SpreadsheetPayload>() else {
            return;
        };
        match self.storage.delete(&payload.file_path).await {
            Ok(()) => {
                tracing::info!(task_id = %task.id, file_path = %payload.file_path, "Upload deleted after processing");
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %task.id,
                    file_path = %payload.file_path,
                    error = %e,
                    "Failed to delete upload after processing"
                );
            }
        }
    }
}
