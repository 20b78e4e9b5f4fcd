//! Application state shared by handlers and the task dispatcher.

use sheetflow_core::Config;
use sheetflow_processing::SpreadsheetValidator;
use sheetflow_storage::UploadStorage;
use sheetflow_worker::TaskQueue;
use std::sync::Arc;

use crate::services::email::Notifier;

/// Everything a request or a task needs, built once at startup and passed
/// explicitly through axum `State` and the worker's handler context.
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn UploadStorage>,
    pub task_queue: TaskQueue,
    pub notifier: Arc<dyn Notifier>,
    pub validator: SpreadsheetValidator,
}
