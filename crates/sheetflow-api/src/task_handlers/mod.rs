mod spreadsheet_handler;

pub use spreadsheet_handler::SpreadsheetTaskHandler;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::state::AppState;
use sheetflow_core::models::Task;

/// Trait for task handlers.
///
/// Parsing is CPU-bound: run it inside `tokio::task::spawn_blocking` so it
/// does not stall the runtime. Errors are retried unless marked with
/// [`sheetflow_core::TaskResultExt::unrecoverable`].
#[async_trait]
pub trait TaskHandler {
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<serde_json::Value>;
}
