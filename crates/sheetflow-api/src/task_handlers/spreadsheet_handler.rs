use super::TaskHandler;
use crate::state::AppState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sheetflow_core::models::{ProcessingResult, SpreadsheetPayload, Task};
use sheetflow_core::TaskResultExt;
use sheetflow_processing::SpreadsheetFormat;
use std::sync::Arc;

/// Counts the data rows of a stored upload.
pub struct SpreadsheetTaskHandler;

#[async_trait]
impl TaskHandler for SpreadsheetTaskHandler {
    #[tracing::instrument(skip(self, task, state), fields(task.id = %task.id, retry_count = task.retry_count))]
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<serde_json::Value> {
        let payload: SpreadsheetPayload = task
            .try_payload_as::<SpreadsheetPayload>()
            .context("Failed to parse spreadsheet payload")
            .unrecoverable()?;

        tracing::info!(file_path = %payload.file_path, "Processing spreadsheet");

        let format = SpreadsheetFormat::from_path(&payload.file_path)?;

        let data = state
            .storage
            .read(&payload.file_path)
            .await
            .with_context(|| format!("Failed to read {}", payload.file_path))?;

        let lines_processed = tokio::task::spawn_blocking(move || format.count_rows(&data))
            .await
            .context("spawn_blocking for spreadsheet parsing")??;

        tracing::info!(
            file_path = %payload.file_path,
            format = %format,
            lines_processed = lines_processed,
            "Spreadsheet processed"
        );

        let result = ProcessingResult::success(payload.email, lines_processed);
        Ok(serde_json::to_value(result)?)
    }
}
