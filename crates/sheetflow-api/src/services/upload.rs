//! Spreadsheet upload pipeline
//!
//! validate → store → enqueue → notify. Each stage maps its failure to a
//! distinct client message; later stages never undo earlier ones.

use std::sync::Arc;

use sheetflow_core::models::UploadResponse;
use sheetflow_core::AppError;
use uuid::Uuid;

use crate::error::HttpAppError;
use crate::state::AppState;
use crate::utils::upload::{UploadForm, UploadedFile};

pub struct SpreadsheetUploadService {
    state: Arc<AppState>,
}

impl SpreadsheetUploadService {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            state: state.clone(),
        }
    }

    #[tracing::instrument(skip(self, form, file), fields(email = %form.email, filename = %file.filename))]
    pub async fn accept(
        &self,
        form: UploadForm,
        file: UploadedFile,
    ) -> Result<UploadResponse, HttpAppError> {
        let UploadForm { email } = form;
        let UploadedFile {
            filename,
            content_type,
            data,
        } = file;

        tracing::info!("Upload request received");

        // 1. Size, type and extension checks
        let format = self
            .state
            .validator
            .validate_all(content_type.as_deref(), &filename, data.len())
            .map_err(|e| {
                tracing::warn!(
                    size = data.len(),
                    content_type = ?content_type,
                    error = %e,
                    "Upload rejected"
                );
                HttpAppError::from(e)
            })?;

        // 2. Persist under a task-scoped name
        let task_id = Uuid::new_v4();
        let stored = self.state.storage.store(task_id, &filename, data).await?;
        tracing::info!(
            task_id = %task_id,
            path = %stored.path,
            format = %format,
            "Upload saved"
        );

        // 3. Hand off to the worker
        self.state
            .task_queue
            .enqueue(task_id, &stored.key, &email)
            .await
            .map_err(|e| {
                tracing::error!(task_id = %task_id, error = %e, "Failed to enqueue task");
                HttpAppError(AppError::Enqueue(e.to_string()))
            })?;
        tracing::info!(task_id = %task_id, "Task enqueued");

        // 4. Tell the submitter; the job keeps running if this fails
        let task_id_str = task_id.to_string();
        if let Err(e) = self
            .state
            .notifier
            .send_task_email(&email, &filename, &task_id_str)
            .await
        {
            tracing::error!(
                task_id = %task_id,
                error = %e,
                "Confirmation email failed, task remains queued"
            );
            return Err(e.into());
        }

        tracing::info!(task_id = %task_id, "Upload accepted");

        Ok(UploadResponse::accepted(email, filename, task_id_str))
    }
}
