use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use sheetflow_core::models::{StatusResponse, TaskStatusView};
use sheetflow_core::AppError;
use std::sync::Arc;
use uuid::Uuid;

/// Unknown identifiers, and strings that are not identifiers at all, report
/// `pending` rather than 404.
#[utoipa::path(
    get,
    path = "/api/v1/status/{task_id}",
    tag = "spreadsheets",
    params(
        ("task_id" = String, Path, description = "Task identifier returned by the upload endpoint")
    ),
    responses(
        (status = 200, description = "Current task status", body = StatusResponse),
        (status = 500, description = "Result store unavailable", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusResponse>, HttpAppError> {
    let view = match Uuid::parse_str(&task_id) {
        Ok(id) => state.task_queue.get_status(id).await.map_err(|e| {
            tracing::error!(task_id = %task_id, error = %e, "Failed to read task status");
            HttpAppError(AppError::InternalWithSource {
                message: "Failed to read task status".to_string(),
                source: e,
            })
        })?,
        Err(_) => {
            tracing::debug!(task_id = %task_id, "Malformed task id, reporting pending");
            TaskStatusView::unknown()
        }
    };

    Ok(Json(StatusResponse {
        task_id,
        status: view.status,
        result: view.result,
    }))
}
