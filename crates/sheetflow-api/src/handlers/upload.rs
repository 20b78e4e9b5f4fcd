use crate::error::{ErrorResponse, HttpAppError};
use crate::services::upload::SpreadsheetUploadService;
use crate::state::AppState;
use crate::utils::upload::extract_upload_form;
use axum::{
    extract::{Multipart, State},
    Json,
};
use sheetflow_core::models::UploadResponse;
use std::sync::Arc;

#[utoipa::path(
    post,
    path = "/api/v1/upload",
    tag = "spreadsheets",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored, task enqueued and confirmation sent", body = UploadResponse),
        (status = 400, description = "Empty file or unsupported type/extension", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 422, description = "Missing or invalid form field", body = ErrorResponse),
        (status = 500, description = "Storage, enqueue or email failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart))]
pub async fn upload_spreadsheet(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpAppError> {
    let (form, file) = extract_upload_form(multipart).await?;

    let response = SpreadsheetUploadService::new(&state)
        .accept(form, file)
        .await?;

    Ok(Json(response))
}
