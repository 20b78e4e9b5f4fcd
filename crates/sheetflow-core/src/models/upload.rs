use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::task::TaskStatus;

pub const UPLOAD_ACCEPTED_MESSAGE: &str =
    "File uploaded and processing started. Check your email for the task ID.";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub email: String,
    /// Filename as supplied by the client.
    pub filename: String,
    pub task_id: String,
    pub message: String,
}

impl UploadResponse {
    pub fn accepted(
        email: impl Into<String>,
        filename: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            filename: filename.into(),
            task_id: task_id.into(),
            message: UPLOAD_ACCEPTED_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    /// Present only once the task succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub message: String,
    pub status: String,
    pub app_name: String,
}
