use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ProcessSpreadsheet,
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskType::ProcessSpreadsheet => write!(f, "process_spreadsheet"),
        }
    }
}

impl FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process_spreadsheet" => Ok(TaskType::ProcessSpreadsheet),
            _ => Err(anyhow::anyhow!("Invalid task type: {}", s)),
        }
    }
}

/// Lifecycle of a processing job.
///
/// `pending -> started -> success`, or `started -> retrying -> started ...`
/// until the retry budget runs out and the task lands in `failure`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(
    feature = "sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "task_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Started,
    Retrying,
    Success,
    Failure,
}

impl TaskStatus {
    /// No further automatic transition happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Started => write!(f, "started"),
            TaskStatus::Retrying => write!(f, "retrying"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "started" => Ok(TaskStatus::Started),
            "retrying" => Ok(TaskStatus::Retrying),
            "success" => Ok(TaskStatus::Success),
            "failure" => Ok(TaskStatus::Failure),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Task {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Task {
            id: row.get("id"),
            task_type: row.get::<String, _>("task_type").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task_type: {}", e).into())
            })?,
            status: row.get("status"),
            payload: row.get("payload"),
            result: row.get("result"),
            last_error: row.get("last_error"),
            scheduled_at: row.get("scheduled_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            timeout_seconds: row.get("timeout_seconds"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl Task {
    /// Build a fresh `pending` task, due immediately.
    pub fn new_pending(
        id: Uuid,
        task_type: TaskType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        Task {
            id,
            task_type,
            status: TaskStatus::Pending,
            payload,
            result: None,
            last_error: None,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            timeout_seconds,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready_to_run(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Retrying)
            && self.scheduled_at <= Utc::now()
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: TaskPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Serialize a typed payload for storage.
    pub fn payload_from<P: TaskPayload>(payload: &P) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(payload)
    }
}

/// Trait for type-safe task payloads
pub trait TaskPayload: Serialize + for<'de> Deserialize<'de> {
    fn task_type() -> TaskType;
}

/// Job payload for a stored upload awaiting processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetPayload {
    /// Storage key of the uploaded bytes.
    pub file_path: String,
    /// Recipient echoed into the result.
    pub email: String,
}

impl TaskPayload for SpreadsheetPayload {
    fn task_type() -> TaskType {
        TaskType::ProcessSpreadsheet
    }
}

/// Result payload of a successful processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProcessingResult {
    pub status: String,
    pub email: String,
    pub lines_processed: u64,
}

impl ProcessingResult {
    pub fn success(email: impl Into<String>, lines_processed: u64) -> Self {
        Self {
            status: "success".to_string(),
            email: email.into(),
            lines_processed,
        }
    }
}

/// What the result store reports for a task identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusView {
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
}

impl TaskStatusView {
    /// The view for an identifier the store has never seen.
    pub fn unknown() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
        }
    }
}

impl From<&Task> for TaskStatusView {
    fn from(task: &Task) -> Self {
        Self {
            status: task.status,
            result: match task.status {
                TaskStatus::Success => task.result.clone(),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(status: TaskStatus) -> Task {
        let mut task = Task::new_pending(
            Uuid::new_v4(),
            TaskType::ProcessSpreadsheet,
            serde_json::json!({"file_path": "abc_data.csv", "email": "user@example.com"}),
            3,
            Some(600),
        );
        task.status = status;
        task
    }

    #[test]
    fn test_task_type_display_and_parse() {
        assert_eq!(TaskType::ProcessSpreadsheet.to_string(), "process_spreadsheet");
        assert_eq!(
            "process_spreadsheet".parse::<TaskType>().unwrap(),
            TaskType::ProcessSpreadsheet
        );
        assert!("video_transcode".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_task_status_from_str() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Started,
            TaskStatus::Retrying,
            TaskStatus::Success,
            TaskStatus::Failure,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("completed".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_task_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TaskStatus::Retrying).unwrap(),
            serde_json::json!("retrying")
        );
    }

    #[test]
    fn test_is_terminal() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failure.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_ready_to_run() {
        assert!(sample_task(TaskStatus::Pending).is_ready_to_run());
        assert!(sample_task(TaskStatus::Retrying).is_ready_to_run());
        assert!(!sample_task(TaskStatus::Started).is_ready_to_run());

        let mut later = sample_task(TaskStatus::Retrying);
        later.scheduled_at = Utc::now() + chrono::Duration::seconds(60);
        assert!(!later.is_ready_to_run());
    }

    #[test]
    fn test_can_retry() {
        let mut task = sample_task(TaskStatus::Started);
        task.retry_count = 2;
        assert!(task.can_retry());
        task.retry_count = 3;
        assert!(!task.can_retry());
    }

    #[test]
    fn test_payload_round_trip() {
        let task = sample_task(TaskStatus::Pending);
        let payload: SpreadsheetPayload = task.try_payload_as().unwrap();
        assert_eq!(payload.file_path, "abc_data.csv");
        assert_eq!(SpreadsheetPayload::task_type(), TaskType::ProcessSpreadsheet);
    }

    #[test]
    fn test_status_view_hides_result_unless_success() {
        let mut task = sample_task(TaskStatus::Failure);
        task.result = Some(serde_json::json!({"error": "boom"}));
        assert_eq!(TaskStatusView::from(&task).result, None);

        task.status = TaskStatus::Success;
        task.result = Some(serde_json::to_value(ProcessingResult::success("user@example.com", 3)).unwrap());
        let view = TaskStatusView::from(&task);
        assert_eq!(view.status, TaskStatus::Success);
        assert_eq!(view.result.unwrap()["lines_processed"], 3);
    }

    #[test]
    fn test_unknown_view_is_pending() {
        assert_eq!(TaskStatusView::unknown().status, TaskStatus::Pending);
    }
}
