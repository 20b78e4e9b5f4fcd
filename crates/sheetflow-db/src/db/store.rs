use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use sheetflow_core::models::{Task, TaskType};

/// Persistence contract for processing tasks.
///
/// The upload path only ever calls `create_task` and `get_task`; every status
/// transition after creation goes through the worker runtime.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a `pending` task due immediately.
    async fn create_task(
        &self,
        task_id: Uuid,
        task_type: TaskType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Task>;

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>>;

    /// Atomically move the oldest due `pending`/`retrying` task to `started`.
    async fn claim_next_task(&self) -> Result<Option<Task>>;

    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task>;

    /// Terminal failure. `error` becomes the task result.
    async fn mark_failed(
        &self,
        task_id: Uuid,
        error: serde_json::Value,
        last_error: &str,
    ) -> Result<Task>;

    /// Increment the retry count and make the task claimable again after `delay_secs`.
    async fn schedule_retry(&self, task_id: Uuid, delay_secs: u64, last_error: &str)
        -> Result<Task>;

    /// Recover `started` tasks whose worker vanished: they are retried, or
    /// failed when the budget is spent. Returns the number of tasks touched.
    async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64>;

    /// Delete `success`/`failure` tasks older than the given number of days.
    async fn delete_old_finished_tasks(&self, older_than_days: i32) -> Result<u64>;
}
