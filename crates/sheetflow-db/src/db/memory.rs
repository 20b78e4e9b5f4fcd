use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use sheetflow_core::models::{Task, TaskStatus, TaskType};

use super::store::TaskStore;

const DEFAULT_TIMEOUT_SECONDS: i64 = 600;

/// Process-local task store.
///
/// Same transitions as [`super::TaskRepository`], held in a map behind a
/// tokio `RwLock`. Claims take the write lock, so two workers never claim the
/// same task.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    async fn update<F>(&self, task_id: Uuid, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
        f(task);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(
        &self,
        task_id: Uuid,
        task_type: TaskType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Task> {
        let task = Task::new_pending(task_id, task_type, payload, max_retries, timeout_seconds);

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task_id) {
            return Err(anyhow!("Task already exists: {}", task_id));
        }
        tasks.insert(task_id, task.clone());

        tracing::info!(task_id = %task_id, task_type = %task_type, "Task created");

        Ok(task)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&task_id).cloned())
    }

    async fn claim_next_task(&self) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let now = Utc::now();

        let next = tasks
            .values_mut()
            .filter(|t| t.is_ready_to_run())
            .min_by_key(|t| (t.scheduled_at, t.created_at));

        Ok(next.map(|task| {
            task.status = TaskStatus::Started;
            task.started_at = Some(now);
            task.updated_at = now;
            tracing::debug!(task_id = %task.id, retry_count = task.retry_count, "Task claimed");
            task.clone()
        }))
    }

    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        let task = self
            .update(task_id, |task| {
                task.status = TaskStatus::Success;
                task.result = Some(result);
                task.completed_at = Some(Utc::now());
            })
            .await?;
        tracing::info!(task_id = %task_id, "Task completed");
        Ok(task)
    }

    async fn mark_failed(
        &self,
        task_id: Uuid,
        error: serde_json::Value,
        last_error: &str,
    ) -> Result<Task> {
        let task = self
            .update(task_id, |task| {
                task.status = TaskStatus::Failure;
                task.result = Some(error);
                task.last_error = Some(last_error.to_string());
                task.completed_at = Some(Utc::now());
            })
            .await?;
        tracing::error!(task_id = %task_id, retry_count = task.retry_count, "Task failed");
        Ok(task)
    }

    async fn schedule_retry(
        &self,
        task_id: Uuid,
        delay_secs: u64,
        last_error: &str,
    ) -> Result<Task> {
        let delay = Duration::seconds(i64::try_from(delay_secs).unwrap_or(i64::MAX / 1000));
        let task = self
            .update(task_id, |task| {
                task.status = TaskStatus::Retrying;
                task.retry_count += 1;
                task.last_error = Some(last_error.to_string());
                task.started_at = None;
                task.scheduled_at = Utc::now() + delay;
            })
            .await?;
        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            "Task retry scheduled"
        );
        Ok(task)
    }

    async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64> {
        let mut tasks = self.tasks.write().await;
        let now = Utc::now();
        let mut count = 0u64;

        for task in tasks.values_mut() {
            let Some(started_at) = task.started_at else {
                continue;
            };
            if task.status != TaskStatus::Started {
                continue;
            }
            let deadline = started_at
                + Duration::seconds(
                    task.timeout_seconds
                        .map(i64::from)
                        .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
                        + grace_period_secs,
                );
            if deadline >= now {
                continue;
            }

            let message = "Task did not finish before its deadline";
            if task.can_retry() {
                task.status = TaskStatus::Retrying;
                task.retry_count += 1;
            } else {
                task.status = TaskStatus::Failure;
                task.completed_at = Some(now);
                task.result = Some(serde_json::json!({
                    "error": message,
                    "retry_count": task.retry_count,
                    "reason": "Task failed after maximum retries",
                }));
            }
            task.last_error = Some(message.to_string());
            task.started_at = None;
            task.scheduled_at = now;
            task.updated_at = now;
            count += 1;
        }

        if count > 0 {
            tracing::warn!(count = count, "Reaped stale running tasks");
        }

        Ok(count)
    }

    async fn delete_old_finished_tasks(&self, older_than_days: i32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| {
            !(task.status.is_terminal() && task.completed_at.unwrap_or(task.updated_at) < cutoff)
        });
        let count = (before - tasks.len()) as u64;

        if count > 0 {
            tracing::info!(count = count, older_than_days = older_than_days, "Deleted old finished tasks");
        }

        Ok(count)
    }
}
