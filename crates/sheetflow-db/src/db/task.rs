use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use sheetflow_core::models::{Task, TaskStatus, TaskType};

use super::store::TaskStore;

/// Channel name for PostgreSQL LISTEN/NOTIFY when a new task is created.
pub const TASK_NOTIFY_CHANNEL: &str = "sheetflow_new_task";

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    #[tracing::instrument(skip(self, payload))]
    async fn create_task(
        &self,
        task_id: Uuid,
        task_type: TaskType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Task> {
        // Insert and notify in one transaction so workers never wake before the row is visible
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let task: Task = sqlx::query_as::<Postgres, Task>(
            r#"
            INSERT INTO tasks (
                id, task_type, status, payload, scheduled_at, max_retries, timeout_seconds
            )
            VALUES ($1, $2, $3, $4, NOW(), $5, $6)
            RETURNING
                id,
                task_type,
                status,
                payload,
                result,
                last_error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(task_id)
        .bind(task_type.to_string())
        .bind(TaskStatus::Pending)
        .bind(payload)
        .bind(max_retries)
        .bind(timeout_seconds)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                task_id = %task_id,
                task_type = %task_type,
                "Failed to insert task into database"
            );
            anyhow::anyhow!("Failed to insert task into database: {}", e)
        })?;

        // Non-fatal: workers still discover the task by polling
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(TASK_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %task.id,
                "Failed to send pg_notify for new task, workers will discover task via polling"
            );
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(
                error = %e,
                task_id = %task.id,
                "Failed to commit transaction for task creation"
            );
            anyhow::anyhow!("Failed to commit transaction: {}", e)
        })?;

        tracing::info!(
            task_id = %task.id,
            task_type = %task_type,
            max_retries = max_retries,
            "Task created"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task: Option<Task> = sqlx::query_as::<Postgres, Task>(
            r#"
            SELECT
                id,
                task_type,
                status,
                payload,
                result,
                last_error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch task")?;

        Ok(task)
    }

    /// FIFO by `scheduled_at`; `FOR UPDATE SKIP LOCKED` keeps concurrent workers
    /// from claiming the same row.
    #[tracing::instrument(skip(self))]
    async fn claim_next_task(&self) -> Result<Option<Task>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let next_id: Option<Uuid> = sqlx::query_scalar::<Postgres, Uuid>(
            r#"
            SELECT id
            FROM tasks
            WHERE status IN ('pending', 'retrying')
                AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next task")?;

        let Some(next_id) = next_id else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let task: Task = sqlx::query_as::<Postgres, Task>(
            r#"
            UPDATE tasks
            SET status = 'started',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                task_type,
                status,
                payload,
                result,
                last_error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(next_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to update task status")?;

        tx.commit().await.context("Failed to commit transaction")?;

        tracing::debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            "Task claimed"
        );

        Ok(Some(task))
    }

    #[tracing::instrument(skip(self, result))]
    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        let task: Task = sqlx::query_as::<Postgres, Task>(
            r#"
            UPDATE tasks
            SET status = 'success',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                task_type,
                status,
                payload,
                result,
                last_error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(task_id)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as completed")?;

        tracing::info!(
            task_id = %task_id,
            task_type = %task.task_type,
            "Task completed"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self, error))]
    async fn mark_failed(
        &self,
        task_id: Uuid,
        error: serde_json::Value,
        last_error: &str,
    ) -> Result<Task> {
        let task: Task = sqlx::query_as::<Postgres, Task>(
            r#"
            UPDATE tasks
            SET status = 'failure',
                result = $2,
                last_error = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                task_type,
                status,
                payload,
                result,
                last_error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(task_id)
        .bind(error)
        .bind(last_error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as failed")?;

        tracing::error!(
            task_id = %task_id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            "Task failed"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    async fn schedule_retry(
        &self,
        task_id: Uuid,
        delay_secs: u64,
        last_error: &str,
    ) -> Result<Task> {
        let task: Task = sqlx::query_as::<Postgres, Task>(
            r#"
            UPDATE tasks
            SET status = 'retrying',
                retry_count = retry_count + 1,
                last_error = $3,
                started_at = NULL,
                scheduled_at = NOW() + ($2 * interval '1 second'),
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id,
                task_type,
                status,
                payload,
                result,
                last_error,
                scheduled_at,
                started_at,
                completed_at,
                retry_count,
                max_retries,
                timeout_seconds,
                created_at,
                updated_at
            "#,
        )
        .bind(task_id)
        .bind(delay_secs as f64)
        .bind(last_error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to schedule task retry")?;

        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            scheduled_at = %task.scheduled_at,
            "Task retry scheduled"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            WITH reaped AS (
                UPDATE tasks
                SET status = CASE
                        WHEN retry_count < max_retries THEN 'retrying'::task_status
                        ELSE 'failure'::task_status
                    END,
                    retry_count = CASE
                        WHEN retry_count < max_retries THEN retry_count + 1
                        ELSE retry_count
                    END,
                    result = CASE
                        WHEN retry_count < max_retries THEN result
                        ELSE jsonb_build_object(
                            'error', 'Task did not finish before its deadline',
                            'retry_count', retry_count,
                            'reason', 'Task failed after maximum retries'
                        )
                    END,
                    completed_at = CASE
                        WHEN retry_count < max_retries THEN NULL
                        ELSE NOW()
                    END,
                    last_error = 'Task did not finish before its deadline',
                    started_at = NULL,
                    scheduled_at = NOW(),
                    updated_at = NOW()
                WHERE status = 'started'
                    AND started_at < NOW()
                        - ((COALESCE(timeout_seconds, 600) + $1) * interval '1 second')
                RETURNING id
            )
            SELECT COUNT(*)::bigint FROM reaped
            "#,
        )
        .bind(grace_period_secs as f64)
        .fetch_one(&self.pool)
        .await
        .context("Failed to reap stale running tasks")?;

        let count: i64 = row.get(0);
        let count = count.max(0) as u64;

        if count > 0 {
            tracing::warn!(
                count = count,
                grace_period_secs = grace_period_secs,
                "Reaped stale running tasks"
            );
        }

        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_old_finished_tasks(&self, older_than_days: i32) -> Result<u64> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            WITH deleted AS (
                DELETE FROM tasks
                WHERE status IN ('success', 'failure')
                    AND COALESCE(completed_at, updated_at) < NOW() - ($1 * interval '1 day')
                RETURNING id
            )
            SELECT COUNT(*)::bigint FROM deleted
            "#,
        )
        .bind(older_than_days)
        .fetch_one(&self.pool)
        .await
        .context("Failed to delete old finished tasks")?;

        let count: i64 = row.get(0);
        let count = count.max(0) as u64;

        if count > 0 {
            tracing::info!(
                count = count,
                older_than_days = older_than_days,
                "Deleted old finished tasks"
            );
        }

        Ok(count)
    }
}
