//! Task queue: enqueue and status for the HTTP layer, plus the worker pool that
//! claims tasks, dispatches them and applies the retry policy.
//!
//! Shutdown: [`TaskQueue::shutdown`] signals the pool to stop claiming; it does
//! not wait for in-flight tasks. A task interrupted by process exit stays
//! `started` until the stale task reaper picks it up.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use sheetflow_core::models::{SpreadsheetPayload, Task, TaskPayload, TaskStatusView};
use sheetflow_core::TaskOutcome;
use sheetflow_db::{TaskStore, TASK_NOTIFY_CHANNEL};

use crate::context::TaskHandlerContext;

const REASON_RETRIES_EXHAUSTED: &str = "Task failed after maximum retries";
const REASON_UNRECOVERABLE: &str = "Task failed with unrecoverable error";

#[derive(Clone, Debug)]
pub struct TaskQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_timeout_seconds: i32,
    pub max_retries: i32,
    /// Fixed delay between a failed attempt and the next one.
    pub retry_delay_secs: u64,
    /// Interval in seconds between runs of the stale task reaper. 0 disables it.
    pub stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to task timeout before reaping stale running tasks.
    pub stale_task_grace_period_secs: i64,
    /// Finished tasks older than this many days are purged. 0 keeps them forever.
    pub retention_days: i32,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            default_timeout_seconds: 600,
            max_retries: 3,
            retry_delay_secs: 60,
            stale_task_reap_interval_secs: 60,
            stale_task_grace_period_secs: 300,
            retention_days: 30,
        }
    }
}

impl From<&sheetflow_core::Config> for TaskQueueConfig {
    fn from(config: &sheetflow_core::Config) -> Self {
        Self {
            max_workers: config.task_queue_max_workers,
            poll_interval_ms: config.task_queue_poll_interval_ms,
            default_timeout_seconds: config.task_timeout_seconds,
            max_retries: config.task_max_retries,
            retry_delay_secs: config.task_retry_delay_secs,
            stale_task_reap_interval_secs: config.stale_task_reap_interval_secs,
            stale_task_grace_period_secs: config.stale_task_grace_period_secs,
            retention_days: config.task_retention_days,
        }
    }
}

pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    config: TaskQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
    wake: Arc<Notify>,
}

impl TaskQueue {
    /// Create a TaskQueue and spawn its worker pool.
    ///
    /// If `pool` is `Some`, the worker also LISTENs on [`TASK_NOTIFY_CHANNEL`]
    /// so tasks created by other processes wake it immediately. Tasks submitted
    /// through this queue always wake it, and polling at `poll_interval_ms`
    /// covers everything else.
    pub fn new(
        store: Arc<dyn TaskStore>,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let wake = Arc::new(Notify::new());

        let store_clone = store.clone();
        let config_clone = config.clone();
        let wake_clone = wake.clone();

        tokio::spawn(async move {
            Self::worker_pool(
                store_clone,
                config_clone,
                context,
                shutdown_rx,
                wake_clone,
                pool,
            )
            .await;
        });

        Self {
            store,
            config,
            shutdown_tx,
            wake,
        }
    }

    /// Creates a TaskQueue that does not spawn a worker.
    /// Tasks submitted here are picked up by a worker running elsewhere against
    /// the same store.
    pub fn new_no_worker(store: Arc<dyn TaskStore>, config: TaskQueueConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(shutdown_rx);
        Self {
            store,
            config,
            shutdown_tx,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Submit a typed payload under a caller-chosen task id.
    #[tracing::instrument(skip(self, payload))]
    pub async fn submit_task<P: TaskPayload>(&self, task_id: Uuid, payload: &P) -> Result<Uuid> {
        let task_type = P::task_type();
        let payload = Task::payload_from(payload).context("Failed to serialize task payload")?;

        let task = self
            .store
            .create_task(
                task_id,
                task_type,
                payload,
                self.config.max_retries,
                Some(self.config.default_timeout_seconds),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    task_id = %task_id,
                    task_type = %task_type,
                    "Failed to create task in store"
                );
                anyhow::anyhow!("Failed to create task in store: {}", e)
            })?;

        self.wake.notify_one();

        tracing::info!(task_id = %task.id, task_type = %task_type, "Task submitted to queue");

        Ok(task.id)
    }

    /// Enqueue processing of a stored upload for `email`.
    pub async fn enqueue(&self, task_id: Uuid, file_path: &str, email: &str) -> Result<Uuid> {
        let payload = SpreadsheetPayload {
            file_path: file_path.to_string(),
            email: email.to_string(),
        };
        self.submit_task(task_id, &payload).await
    }

    /// Current status of a task. Identifiers the store has never seen report `pending`.
    pub async fn get_status(&self, task_id: Uuid) -> Result<TaskStatusView> {
        let task = self.store.get_task(task_id).await?;
        Ok(task
            .as_ref()
            .map(TaskStatusView::from)
            .unwrap_or_else(TaskStatusView::unknown))
    }

    /// Claim one due task and process it on the current task.
    /// Returns the task as stored after processing, or `None` when nothing was due.
    #[cfg(test)]
    pub(crate) async fn run_once(&self, context: &Weak<dyn TaskHandlerContext>) -> Result<Option<Task>> {
        if context.strong_count() == 0 {
            anyhow::bail!("TaskHandlerContext was dropped, cannot process task");
        }
        let Some(task) = self.store.claim_next_task().await? else {
            return Ok(None);
        };
        let task_id = task.id;
        Self::process_task(task, self.store.clone(), self.config.clone(), context.clone()).await?;
        self.store.get_task(task_id).await
    }

    async fn worker_pool(
        store: Arc<dyn TaskStore>,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        wake: Arc<Notify>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            retry_delay_secs = config.retry_delay_secs,
            listen_notify = use_listen,
            "Task queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(TASK_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        let (housekeeping_shutdown_tx, mut housekeeping_shutdown_rx) = mpsc::channel::<()>(1);
        if config.stale_task_reap_interval_secs > 0 {
            let store_for_reaper = store.clone();
            let reap_interval = Duration::from_secs(config.stale_task_reap_interval_secs);
            let grace_period = config.stale_task_grace_period_secs;
            let retention_days = config.retention_days;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = store_for_reaper.reap_stale_running_tasks(grace_period).await {
                                tracing::error!(error = %e, "Stale task reaper failed");
                            }
                            if retention_days > 0 {
                                if let Err(e) = store_for_reaper.delete_old_finished_tasks(retention_days).await {
                                    tracing::error!(error = %e, "Finished task cleanup failed");
                                }
                            }
                        }
                        _ = housekeeping_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Task queue worker pool shutting down");
                    let _ = housekeeping_shutdown_tx.send(()).await;
                    break;
                }
                _ = wake.notified() => {
                    Self::claim_and_dispatch_one(&store, &config, &semaphore, &context).await;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&store, &config, &semaphore, &context).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&store, &config, &semaphore, &context).await;
                }
            }
        }

        drop(notify_tx);
        tracing::info!("Task queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        store: &Arc<dyn TaskStore>,
        config: &TaskQueueConfig,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn TaskHandlerContext>,
    ) {
        // A claimed task must have a live context to run against
        if context.strong_count() == 0 {
            tracing::debug!("Handler context not available yet, skipping claim");
            return;
        }

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match store.claim_next_task().await {
            Ok(Some(task)) => {
                let store = store.clone();
                let config = config.clone();
                let ctx = context.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_task(task, store, config, ctx).await {
                        tracing::error!(error = %e, "Task processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No tasks available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim task from queue");
            }
        }
    }

    #[tracing::instrument(skip(store, config, context), fields(task.id = %task.id, task.type = %task.task_type))]
    async fn process_task(
        task: Task,
        store: Arc<dyn TaskStore>,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
    ) -> Result<()> {
        let ctx = context.upgrade().ok_or_else(|| {
            anyhow::anyhow!("TaskHandlerContext was dropped, cannot process task")
        })?;

        let timeout_secs = task
            .timeout_seconds
            .unwrap_or(config.default_timeout_seconds)
            .max(1) as u64;

        let outcome = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            ctx.clone().dispatch_task(&task),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    task_id = %task.id,
                    timeout_seconds = timeout_secs,
                    "Task execution timed out"
                );
                TaskOutcome::RetryableFailure(anyhow::anyhow!(
                    "Task execution timed out after {} seconds",
                    timeout_secs
                ))
            }
        };

        Self::apply_outcome(&task, outcome, store.as_ref(), &config, ctx).await
    }

    /// Translate an outcome into the next stored status.
    async fn apply_outcome(
        task: &Task,
        outcome: TaskOutcome,
        store: &dyn TaskStore,
        config: &TaskQueueConfig,
        ctx: Arc<dyn TaskHandlerContext>,
    ) -> Result<()> {
        let error_message = outcome.error_message().unwrap_or_default();

        match outcome {
            TaskOutcome::Success(result) => {
                let completed = store
                    .mark_completed(task.id, result)
                    .await
                    .context("Failed to mark task as completed")?;
                tracing::info!(task_id = %task.id, task_type = %task.task_type, "Task completed successfully");
                ctx.on_task_succeeded(&completed).await;
                Ok(())
            }
            TaskOutcome::RetryableFailure(_) if task.can_retry() => {
                tracing::warn!(
                    task_id = %task.id,
                    error = %error_message,
                    retry_count = task.retry_count + 1,
                    max_retries = task.max_retries,
                    delay_secs = config.retry_delay_secs,
                    "Task execution failed, scheduling retry"
                );
                store
                    .schedule_retry(task.id, config.retry_delay_secs, &error_message)
                    .await
                    .context("Failed to schedule task retry")?;
                Ok(())
            }
            TaskOutcome::RetryableFailure(_) | TaskOutcome::TerminalFailure(_) => {
                let reason = if task.can_retry() {
                    REASON_UNRECOVERABLE
                } else {
                    REASON_RETRIES_EXHAUSTED
                };
                let error_result = json!({
                    "error": error_message,
                    "retry_count": task.retry_count,
                    "reason": reason,
                });
                store
                    .mark_failed(task.id, error_result, &error_message)
                    .await
                    .context("Failed to mark task as failed")?;
                tracing::error!(
                    task_id = %task.id,
                    error = %error_message,
                    retry_count = task.retry_count,
                    reason = reason,
                    "Task failed permanently"
                );
                Ok(())
            }
        }
    }

    /// Signals the worker pool to stop claiming new tasks and exit the main loop.
    /// Returns immediately; in-flight tasks keep running until they finish or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for TaskQueue {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            wake: self.wake.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sheetflow_core::models::TaskStatus;
    use sheetflow_core::TaskError;
    use sheetflow_db::InMemoryTaskStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Context whose behaviour is fixed per test.
    struct ScriptedContext {
        mode: Mode,
        calls: AtomicUsize,
        succeeded: AtomicUsize,
    }

    enum Mode {
        Succeed,
        FailRetryable,
        FailTerminal,
        Hang,
    }

    impl ScriptedContext {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                calls: AtomicUsize::new(0),
                succeeded: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TaskHandlerContext for ScriptedContext {
        async fn dispatch_task(self: Arc<Self>, _task: &Task) -> TaskOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Succeed => TaskOutcome::Success(json!({
                    "status": "success",
                    "email": "user@example.com",
                    "lines_processed": 3
                })),
                Mode::FailRetryable => {
                    TaskOutcome::from_result(Err(anyhow::anyhow!("corrupt workbook")))
                }
                Mode::FailTerminal => TaskOutcome::from_result(Err(
                    TaskError::unrecoverable(anyhow::anyhow!("malformed payload")).into(),
                )),
                Mode::Hang => {
                    sleep(Duration::from_secs(30)).await;
                    TaskOutcome::Success(json!({}))
                }
            }
        }

        async fn on_task_succeeded(self: Arc<Self>, _task: &Task) {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn queue(retry_delay_secs: u64) -> TaskQueue {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        TaskQueue::new_no_worker(
            store,
            TaskQueueConfig {
                retry_delay_secs,
                ..TaskQueueConfig::default()
            },
        )
    }

    fn weak(ctx: &Arc<ScriptedContext>) -> Weak<dyn TaskHandlerContext> {
        let ctx: Arc<dyn TaskHandlerContext> = ctx.clone();
        Arc::downgrade(&ctx)
    }

    #[tokio::test]
    async fn unknown_task_reports_pending() {
        let queue = queue(0);
        let view = queue.get_status(Uuid::new_v4()).await.unwrap();
        assert_eq!(view.status, TaskStatus::Pending);
        assert!(view.result.is_none());
    }

    #[tokio::test]
    async fn enqueue_creates_pending_task_with_payload() {
        let queue = queue(0);
        let id = Uuid::new_v4();
        let returned = queue
            .enqueue(id, "abc_data.csv", "user@example.com")
            .await
            .unwrap();
        assert_eq!(returned, id);

        let task = queue.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.max_retries, 3);
        let payload: SpreadsheetPayload = task.try_payload_as().unwrap();
        assert_eq!(payload.file_path, "abc_data.csv");
        assert_eq!(payload.email, "user@example.com");
    }

    #[tokio::test]
    async fn successful_task_exposes_result() {
        let queue = queue(0);
        let ctx = ScriptedContext::new(Mode::Succeed);
        let id = queue.enqueue(Uuid::new_v4(), "f.csv", "user@example.com").await.unwrap();

        let task = queue.run_once(&weak(&ctx)).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(ctx.succeeded.load(Ordering::SeqCst), 1);

        let view = queue.get_status(id).await.unwrap();
        assert_eq!(view.status, TaskStatus::Success);
        assert_eq!(view.result.unwrap()["lines_processed"], 3);
    }

    #[tokio::test]
    async fn failing_task_retries_three_times_then_fails() {
        let queue = queue(0);
        let ctx = ScriptedContext::new(Mode::FailRetryable);
        let id = queue.enqueue(Uuid::new_v4(), "f.xlsx", "user@example.com").await.unwrap();

        for expected_retry in 1..=3 {
            let task = queue.run_once(&weak(&ctx)).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Retrying);
            assert_eq!(task.retry_count, expected_retry);
            assert_eq!(task.last_error.as_deref(), Some("corrupt workbook"));
        }

        let task = queue.run_once(&weak(&ctx)).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failure);
        assert_eq!(task.retry_count, 3);
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 4);

        let result = task.result.unwrap();
        assert_eq!(result["error"], "corrupt workbook");
        assert_eq!(result["retry_count"], 3);
        assert_eq!(result["reason"], REASON_RETRIES_EXHAUSTED);

        assert!(queue.run_once(&weak(&ctx)).await.unwrap().is_none());
        let view = queue.get_status(id).await.unwrap();
        assert_eq!(view.status, TaskStatus::Failure);
        assert!(view.result.is_none());
    }

    #[tokio::test]
    async fn retry_waits_for_configured_delay() {
        let queue = queue(60);
        let ctx = ScriptedContext::new(Mode::FailRetryable);
        queue.enqueue(Uuid::new_v4(), "f.csv", "user@example.com").await.unwrap();

        let task = queue.run_once(&weak(&ctx)).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Retrying);
        let delay = task.scheduled_at - chrono::Utc::now();
        assert!(delay > chrono::Duration::seconds(55));

        assert!(queue.run_once(&weak(&ctx)).await.unwrap().is_none());
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_failure_skips_retries() {
        let queue = queue(0);
        let ctx = ScriptedContext::new(Mode::FailTerminal);
        queue.enqueue(Uuid::new_v4(), "f.csv", "user@example.com").await.unwrap();

        let task = queue.run_once(&weak(&ctx)).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failure);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.result.unwrap()["reason"], REASON_UNRECOVERABLE);
    }

    #[tokio::test]
    async fn timeout_is_retryable() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let queue = TaskQueue::new_no_worker(
            store,
            TaskQueueConfig {
                retry_delay_secs: 0,
                default_timeout_seconds: 1,
                ..TaskQueueConfig::default()
            },
        );
        let ctx = ScriptedContext::new(Mode::Hang);
        queue.enqueue(Uuid::new_v4(), "f.csv", "user@example.com").await.unwrap();

        let task = queue.run_once(&weak(&ctx)).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Retrying);
        assert!(task.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn dropped_context_is_an_error() {
        let queue = queue(0);
        queue.enqueue(Uuid::new_v4(), "f.csv", "user@example.com").await.unwrap();
        let ctx = ScriptedContext::new(Mode::Succeed);
        let gone = weak(&ctx);
        drop(ctx);
        assert!(queue.run_once(&gone).await.is_err());
    }

    #[tokio::test]
    async fn worker_pool_processes_submitted_task() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let ctx = ScriptedContext::new(Mode::Succeed);
        let queue = TaskQueue::new(
            store,
            TaskQueueConfig {
                poll_interval_ms: 20,
                stale_task_reap_interval_secs: 0,
                ..TaskQueueConfig::default()
            },
            weak(&ctx),
            None,
        );

        let id = queue.enqueue(Uuid::new_v4(), "f.csv", "user@example.com").await.unwrap();

        let mut status = TaskStatus::Pending;
        for _ in 0..100 {
            status = queue.get_status(id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, TaskStatus::Success);
        queue.shutdown().await;
    }
}
