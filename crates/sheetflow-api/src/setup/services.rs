//! Service initialization and application state setup

use anyhow::{Context, Result};
use sheetflow_core::Config;
use sheetflow_db::TaskStore;
use sheetflow_processing::SpreadsheetValidator;
use sheetflow_storage::{LocalStorage, UploadStorage};
use sheetflow_worker::{TaskHandlerContext, TaskQueue, TaskQueueConfig};
use sqlx::PgPool;
use std::sync::{Arc, Weak};

use crate::services::email::{build_notifier, Notifier};
use crate::state::AppState;

/// Initialize storage and the notifier, then assemble the application state
pub async fn initialize_services(
    config: &Config,
    store: Arc<dyn TaskStore>,
    pool: Option<PgPool>,
) -> Result<Arc<AppState>> {
    tracing::info!(upload_dir = %config.upload_dir, "Initializing upload storage...");
    let local = LocalStorage::new(&config.upload_dir)
        .await
        .context("Failed to initialize upload storage")?;
    tracing::info!(path = %local.base_path().display(), "Upload storage ready");
    let storage: Arc<dyn UploadStorage> = Arc::new(local);

    let notifier = build_notifier(config).context("Failed to initialize email notifier")?;
    tracing::info!(transport = %config.email_transport, "Email notifier initialized");

    Ok(build_state(config, storage, store, notifier, pool))
}

/// Assemble [`AppState`] and its task queue.
///
/// The worker pool holds a weak reference back to the state it dispatches
/// into, so the state is built cyclically. With `RUN_WORKER=false` the queue
/// only enqueues.
pub fn build_state(
    config: &Config,
    storage: Arc<dyn UploadStorage>,
    store: Arc<dyn TaskStore>,
    notifier: Arc<dyn Notifier>,
    pool: Option<PgPool>,
) -> Arc<AppState> {
    let queue_config = TaskQueueConfig::from(config);
    let runs_worker = config.worker_mode.runs_worker();

    let state = Arc::new_cyclic(|weak: &Weak<AppState>| {
        let task_queue = if runs_worker {
            let context: Weak<dyn TaskHandlerContext> = weak.clone();
            TaskQueue::new(store, queue_config.clone(), context, pool)
        } else {
            TaskQueue::new_no_worker(store, queue_config.clone())
        };

        AppState {
            config: config.clone(),
            storage,
            task_queue,
            notifier,
            validator: SpreadsheetValidator::new(config.max_upload_size_bytes),
        }
    });

    tracing::info!(
        worker = runs_worker,
        max_workers = queue_config.max_workers,
        max_retries = queue_config.max_retries,
        retry_delay_secs = queue_config.retry_delay_secs,
        "Task queue system initialized successfully"
    );

    state
}
