//! Application setup and initialization
//!
//! Builds the task store, storage, notifier, shared state and router from a
//! validated [`Config`].

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::{Context, Result};
use sheetflow_core::{Config, QueueBackend};
use sheetflow_db::{InMemoryTaskStore, TaskRepository, TaskStore};
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    tracing::info!(
        app_name = %config.app_name,
        environment = %config.environment,
        queue_backend = %config.queue_backend,
        worker_mode = ?config.worker_mode,
        "Configuration loaded and validated successfully"
    );

    let (store, pool) = match config.queue_backend {
        QueueBackend::Postgres => {
            let pool = database::setup_database(&config).await?;
            let store: Arc<dyn TaskStore> = Arc::new(TaskRepository::new(pool.clone()));
            (store, Some(pool))
        }
        QueueBackend::Memory => {
            tracing::warn!("Using in-memory task store; tasks do not survive a restart");
            let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
            (store, None)
        }
    };

    let state = services::initialize_services(&config, store, pool).await?;

    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
