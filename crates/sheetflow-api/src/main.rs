use anyhow::Context;
use sheetflow_core::{Config, WorkerMode};
use sheetflow_infra::{init_telemetry, TelemetryConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let _log_guard = init_telemetry(&TelemetryConfig::from(&config))
        .context("Failed to initialize telemetry")?;

    let (state, router) = sheetflow_api::setup::initialize_app(config.clone()).await?;

    match config.worker_mode {
        WorkerMode::Only => {
            tracing::info!("Running worker only, HTTP listener disabled");
            sheetflow_api::setup::server::shutdown_signal().await;
        }
        WorkerMode::Embedded | WorkerMode::Disabled => {
            sheetflow_api::setup::server::start_server(&config, router).await?;
        }
    }

    state.task_queue.shutdown().await;

    Ok(())
}
