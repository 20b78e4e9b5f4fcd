use crate::state::AppState;
use axum::{extract::State, Json};
use sheetflow_core::models::{HealthResponse, RootResponse};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/",
    tag = "meta",
    responses((status = 200, description = "Service banner", body = RootResponse))
)]
pub async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        message: format!("Welcome to {}", state.config.app_name),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Liveness only; dependencies are not probed.
#[utoipa::path(
    get,
    path = "/health",
    tag = "meta",
    responses((status = 200, description = "Process is running", body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Application is running.".to_string(),
        status: "healthy".to_string(),
        app_name: state.config.app_name.clone(),
    })
}
