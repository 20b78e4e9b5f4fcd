//! OpenAPI documentation.
//! Handler annotations use the default `/api/v1` prefix; the served document
//! is rewritten to the configured `API_PREFIX`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use sheetflow_core::models;

/// Prefix written in handler path annotations (utoipa requires literals).
const OPENAPI_PATH_PLACEHOLDER: &str = "/api/v1";

fn transform_openapi_paths(spec: &mut utoipa::openapi::OpenApi, api_prefix: &str) {
    let replacement = api_prefix.trim_end_matches('/');
    if OPENAPI_PATH_PLACEHOLDER == replacement {
        return;
    }
    let path_map = std::mem::take(&mut spec.paths.paths);
    for (key, item) in path_map {
        let new_key = key.replacen(OPENAPI_PATH_PLACEHOLDER, replacement, 1);
        spec.paths.paths.insert(new_key, item);
    }
}

/// Returns the OpenAPI spec with paths under `api_prefix`.
pub fn get_openapi_spec(api_prefix: &str) -> utoipa::openapi::OpenApi {
    let mut spec = ApiDoc::openapi();
    transform_openapi_paths(&mut spec, api_prefix);
    spec
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SheetFlow API",
        version = "0.1.0",
        description = "Spreadsheet upload service. Upload a .csv, .tsv, .xls, .xlsx or .ods file with an email address, receive a task ID by email, and poll its status while a background worker counts the data rows."
    ),
    paths(
        handlers::upload::upload_spreadsheet,
        handlers::status::get_task_status,
        handlers::root::root,
        handlers::root::health,
    ),
    components(schemas(
        models::UploadResponse,
        models::StatusResponse,
        models::TaskStatus,
        models::ProcessingResult,
        models::RootResponse,
        models::HealthResponse,
        error::ErrorResponse,
    )),
    tags(
        (name = "spreadsheets", description = "Upload and task status"),
        (name = "meta", description = "Service banner and liveness")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefix_is_kept() {
        let spec = get_openapi_spec("/api/v1");
        assert!(spec.paths.paths.contains_key("/api/v1/upload"));
        assert!(spec.paths.paths.contains_key("/api/v1/status/{task_id}"));
        assert!(spec.paths.paths.contains_key("/health"));
    }

    #[test]
    fn custom_prefix_rewrites_api_paths_only() {
        let spec = get_openapi_spec("/sheets/");
        assert!(spec.paths.paths.contains_key("/sheets/upload"));
        assert!(!spec.paths.paths.contains_key("/api/v1/upload"));
        assert!(spec.paths.paths.contains_key("/"));
    }
}
