//! Test helpers: build AppState and router for integration tests.
//!
//! The app runs against the in-memory task store with an embedded worker, a
//! temporary upload directory and a notifier that records instead of sending.
//! Run: `cargo test -p sheetflow-api`.

#![allow(dead_code)]

pub mod fixtures;

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::Value;
use sheetflow_api::setup::{routes, services};
use sheetflow_api::{AppState, DeliveryError, Notifier};
use sheetflow_core::{Config, QueueBackend, WorkerMode};
use sheetflow_db::{InMemoryTaskStore, TaskStore};
use sheetflow_storage::{LocalStorage, UploadStorage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const API_PREFIX: &str = "/api/v1";
pub const TEST_EMAIL: &str = "user@example.com";

pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

/// One recorded confirmation email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub recipient: String,
    pub filename: String,
    pub task_id: String,
}

/// Notifier that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentEmail>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_task_email(
        &self,
        recipient: &str,
        filename: &str,
        task_id: &str,
    ) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected {
                status: 401,
                body: "Key not found".to_string(),
            });
        }
        self.sent.lock().unwrap().push(SentEmail {
            recipient: recipient.to_string(),
            filename: filename.to_string(),
            task_id: task_id.to_string(),
        });
        Ok(())
    }
}

/// Test application: server, shared state and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryTaskStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn upload_dir(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Names of the files currently in the upload directory.
    pub fn stored_files(&self) -> Vec<String> {
        std::fs::read_dir(self._temp_dir.path())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Poll the upload directory until it holds `count` files or the deadline passes.
    pub async fn wait_for_stored_count(&self, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let files = self.stored_files();
            if files.len() == count || tokio::time::Instant::now() >= deadline {
                return files;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Poll the status endpoint until the task reaches `status` or the deadline passes.
    pub async fn wait_for_status(&self, task_id: &str, status: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let body: Value = self
                .server
                .get(&api_path(&format!("/status/{}", task_id)))
                .await
                .json();
            if body["status"] == status || tokio::time::Instant::now() >= deadline {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

pub fn create_test_config(upload_dir: &std::path::Path) -> Config {
    Config {
        app_name: "SheetFlow Test".to_string(),
        environment: "test".to_string(),
        api_prefix: API_PREFIX.to_string(),
        queue_backend: QueueBackend::Memory,
        worker_mode: WorkerMode::Embedded,
        upload_dir: upload_dir.to_string_lossy().into_owned(),
        max_upload_size_bytes: 1024 * 1024,
        sender_email: "noreply@example.com".to_string(),
        brevo_api_key: Some("test-key".to_string()),
        task_queue_poll_interval_ms: 20,
        task_retry_delay_secs: 0,
        stale_task_reap_interval_secs: 0,
        ..Config::default()
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(RecordingNotifier::default(), |_| {}).await
}

/// Setup a test app with a custom notifier and config tweaks.
pub async fn setup_test_app_with(
    notifier: RecordingNotifier,
    configure: impl FnOnce(&mut Config),
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut config = create_test_config(temp_dir.path());
    configure(&mut config);

    let storage: Arc<dyn UploadStorage> = Arc::new(
        LocalStorage::new(temp_dir.path())
            .await
            .expect("Failed to create local storage"),
    );
    let store = Arc::new(InMemoryTaskStore::new());
    let notifier = Arc::new(notifier);

    let state = services::build_state(
        &config,
        storage,
        store.clone() as Arc<dyn TaskStore>,
        notifier.clone() as Arc<dyn Notifier>,
        None,
    );

    let app = routes::setup_routes(&config, state.clone()).expect("Failed to setup routes");
    let server = TestServer::new(app).expect("Failed to create test server");

    TestApp {
        server,
        state,
        store,
        notifier,
        _temp_dir: temp_dir,
    }
}
