//! Upload storage abstraction trait

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A persisted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Storage key handed to the worker in the job payload.
    pub key: String,
    /// Filesystem path of the stored bytes, for logging.
    pub path: String,
    pub original_filename: String,
}

/// Upload storage abstraction
///
/// The upload handler stores bytes under a task-scoped key; the worker reads
/// them back by key and may delete them once processing has succeeded.
#[async_trait]
pub trait UploadStorage: Send + Sync {
    /// Persist the bytes of one upload.
    async fn store(&self, task_id: Uuid, filename: &str, data: Bytes) -> StorageResult<StoredFile>;

    /// Read a stored upload by key.
    async fn read(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a stored upload. Deleting a missing key is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;
}
