//! Shared key generation for upload storage.

use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Build the storage key `{task_id}_{filename}`.
///
/// The client filename is kept verbatim; names that could escape the upload
/// directory are rejected.
pub fn generate_upload_key(task_id: Uuid, filename: &str) -> StorageResult<String> {
    validate_filename(filename)?;
    Ok(format!("{}_{}", task_id, filename))
}

pub fn validate_filename(filename: &str) -> StorageResult<()> {
    if filename.is_empty() {
        return Err(StorageError::InvalidKey("Filename is empty".to_string()));
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Filename contains a path separator".to_string(),
        ));
    }
    if filename == "." || filename == ".." {
        return Err(StorageError::InvalidKey(
            "Filename is a relative path component".to_string(),
        ));
    }
    if filename.contains('\0') {
        return Err(StorageError::InvalidKey(
            "Filename contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}
