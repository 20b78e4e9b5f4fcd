//! SheetFlow Storage Library
//!
//! Durable storage for uploaded spreadsheets, consumed by the upload handler
//! (write) and the background worker (read, optional delete).
//!
//! # Storage key format
//!
//! Keys are flat: `{task_id}_{filename}`. The task identifier prefix keeps
//! identically named concurrent uploads apart. Keys must not contain path
//! separators, `..`, or NUL. Key generation is centralized in the `keys` module.

pub(crate) mod keys;
pub mod local;
pub mod traits;

pub use local::LocalStorage;
pub use traits::{StorageError, StorageResult, StoredFile, UploadStorage};
