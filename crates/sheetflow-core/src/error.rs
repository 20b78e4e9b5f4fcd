//! Error types module
//!
//! `AppError` is the single error type surfaced by request handlers. Each variant
//! self-describes its HTTP status, log level and the message a client is allowed
//! to see through [`ErrorMetadata`].

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for client mistakes worth noticing (oversized uploads)
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The upload failed a file-type check. The message is shown verbatim.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    /// Malformed request shape (missing form field, invalid email).
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// Persisting the upload failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Handing the task to the broker failed.
    #[error("Enqueue error: {0}")]
    Enqueue(String),

    /// The confirmation message could not be delivered.
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::UnprocessableEntity(format!("Validation error: {}", err))
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::UnprocessableEntity(_) => "UnprocessableEntity",
            AppError::Storage(_) => "Storage",
            AppError::Enqueue(_) => "Enqueue",
            AppError::Delivery(_) => "Delivery",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::PayloadTooLarge(_) => 413,
            AppError::UnprocessableEntity(_) => 422,
            AppError::Storage(_)
            | AppError::Enqueue(_)
            | AppError::Delivery(_)
            | AppError::InternalWithSource { .. } => 500,
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            AppError::Validation(_) | AppError::UnprocessableEntity(_) => LogLevel::Debug,
            AppError::PayloadTooLarge(_) => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::UnprocessableEntity(ref msg) => msg.clone(),
            AppError::Storage(_) => "Failed to save uploaded file.".to_string(),
            AppError::Enqueue(_) => "Failed to enqueue processing task.".to_string(),
            AppError::Delivery(_) => "Failed to send confirmation email.".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}
