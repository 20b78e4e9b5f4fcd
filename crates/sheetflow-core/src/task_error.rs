//! Task execution error and outcome types
//!
//! Handlers report how an execution ended through [`TaskOutcome`]. The queue runtime
//! evaluates the outcome against the task's retry budget; handlers never schedule
//! retries themselves.

use std::fmt;

/// Task execution error that can be either recoverable or unrecoverable
#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// Create a new unrecoverable task error
    ///
    /// Unrecoverable errors fail the task immediately without retrying.
    /// Use this for payloads that cannot be decoded or reference nothing usable.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Create a new recoverable task error
    ///
    /// Recoverable errors are retried according to the task's retry policy.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    /// Default conversion from anyhow::Error creates a recoverable error
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Extension trait for Result to easily create unrecoverable task errors
pub trait TaskResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(|e| TaskError::unrecoverable(e.into()))
    }
}

/// How a single task execution ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Work finished; the value becomes the task result.
    Success(serde_json::Value),
    /// Work failed but may succeed on a later attempt.
    RetryableFailure(anyhow::Error),
    /// Work failed and must not be attempted again.
    TerminalFailure(anyhow::Error),
}

impl TaskOutcome {
    /// Classify a handler result. Errors carrying an unrecoverable [`TaskError`]
    /// anywhere in their chain are terminal; everything else is retryable.
    pub fn from_result(result: Result<serde_json::Value, anyhow::Error>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Success(value),
            Err(err) => {
                let unrecoverable = err
                    .chain()
                    .filter_map(|cause| cause.downcast_ref::<TaskError>())
                    .any(|task_err| !task_err.is_recoverable());
                if unrecoverable {
                    TaskOutcome::TerminalFailure(err)
                } else {
                    TaskOutcome::RetryableFailure(err)
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    /// Error text recorded as the task's last error, if this was a failure.
    pub fn error_message(&self) -> Option<String> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::RetryableFailure(err) | TaskOutcome::TerminalFailure(err) => {
                Some(format!("{:#}", err))
            }
        }
    }
}
