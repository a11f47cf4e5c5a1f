//! Error types for the job engine.

use std::time::Duration;

use crate::registry::Violation;

/// Errors surfaced to `run_job` callers.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("job '{name}' is not registered")]
    JobNotFound { name: String },

    #[error("invalid payload for job '{name}'")]
    JobValidation {
        name: String,
        violations: Vec<Violation>,
    },

    #[error("job '{id}' failed: {reason}")]
    JobFailed { id: String, reason: String },

    #[error("job '{id}' timed out after {timeout:?}")]
    Timeout { id: String, timeout: Duration },

    #[error("worker running job '{id}' exited unexpectedly")]
    WorkerCrashed { id: String },

    #[error("dispatch queue is full ({limit} requests waiting)")]
    QueueFull { limit: usize },

    #[error("worker host is shutting down")]
    ShuttingDown,
}

/// Registration errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job '{name}' is already registered")]
    DuplicateJob { name: String },
}
