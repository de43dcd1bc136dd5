//! Scheduler and storage error types.

use thiserror::Error;

use crate::job::JobId;

/// Failure of a single storage backend operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("backend not available: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job already running: {0}")]
    AlreadyRunning(JobId),

    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(#[from] StorageError),
}

/// A dispatched job could not be handed to its channel.
#[derive(Debug, Error)]
#[error("publish to channel '{channel}' failed: {reason}")]
pub struct PublishError {
    pub channel: String,
    pub reason: String,
}
