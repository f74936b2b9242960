use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{JobId, JobType};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid storage root {path}: {reason}")]
    InvalidStorageRoot { path: PathBuf, reason: String },

    #[error("invalid queue config: {0}")]
    InvalidConfig(String),

    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("unknown job type: {0}")]
    UnknownJobType(JobType),

    #[error("unknown dependency: {0}")]
    UnknownDependency(JobId),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job already exists: {0}")]
    DuplicateId(JobId),

    /// The job was claimed or canceled by someone else first.
    #[error("job {0} is not queued")]
    NotQueued(JobId),

    #[error("job {0} has not been started")]
    NotRunning(JobId),

    #[error("job {0} is already finished")]
    AlreadyFinished(JobId),

    #[error("no job types requested")]
    NoJobTypes,

    #[error("handler already registered for job type: {0}")]
    DuplicateHandler(JobType),

    #[error("dequeue canceled")]
    Canceled,

    #[error("corrupt job record {path}: {source}")]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
