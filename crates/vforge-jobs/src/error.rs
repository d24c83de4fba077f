//! Job service error types.

use thiserror::Error;
use vforge_models::{JobId, RequestError, TransitionError};

pub type JobsResult<T> = Result<T, JobsError>;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("Invalid request: {0}")]
    Validation(#[from] RequestError),

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Object storage is not configured")]
    StorageUnavailable,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Media error: {0}")]
    Media(#[from] vforge_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vforge_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobsError {
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// Whether the error was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::StorageUnavailable | Self::NotFound(_)
        )
    }

    /// Message stored on a failed job.
    ///
    /// Engine failures carry the tail of FFmpeg's stderr.
    pub fn job_message(&self) -> String {
        match self {
            Self::Media(e) => e.detailed_message(),
            other => other.to_string(),
        }
    }
}
