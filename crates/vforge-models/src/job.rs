//! Job entity and its state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::job_status::JobStatus;
use crate::webhook::WebhookTarget;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Rejected state machine move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job is already {0}")]
    AlreadyTerminal(JobStatus),

    #[error("Progress cannot go back from {from} to {to}")]
    ProgressRegression { from: u8, to: u8 },
}

/// A processing job.
///
/// Fields are public for serialization; mutate through the transition
/// methods so the status/output/error invariants hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Heartbeat progress (0-100)
    pub progress: u8,
    /// Local output file, set only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Object storage URL of the output, if it was uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,
    /// Error message, set only when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Where to deliver the terminal notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookTarget>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job was last modified
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job with a fresh ID.
    pub fn new() -> Self {
        Self::with_id(JobId::new())
    }

    /// Create a new pending job with the given ID.
    pub fn with_id(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            output_path: None,
            s3_url: None,
            error: None,
            webhook: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a webhook target.
    pub fn with_webhook(mut self, webhook: Option<WebhookTarget>) -> Self {
        self.webhook = webhook;
        self
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move from Pending to Processing.
    pub fn start_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.touch();
        Ok(())
    }

    /// Record a progress checkpoint.
    ///
    /// Values are capped at 100 and lower values than the current one are
    /// ignored, so progress never goes backward.
    pub fn set_progress(&mut self, progress: u8) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.status));
        }
        let progress = progress.min(100);
        if progress > self.progress {
            self.progress = progress;
            self.touch();
        }
        Ok(())
    }

    /// Record the object storage URL of the output.
    pub fn set_s3_url(&mut self, url: impl Into<String>) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.status));
        }
        self.s3_url = Some(url.into());
        self.touch();
        Ok(())
    }

    /// Mark the job completed with its output path.
    pub fn complete(&mut self, output_path: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.output_path = Some(output_path.into());
        self.error = None;
        self.touch();
        Ok(())
    }

    /// Mark the job failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.output_path = None;
        self.touch();
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.status));
        }
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_uuid() {
        let id = JobId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(id, JobId::new());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::new();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);

        job.start_processing().unwrap();
        job.set_progress(10).unwrap();
        job.set_progress(30).unwrap();
        job.complete("/outputs/a.mp4").unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_path.as_deref(), Some("/outputs/a.mp4"));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = Job::new();
        job.start_processing().unwrap();
        job.set_progress(30).unwrap();
        job.set_progress(10).unwrap();
        assert_eq!(job.progress, 30);

        job.set_progress(250).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = Job::new();
        job.start_processing().unwrap();
        job.fail("boom").unwrap();

        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.output_path.is_none());
        assert_eq!(
            job.complete("/out.mp4"),
            Err(TransitionError::AlreadyTerminal(JobStatus::Failed))
        );
        assert!(job.set_progress(50).is_err());
        assert!(job.start_processing().is_err());
    }

    #[test]
    fn test_cannot_complete_from_pending() {
        let mut job = Job::new();
        let err = job.complete("/out.mp4").unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed
            }
        );
        assert!(job.output_path.is_none());
    }

    #[test]
    fn test_pending_job_can_fail() {
        let mut job = Job::new();
        job.fail("inputs missing").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }
}
