//! Error types for media operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Number of trailing stderr bytes kept in user-facing messages.
const STDERR_TAIL_BYTES: usize = 2048;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {secs} seconds")]
    Timeout { secs: f64, stderr: Option<String> },

    #[error("Execution gate closed")]
    GateClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a timeout error for a job limited to `timeout`.
    pub fn timeout(timeout: Duration, stderr: Option<String>) -> Self {
        Self::Timeout {
            secs: timeout.as_secs_f64(),
            stderr,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the engine ran and failed (non-zero exit, deadline, cancel).
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            MediaError::FfmpegFailed { .. } | MediaError::Timeout { .. } | MediaError::Cancelled
        )
    }

    /// Captured engine diagnostics, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::Timeout { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }

    /// Message suitable for a job record: the error plus the stderr tail.
    pub fn detailed_message(&self) -> String {
        match self.stderr().map(str::trim).filter(|s| !s.is_empty()) {
            Some(stderr) => format!("{}: {}", self, tail(stderr, STDERR_TAIL_BYTES)),
            None => self.to_string(),
        }
    }
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detailed_message_includes_stderr() {
        let err = MediaError::ffmpeg_failed(
            "FFmpeg exited with status 1",
            Some("input.mp4: No such file or directory\n".to_string()),
            Some(1),
        );
        assert_eq!(
            err.detailed_message(),
            "FFmpeg command failed: FFmpeg exited with status 1: input.mp4: No such file or directory"
        );
        assert!(err.is_execution_error());
    }

    #[test]
    fn test_detailed_message_without_stderr() {
        let err = MediaError::timeout(Duration::from_secs(30), None);
        assert_eq!(err.detailed_message(), "Operation timed out after 30 seconds");
    }

    #[test]
    fn test_sub_second_timeout_message() {
        let err = MediaError::timeout(Duration::from_millis(250), Some("frame=  12".to_string()));
        assert_eq!(
            err.detailed_message(),
            "Operation timed out after 0.25 seconds: frame=  12"
        );
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let s = "ééééé";
        let t = tail(s, 3);
        assert!(t.len() <= 4);
        assert!(s.ends_with(t));
    }
}
