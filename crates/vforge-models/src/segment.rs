//! Video segments used by merge and complete requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::request::{require_path, RequestError};

/// A video file with an optional trim window (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSegment {
    /// Path of the input file
    pub file_path: String,
    /// Trim start in seconds
    #[serde(default)]
    pub start_time: f64,
    /// Trim end in seconds; `<= 0` means "to the end of the input"
    #[serde(default)]
    pub end_time: f64,
}

impl VideoSegment {
    /// Create a trimmed segment.
    pub fn new(file_path: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            file_path: file_path.into(),
            start_time,
            end_time,
        }
    }

    /// Create a segment covering the whole input.
    pub fn whole(file_path: impl Into<String>) -> Self {
        Self::new(file_path, 0.0, 0.0)
    }

    /// Upper trim bound, `None` when unbounded.
    pub fn end_bound(&self) -> Option<f64> {
        (self.end_time > 0.0).then_some(self.end_time)
    }

    /// Whether any trimming is applied.
    pub fn is_trimmed(&self) -> bool {
        self.start_time > 0.0 || self.end_bound().is_some()
    }

    pub(crate) fn validate(&self, field: &str) -> Result<(), RequestError> {
        require_path(&self.file_path, &format!("{field}.file_path"))?;
        if self.start_time < 0.0 {
            return Err(RequestError::invalid_value(
                format!("{field}.start_time"),
                "must not be negative",
            ));
        }
        if let Some(end) = self.end_bound() {
            if end <= self.start_time {
                return Err(RequestError::invalid_value(
                    format!("{field}.end_time"),
                    "must be greater than start_time",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_bound() {
        assert_eq!(VideoSegment::new("a.mp4", 0.0, 10.0).end_bound(), Some(10.0));
        assert_eq!(VideoSegment::new("a.mp4", 5.0, 0.0).end_bound(), None);
        assert_eq!(VideoSegment::new("a.mp4", 5.0, -1.0).end_bound(), None);
    }

    #[test]
    fn test_is_trimmed() {
        assert!(!VideoSegment::whole("a.mp4").is_trimmed());
        assert!(VideoSegment::new("a.mp4", 2.0, 0.0).is_trimmed());
        assert!(VideoSegment::new("a.mp4", 0.0, 4.0).is_trimmed());
    }

    #[test]
    fn test_validate() {
        assert!(VideoSegment::new("a.mp4", 0.0, 10.0).validate("segments[0]").is_ok());
        assert!(VideoSegment::new("", 0.0, 10.0).validate("segments[0]").is_err());
        assert!(VideoSegment::new("a.mp4", 10.0, 5.0).validate("segments[0]").is_err());
        assert!(VideoSegment::new("a.mp4", -1.0, 0.0).validate("segments[0]").is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let seg: VideoSegment = serde_json::from_str(r#"{"file_path": "/uploads/a.mp4"}"#).unwrap();
        assert_eq!(seg, VideoSegment::whole("/uploads/a.mp4"));
    }
}
