//! Background audio configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::request::{require_path, RequestError};

/// Default music volume when not specified.
pub const DEFAULT_VOLUME: f64 = 1.0;

fn default_volume() -> f64 {
    DEFAULT_VOLUME
}

/// Background music mixed under the video's own audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioConfig {
    /// Path of the music file
    pub file_path: String,
    /// Volume multiplier (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Trim start of the music track (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    /// Trim end of the music track (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Fade-in duration (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<f64>,
    /// Fade-out duration (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<f64>,
}

impl AudioConfig {
    /// Create an untrimmed track at the given volume.
    pub fn new(file_path: impl Into<String>, volume: f64) -> Self {
        Self {
            file_path: file_path.into(),
            volume,
            start_time: None,
            end_time: None,
            fade_in: None,
            fade_out: None,
        }
    }

    /// Trim the track to `[start, end)`.
    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Set fade durations.
    pub fn with_fades(mut self, fade_in: Option<f64>, fade_out: Option<f64>) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    /// Whether a trim is applied to the track.
    pub fn is_trimmed(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }

    /// Length of the trimmed track, known only when an end is given.
    pub fn trimmed_length(&self) -> Option<f64> {
        self.end_time
            .map(|end| end - self.start_time.unwrap_or(0.0))
    }

    pub(crate) fn validate(&self, field: &str) -> Result<(), RequestError> {
        require_path(&self.file_path, &format!("{field}.file_path"))?;

        if !(0.0..=1.0).contains(&self.volume) {
            return Err(RequestError::invalid_value(
                format!("{field}.volume"),
                "must be between 0.0 and 1.0",
            ));
        }

        for (name, value) in [
            ("start_time", self.start_time),
            ("fade_in", self.fade_in),
            ("fade_out", self.fade_out),
        ] {
            if matches!(value, Some(v) if v < 0.0) {
                return Err(RequestError::invalid_value(
                    format!("{field}.{name}"),
                    "must not be negative",
                ));
            }
        }

        if let Some(len) = self.trimmed_length() {
            if len <= 0.0 {
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
    fn test_trimmed_length() {
        assert_eq!(AudioConfig::new("m.mp3", 0.3).trimmed_length(), None);
        assert_eq!(
            AudioConfig::new("m.mp3", 0.3).with_window(5.0, 35.0).trimmed_length(),
            Some(30.0)
        );

        let mut end_only = AudioConfig::new("m.mp3", 0.3);
        end_only.end_time = Some(20.0);
        assert_eq!(end_only.trimmed_length(), Some(20.0));
    }

    #[test]
    fn test_volume_bounds() {
        assert!(AudioConfig::new("m.mp3", 0.0).validate("audio").is_ok());
        assert!(AudioConfig::new("m.mp3", 1.0).validate("audio").is_ok());
        assert!(AudioConfig::new("m.mp3", 1.5).validate("audio").is_err());
        assert!(AudioConfig::new("m.mp3", -0.1).validate("audio").is_err());
    }

    #[test]
    fn test_default_volume() {
        let audio: AudioConfig = serde_json::from_str(r#"{"file_path": "m.mp3"}"#).unwrap();
        assert_eq!(audio.volume, DEFAULT_VOLUME);
    }
}
