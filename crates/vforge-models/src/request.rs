//! Processing requests accepted by the job service.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::audio::AudioConfig;
use crate::overlay::ImageOverlay;
use crate::segment::VideoSegment;

/// Minimum number of segments for a merge.
pub const MIN_MERGE_SEGMENTS: usize = 2;
/// Minimum number of segments for a complete pipeline.
pub const MIN_COMPLETE_SEGMENTS: usize = 1;
/// Minimum number of inputs for a combine job.
pub const MIN_COMBINE_INPUTS: usize = 2;
/// Maximum number of inputs for a combine job.
pub const MAX_COMBINE_INPUTS: usize = 10;

/// Result type for request validation.
pub type RequestResult<T> = Result<T, RequestError>;

/// A malformed or under-specified request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("At least {required} video segments required, got {actual}")]
    TooFewSegments { required: usize, actual: usize },

    #[error("At least {required} videos required, got {actual}")]
    TooFewInputs { required: usize, actual: usize },

    #[error("Maximum {max} videos allowed, got {actual}")]
    TooManyInputs { max: usize, actual: usize },

    #[error("{0} is required")]
    MissingField(String),

    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl RequestError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn require_path(path: &str, field: &str) -> RequestResult<()> {
    if path.trim().is_empty() {
        return Err(RequestError::missing_field(field));
    }
    Ok(())
}

/// Concatenate trimmed segments in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MergeRequest {
    pub segments: Vec<VideoSegment>,
}

/// Composite one image over a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayRequest {
    pub video_path: String,
    pub overlay: ImageOverlay,
}

/// How background music is combined with the video's own audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Mix the music under the original track
    #[default]
    Mix,
    /// Drop the original track and use the music only
    Replace,
}

/// Mix background music under a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioRequest {
    pub video_path: String,
    pub audio: AudioConfig,
    #[serde(default)]
    pub mode: AudioMode,
}

/// Merge, then overlay, then audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompleteRequest {
    pub segments: Vec<VideoSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<ImageOverlay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConfig>,
}

/// Concatenate whole files (local paths or HTTP(S) URLs) and upload the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CombineRequest {
    pub videos: Vec<String>,
}

/// Where a combine input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombineSource {
    Remote(Url),
    Local(PathBuf),
}

impl CombineRequest {
    /// Classify each input. Strings that parse as http(s) URLs are remote.
    pub fn sources(&self) -> Vec<CombineSource> {
        self.videos
            .iter()
            .map(|v| match Url::parse(v) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => CombineSource::Remote(url),
                _ => CombineSource::Local(PathBuf::from(v)),
            })
            .collect()
    }
}

/// Kind of processing a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Merge,
    Overlay,
    Audio,
    Complete,
    Combine,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Merge => "merge",
            JobKind::Overlay => "overlay",
            JobKind::Audio => "audio",
            JobKind::Complete => "complete",
            JobKind::Combine => "combine",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured processing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingRequest {
    Merge(MergeRequest),
    Overlay(OverlayRequest),
    Audio(AudioRequest),
    Complete(CompleteRequest),
    Combine(CombineRequest),
}

impl ProcessingRequest {
    /// The job kind for this request.
    pub fn kind(&self) -> JobKind {
        match self {
            ProcessingRequest::Merge(_) => JobKind::Merge,
            ProcessingRequest::Overlay(_) => JobKind::Overlay,
            ProcessingRequest::Audio(_) => JobKind::Audio,
            ProcessingRequest::Complete(_) => JobKind::Complete,
            ProcessingRequest::Combine(_) => JobKind::Combine,
        }
    }

    /// Validate the request.
    ///
    /// Checks segment/input counts and that every referenced file is named.
    /// File existence is checked later, when the job runs.
    pub fn validate(&self) -> RequestResult<()> {
        match self {
            ProcessingRequest::Merge(req) => {
                validate_segments(&req.segments, MIN_MERGE_SEGMENTS)
            }
            ProcessingRequest::Overlay(req) => {
                require_path(&req.video_path, "video_path")?;
                req.overlay.validate("overlay")
            }
            ProcessingRequest::Audio(req) => {
                require_path(&req.video_path, "video_path")?;
                req.audio.validate("audio")
            }
            ProcessingRequest::Complete(req) => {
                validate_segments(&req.segments, MIN_COMPLETE_SEGMENTS)?;
                for (i, overlay) in req.overlays.iter().enumerate() {
                    overlay.validate(&format!("overlays[{i}]"))?;
                }
                if let Some(audio) = &req.audio {
                    audio.validate("audio")?;
                }
                Ok(())
            }
            ProcessingRequest::Combine(req) => {
                let actual = req.videos.len();
                if actual < MIN_COMBINE_INPUTS {
                    return Err(RequestError::TooFewInputs {
                        required: MIN_COMBINE_INPUTS,
                        actual,
                    });
                }
                if actual > MAX_COMBINE_INPUTS {
                    return Err(RequestError::TooManyInputs {
                        max: MAX_COMBINE_INPUTS,
                        actual,
                    });
                }
                for (i, video) in req.videos.iter().enumerate() {
                    require_path(video, &format!("videos[{i}]"))?;
                }
                Ok(())
            }
        }
    }
}

fn validate_segments(segments: &[VideoSegment], required: usize) -> RequestResult<()> {
    if segments.len() < required {
        return Err(RequestError::TooFewSegments {
            required,
            actual: segments.len(),
        });
    }
    for (i, segment) in segments.iter().enumerate() {
        segment.validate(&format!("segments[{i}]"))?;
    }
    Ok(())
}
