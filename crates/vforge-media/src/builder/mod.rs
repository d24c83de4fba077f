//! Request to FFmpeg invocation translation.
//!
//! Every function here is pure: it turns a validated request into one or
//! more [`FfmpegCommand`]s without touching the filesystem.

mod audio;
mod concat;
mod merge;
mod overlay;

use std::fmt;
use std::path::{Path, PathBuf};

use vforge_models::{AudioMode, CompleteRequest, EncodingConfig, ProcessingRequest};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

pub use audio::build_audio;
pub use concat::{build_concat, build_copy, concat_list};
pub use merge::build_merge;
pub use overlay::build_overlay;

pub(crate) fn require_path(path: &str, field: &str) -> MediaResult<()> {
    if path.trim().is_empty() {
        return Err(MediaError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// What a stage does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Merge,
    Overlay,
    Audio,
    Copy,
    Concat,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageKind::Merge => "merge",
            StageKind::Overlay => "overlay",
            StageKind::Audio => "audio",
            StageKind::Copy => "copy",
            StageKind::Concat => "concat",
        };
        f.write_str(s)
    }
}

/// One FFmpeg invocation of a (possibly multi-stage) job.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub kind: StageKind,
    pub command: FfmpegCommand,
}

impl Stage {
    fn new(kind: StageKind, command: FfmpegCommand) -> Self {
        Self { kind, command }
    }
}

/// Build the single command for a merge, overlay or audio request.
pub fn build(
    request: &ProcessingRequest,
    output: &Path,
    encoding: &EncodingConfig,
) -> MediaResult<FfmpegCommand> {
    match request {
        ProcessingRequest::Merge(req) => build_merge(&req.segments, output, encoding),
        ProcessingRequest::Overlay(req) => build_overlay(
            &req.video_path,
            std::slice::from_ref(&req.overlay),
            output,
            encoding,
        ),
        ProcessingRequest::Audio(req) => {
            build_audio(&req.video_path, &req.audio, req.mode, output, encoding)
        }
        ProcessingRequest::Complete(_) | ProcessingRequest::Combine(_) => Err(
            MediaError::validation(format!("{} requests run in several stages", request.kind())),
        ),
    }
}

/// Plan the stages for a merge, overlay, audio or complete request.
///
/// Combine inputs must be resolved to local files first; see [`build_concat`].
pub fn plan(
    request: &ProcessingRequest,
    output: &Path,
    encoding: &EncodingConfig,
) -> MediaResult<Vec<Stage>> {
    let kind = match request {
        ProcessingRequest::Merge(_) => StageKind::Merge,
        ProcessingRequest::Overlay(_) => StageKind::Overlay,
        ProcessingRequest::Audio(_) => StageKind::Audio,
        ProcessingRequest::Complete(req) => return plan_complete(req, output, encoding),
        ProcessingRequest::Combine(_) => {
            return Err(MediaError::validation(
                "combine inputs must be resolved to local files before planning",
            ))
        }
    };
    Ok(vec![Stage::new(kind, build(request, output, encoding)?)])
}

/// Plan merge, then overlays, then audio (or a stream-copy pass).
///
/// A lone untrimmed segment skips the merge and feeds the next stage directly.
pub fn plan_complete(
    request: &CompleteRequest,
    output: &Path,
    encoding: &EncodingConfig,
) -> MediaResult<Vec<Stage>> {
    let first = request
        .segments
        .first()
        .ok_or_else(|| MediaError::validation("At least 1 video segment required"))?;

    let mut stages = Vec::new();
    let mut current = PathBuf::from(&first.file_path);
    require_path(&first.file_path, "segments[0].file_path")?;

    if request.segments.len() > 1 || first.is_trimmed() {
        let merged = intermediate_path(output, "merged");
        stages.push(Stage::new(
            StageKind::Merge,
            build_merge(&request.segments, &merged, encoding)?,
        ));
        current = merged;
    }

    if !request.overlays.is_empty() {
        let overlaid = intermediate_path(output, "overlay");
        stages.push(Stage::new(
            StageKind::Overlay,
            build_overlay(&current.to_string_lossy(), &request.overlays, &overlaid, encoding)?,
        ));
        current = overlaid;
    }

    let last = match &request.audio {
        Some(audio) => Stage::new(
            StageKind::Audio,
            build_audio(&current.to_string_lossy(), audio, AudioMode::Mix, output, encoding)?,
        ),
        None => Stage::new(StageKind::Copy, build_copy(&current, output)),
    };
    stages.push(last);

    Ok(stages)
}

/// `<output>.<tag>.mp4`, next to the final output.
pub fn intermediate_path(output: &Path, tag: &str) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(format!(".{tag}.mp4"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vforge_models::{AudioConfig, ImageOverlay, MergeRequest, VideoSegment};

    fn complete(
        segments: Vec<VideoSegment>,
        overlays: Vec<ImageOverlay>,
        audio: Option<AudioConfig>,
    ) -> Vec<Stage> {
        let req = CompleteRequest {
            segments,
            overlays,
            audio,
        };
        plan_complete(&req, Path::new("/out/job.mp4"), &EncodingConfig::default()).unwrap()
    }

    fn kinds(stages: &[Stage]) -> Vec<StageKind> {
        stages.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_intermediate_path() {
        assert_eq!(
            intermediate_path(Path::new("/out/job.mp4"), "merged"),
            PathBuf::from("/out/job.mp4.merged.mp4")
        );
    }

    #[test]
    fn test_complete_all_stages() {
        let stages = complete(
            vec![VideoSegment::new("a.mp4", 0.0, 10.0), VideoSegment::new("b.mp4", 0.0, 5.0)],
            vec![ImageOverlay::new("logo.png", 0.0, 5.0), ImageOverlay::new("badge.png", 5.0, 9.0)],
            Some(AudioConfig::new("music.mp3", 0.4)),
        );
        assert_eq!(kinds(&stages), vec![StageKind::Merge, StageKind::Overlay, StageKind::Audio]);

        assert_eq!(stages[0].command.output(), Path::new("/out/job.mp4.merged.mp4"));
        assert_eq!(stages[1].command.inputs()[0].path, PathBuf::from("/out/job.mp4.merged.mp4"));
        // both overlays in a single invocation
        assert_eq!(stages[1].command.inputs().len(), 3);
        assert_eq!(stages[1].command.output(), Path::new("/out/job.mp4.overlay.mp4"));
        assert_eq!(stages[2].command.inputs()[0].path, PathBuf::from("/out/job.mp4.overlay.mp4"));
        assert_eq!(stages[2].command.output(), Path::new("/out/job.mp4"));
    }

    #[test]
    fn test_complete_single_whole_segment_skips_merge() {
        let stages = complete(vec![VideoSegment::whole("a.mp4")], vec![], None);
        assert_eq!(kinds(&stages), vec![StageKind::Copy]);
        let args = stages[0].command.build_args();
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "a.mp4"));
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
    }

    #[test]
    fn test_complete_single_trimmed_segment_merges() {
        let stages = complete(
            vec![VideoSegment::new("a.mp4", 2.0, 8.0)],
            vec![],
            Some(AudioConfig::new("music.mp3", 0.4)),
        );
        assert_eq!(kinds(&stages), vec![StageKind::Merge, StageKind::Audio]);
        assert_eq!(stages[1].command.inputs()[0].path, PathBuf::from("/out/job.mp4.merged.mp4"));
    }

    #[test]
    fn test_build_rejects_multi_stage_requests() {
        let req = ProcessingRequest::Complete(CompleteRequest {
            segments: vec![VideoSegment::whole("a.mp4")],
            overlays: vec![],
            audio: None,
        });
        assert!(matches!(
            build(&req, Path::new("out.mp4"), &EncodingConfig::default()),
            Err(MediaError::Validation(_))
        ));
    }

    #[test]
    fn test_plan_single_stage() {
        let req = ProcessingRequest::Merge(MergeRequest {
            segments: vec![VideoSegment::new("a.mp4", 0.0, 10.0), VideoSegment::new("b.mp4", 5.0, 15.0)],
        });
        let stages = plan(&req, Path::new("out.mp4"), &EncodingConfig::default()).unwrap();
        assert_eq!(kinds(&stages), vec![StageKind::Merge]);
        assert_eq!(stages[0].command.output(), Path::new("out.mp4"));
    }
}
