//! Staged execution of processing requests.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use vforge_models::{EncodingConfig, ProcessingRequest};

use crate::builder::{self, build_concat, Stage};
use crate::error::MediaResult;
use crate::fs_utils::{remove_quietly, validate_file, write_concat_list};
use crate::gate::{ExecutionGate, JobContext};

/// Runs requests through the execution gate, one stage at a time.
#[derive(Debug, Clone)]
pub struct Pipeline {
    gate: ExecutionGate,
    encoding: EncodingConfig,
}

impl Pipeline {
    pub fn new(gate: ExecutionGate) -> Self {
        Self {
            gate,
            encoding: EncodingConfig::default(),
        }
    }

    /// Override the output encoding.
    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Execute a merge, overlay, audio or complete request into `output`.
    ///
    /// Intermediate files are removed whatever the outcome; a partial
    /// output is removed on failure.
    pub async fn run(
        &self,
        ctx: &JobContext,
        request: &ProcessingRequest,
        output: &Path,
    ) -> MediaResult<()> {
        for path in input_files(request) {
            validate_file(&path).await?;
        }

        let stages = builder::plan(request, output, &self.encoding)?;
        self.run_stages(ctx, &stages, output).await
    }

    /// Concatenate local files in order into `output`.
    ///
    /// The demuxer list is written to `work_dir` and removed afterwards.
    pub async fn concat(
        &self,
        ctx: &JobContext,
        inputs: &[PathBuf],
        work_dir: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        for input in inputs {
            validate_file(input).await?;
        }

        let name = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let list = write_concat_list(work_dir, &name, inputs).await?;
        let stage = Stage {
            kind: builder::StageKind::Concat,
            command: build_concat(&list, output, &self.encoding),
        };

        let result = self.run_stages(ctx, std::slice::from_ref(&stage), output).await;
        remove_quietly(&list).await;
        result
    }

    async fn run_stages(&self, ctx: &JobContext, stages: &[Stage], output: &Path) -> MediaResult<()> {
        let total = stages.len();
        let mut result = Ok(());

        for (i, stage) in stages.iter().enumerate() {
            info!(
                stage = %stage.kind,
                step = i + 1,
                total,
                "Running processing stage"
            );
            if let Err(e) = self.gate.run(ctx, &stage.command).await {
                warn!(stage = %stage.kind, "Processing stage failed: {}", e);
                result = Err(e);
                break;
            }
        }

        for stage in stages {
            if stage.command.output() != output {
                remove_quietly(stage.command.output()).await;
            }
        }
        if result.is_err() {
            remove_quietly(output).await;
        }

        result
    }
}

/// Every local file a request reads.
fn input_files(request: &ProcessingRequest) -> Vec<PathBuf> {
    let mut files = Vec::new();
    match request {
        ProcessingRequest::Merge(req) => {
            files.extend(req.segments.iter().map(|s| PathBuf::from(&s.file_path)));
        }
        ProcessingRequest::Overlay(req) => {
            files.push(PathBuf::from(&req.video_path));
            files.push(PathBuf::from(&req.overlay.file_path));
        }
        ProcessingRequest::Audio(req) => {
            files.push(PathBuf::from(&req.video_path));
            files.push(PathBuf::from(&req.audio.file_path));
        }
        ProcessingRequest::Complete(req) => {
            files.extend(req.segments.iter().map(|s| PathBuf::from(&s.file_path)));
            files.extend(req.overlays.iter().map(|o| PathBuf::from(&o.file_path)));
            if let Some(audio) = &req.audio {
                files.push(PathBuf::from(&audio.file_path));
            }
        }
        ProcessingRequest::Combine(req) => {
            files.extend(req.videos.iter().map(PathBuf::from));
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use vforge_models::{
        AudioConfig, CompleteRequest, ImageOverlay, MergeRequest, VideoSegment,
    };

    use super::*;
    use crate::error::MediaError;
    use crate::gate::testing::FakeRunner;

    struct Fixture {
        dir: TempDir,
        runner: Arc<FakeRunner>,
        pipeline: Pipeline,
    }

    impl Fixture {
        fn new(runner: FakeRunner) -> Self {
            let runner = Arc::new(runner);
            let pipeline = Pipeline::new(ExecutionGate::new(2, runner.clone()));
            Self {
                dir: TempDir::new().unwrap(),
                runner,
                pipeline,
            }
        }

        fn file(&self, name: &str) -> String {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"media").unwrap();
            path.to_string_lossy().into_owned()
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("out.mp4")
        }
    }

    fn ctx() -> JobContext {
        JobContext::with_timeout(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_complete_removes_intermediates() {
        let fx = Fixture::new(FakeRunner::touching());
        let request = ProcessingRequest::Complete(CompleteRequest {
            segments: vec![
                VideoSegment::new(fx.file("a.mp4"), 0.0, 10.0),
                VideoSegment::new(fx.file("b.mp4"), 0.0, 5.0),
            ],
            overlays: vec![ImageOverlay::new(fx.file("logo.png"), 0.0, 3.0)],
            audio: Some(AudioConfig::new(fx.file("music.mp3"), 0.5)),
        });
        let output = fx.output();

        fx.pipeline.run(&ctx(), &request, &output).await.unwrap();

        assert_eq!(fx.runner.call_count(), 3);
        assert!(output.exists());
        assert!(!builder::intermediate_path(&output, "merged").exists());
        assert!(!builder::intermediate_path(&output, "overlay").exists());
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_running() {
        let fx = Fixture::new(FakeRunner::touching());
        let request = ProcessingRequest::Merge(MergeRequest {
            segments: vec![
                VideoSegment::new(fx.file("a.mp4"), 0.0, 10.0),
                VideoSegment::new(fx.dir.path().join("gone.mp4").to_string_lossy(), 0.0, 5.0),
            ],
        });

        let err = fx.pipeline.run(&ctx(), &request, &fx.output()).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert_eq!(fx.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_stops_stages() {
        let fx = Fixture::new(FakeRunner::failing("moov atom not found"));
        let request = ProcessingRequest::Complete(CompleteRequest {
            segments: vec![
                VideoSegment::new(fx.file("a.mp4"), 0.0, 10.0),
                VideoSegment::new(fx.file("b.mp4"), 0.0, 5.0),
            ],
            overlays: vec![],
            audio: None,
        });

        let err = fx.pipeline.run(&ctx(), &request, &fx.output()).await.unwrap_err();
        assert_eq!(fx.runner.call_count(), 1);
        assert!(err.detailed_message().contains("moov atom not found"));
    }

    #[tokio::test]
    async fn test_concat_writes_and_removes_list() {
        let fx = Fixture::new(FakeRunner::touching());
        let inputs = vec![PathBuf::from(fx.file("a.mp4")), PathBuf::from(fx.file("b.mp4"))];
        let work = fx.dir.path().join("work");
        let output = fx.output();

        fx.pipeline.concat(&ctx(), &inputs, &work, &output).await.unwrap();

        assert!(output.exists());
        assert!(!work.join("out_concat.txt").exists());
        let calls = fx.runner.calls.lock().unwrap();
        assert!(calls[0].iter().any(|a| a == "concat"));
    }
}
