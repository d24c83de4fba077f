//! Bounded-concurrency execution of FFmpeg.
//!
//! The [`ExecutionGate`] owns a fixed number of slots. Each invocation holds
//! an owned permit for as long as the engine runs, so at most `capacity`
//! processes exist at any time regardless of how many jobs are in flight.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge, histogram};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Default number of concurrent FFmpeg invocations.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// How long a killed process gets to close its output pipes.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Extra time a runner gets past the deadline before the gate gives up on it.
const RUNNER_GRACE: Duration = Duration::from_secs(5);

/// Deadline and cancellation signal carried by every job.
#[derive(Debug, Clone)]
pub struct JobContext {
    deadline: Instant,
    timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
}

impl JobContext {
    /// Context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            timeout,
            cancel: None,
        }
    }

    /// Attach a cancellation signal; the job is cancelled once it reads `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves when cancellation is signalled; never resolves without a signal.
    pub async fn cancelled(&self) {
        let Some(mut rx) = self.cancel.clone() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Timeout error for this context, with whatever stderr was captured.
    pub fn timeout_error(&self, stderr: Option<String>) -> MediaError {
        MediaError::timeout(self.timeout, stderr)
    }
}

/// Captured output of a finished engine process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs the engine with a prepared argument vector.
///
/// Implementations honour the context: on cancellation they stop the process
/// and return `Cancelled`; at the deadline they stop it and return `Timeout`
/// with the stderr produced so far.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, ctx: &JobContext, args: &[String]) -> MediaResult<ProcessOutput>;
}

/// A child pipe drained in the background, so output survives a kill.
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        });
        Self { buffer, task }
    }

    /// Wait up to `grace` for the pipe to close, then take what was read.
    async fn finish(self, grace: Duration) -> String {
        if tokio::time::timeout(grace, self.task).await.is_err() {
            debug!("Pipe still open after grace period, using partial output");
        }
        let bytes = self.buffer.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

enum Exit {
    Finished(ExitStatus),
    Cancelled,
    TimedOut,
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill FFmpeg: {}", e);
    }
}

/// Spawns the real FFmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegProcess {
    binary: String,
}

impl FfmpegProcess {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for FfmpegProcess {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl ProcessRunner for FfmpegProcess {
    async fn run(&self, ctx: &JobContext, args: &[String]) -> MediaResult<ProcessOutput> {
        debug!("Running FFmpeg: {} {}", self.binary, args.join(" "));

        // The child is also killed if this future is dropped
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound(self.binary.clone()),
                _ => MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None),
            })?;

        let stdout = PipeCapture::spawn(child.stdout.take());
        let stderr = PipeCapture::spawn(child.stderr.take());

        let exit = tokio::select! {
            biased;
            _ = ctx.cancelled() => Exit::Cancelled,
            _ = tokio::time::sleep_until(ctx.deadline()) => Exit::TimedOut,
            status = child.wait() => Exit::Finished(status?),
        };

        let status = match exit {
            Exit::Finished(status) => status,
            Exit::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                kill(&mut child).await;
                return Err(MediaError::Cancelled);
            }
            Exit::TimedOut => {
                warn!(
                    timeout_ms = ctx.timeout().as_millis() as u64,
                    "FFmpeg timed out, killing process"
                );
                kill(&mut child).await;
                let stderr = stderr.finish(PIPE_DRAIN_GRACE).await;
                return Err(ctx.timeout_error(Some(stderr).filter(|s| !s.is_empty())));
            }
        };

        let stdout = stdout.finish(PIPE_DRAIN_GRACE).await;
        let stderr = stderr.finish(PIPE_DRAIN_GRACE).await;

        if !stdout.is_empty() {
            debug!(stdout = %stdout, "FFmpeg stdout");
        }

        if status.success() {
            Ok(ProcessOutput { stdout, stderr })
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with status {}", status),
                Some(stderr),
                status.code(),
            ))
        }
    }
}

/// Admission gate around the engine.
#[derive(Clone)]
pub struct ExecutionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for ExecutionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGate")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl ExecutionGate {
    /// Create a gate with `capacity` slots (at least one).
    pub fn new(capacity: usize, runner: Arc<dyn ProcessRunner>) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            runner,
        }
    }

    /// Gate spawning the given FFmpeg binary.
    pub fn ffmpeg(binary: impl Into<String>, capacity: usize) -> Self {
        Self::new(capacity, Arc::new(FfmpegProcess::new(binary)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Run `command` once a slot is free.
    ///
    /// Waiting for a slot and running the process both count against the
    /// context deadline.
    pub async fn run(&self, ctx: &JobContext, command: &FfmpegCommand) -> MediaResult<ProcessOutput> {
        if ctx.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let permit = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(MediaError::Cancelled),
            acquired = tokio::time::timeout_at(ctx.deadline(), self.semaphore.clone().acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(MediaError::GateClosed),
                    Err(_) => {
                        warn!(timeout_ms = ctx.timeout().as_millis() as u64, "Timed out waiting for an FFmpeg slot");
                        return Err(ctx.timeout_error(None));
                    }
                }
            }
        };

        gauge!("vforge_ffmpeg_in_flight").set(self.in_flight() as f64);
        counter!("vforge_ffmpeg_invocations_total").increment(1);
        let started = Instant::now();

        let args = command.build_args();
        info!(
            output = %command.output().display(),
            in_flight = self.in_flight(),
            capacity = self.capacity,
            "Executing FFmpeg command"
        );

        // The runner enforces the deadline itself; this only bounds a runner
        // that fails to.
        let result = match tokio::time::timeout_at(
            ctx.deadline() + RUNNER_GRACE,
            self.runner.run(ctx, &args),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("FFmpeg runner ignored its deadline, dropping it");
                Err(ctx.timeout_error(None))
            }
        };

        histogram!("vforge_ffmpeg_duration_seconds").record(started.elapsed().as_secs_f64());
        drop(permit);
        gauge!("vforge_ffmpeg_in_flight").set(self.in_flight() as f64);

        result
    }
}
