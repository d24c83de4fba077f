//! Job service configuration.

use std::path::PathBuf;
use std::time::Duration;

use vforge_media::gate::DEFAULT_MAX_CONCURRENT;

/// Job service configuration.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// FFmpeg binary name or path
    pub ffmpeg_binary: String,
    /// Where uploaded files are stored
    pub upload_dir: PathBuf,
    /// Where job outputs are written
    pub output_dir: PathBuf,
    /// Scratch space for downloads and concat lists
    pub temp_dir: PathBuf,
    /// Where job records are persisted
    pub jobs_dir: PathBuf,
    /// Maximum concurrent FFmpeg processes
    pub max_concurrent_jobs: usize,
    /// Deadline for a single job
    pub job_timeout: Duration,
    /// Grace period for in-flight jobs on shutdown; `None` waits forever
    pub shutdown_timeout: Option<Duration>,
    /// Whether the retention sweeper runs
    pub cleanup_enabled: bool,
    /// Age after which files and jobs are deleted
    pub retention: Duration,
    /// Time between sweeps
    pub cleanup_interval: Duration,
    /// Timeout of a single webhook delivery
    pub webhook_timeout: Duration,
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            upload_dir: PathBuf::from("./uploads"),
            output_dir: PathBuf::from("./outputs"),
            temp_dir: PathBuf::from("./temp"),
            jobs_dir: PathBuf::from("./jobs"),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT,
            job_timeout: Duration::from_secs(3600), // 1 hour
            shutdown_timeout: None,
            cleanup_enabled: true,
            retention: Duration::from_secs(7 * SECS_PER_DAY),
            cleanup_interval: Duration::from_secs(SECS_PER_DAY),
            webhook_timeout: Duration::from_secs(10),
        }
    }
}

impl JobsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let path = |name: &str, default: &str| {
            PathBuf::from(std::env::var(name).unwrap_or_else(|_| default.to_string()))
        };

        Self {
            ffmpeg_binary: std::env::var("FFMPEG_BINARY").unwrap_or_else(|_| "ffmpeg".to_string()),
            upload_dir: path("UPLOAD_DIR", "./uploads"),
            output_dir: path("OUTPUT_DIR", "./outputs"),
            temp_dir: path("TEMP_DIR", "./temp"),
            jobs_dir: path("JOBS_DIR", "./jobs"),
            max_concurrent_jobs: std::env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
            job_timeout: Duration::from_secs(
                std::env::var("JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            shutdown_timeout: std::env::var("SHUTDOWN_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            cleanup_enabled: std::env::var("CLEANUP_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            retention: Duration::from_secs(
                std::env::var("CLEANUP_RETENTION_DAYS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(7)
                    * SECS_PER_DAY,
            ),
            cleanup_interval: Duration::from_secs(
                std::env::var("CLEANUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(SECS_PER_DAY),
            ),
            webhook_timeout: Duration::from_secs(
                std::env::var("WEBHOOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }

    /// Create every working directory.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.upload_dir, &self.output_dir, &self.temp_dir, &self.jobs_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Directories whose files the retention sweeper expires.
    pub fn swept_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.output_dir.clone(),
            self.upload_dir.clone(),
            self.temp_dir.clone(),
        ]
    }
}
