//! Application state.

use std::sync::Arc;

use tracing::{info, warn};
use vforge_jobs::{JobStore, JobsConfig, Orchestrator, WebhookNotifier};
use vforge_media::{check_ffmpeg, ExecutionGate, Pipeline};
use vforge_storage::S3Uploader;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs_config: Arc<JobsConfig>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Create new application state.
    ///
    /// Creates the working directories, reloads persisted jobs and connects
    /// object storage when it is configured.
    pub async fn new(config: ApiConfig, jobs_config: JobsConfig) -> anyhow::Result<Self> {
        jobs_config.ensure_dirs().await?;

        match check_ffmpeg(&jobs_config.ffmpeg_binary) {
            Ok(path) => info!("Using FFmpeg at {}", path.display()),
            Err(e) => warn!("{}; jobs will fail until it is installed", e),
        }

        let store = Arc::new(JobStore::open(&jobs_config.jobs_dir).await?);
        let gate = ExecutionGate::ffmpeg(
            jobs_config.ffmpeg_binary.clone(),
            jobs_config.max_concurrent_jobs,
        );
        let notifier = WebhookNotifier::new(jobs_config.webhook_timeout)?;

        let mut orchestrator = Orchestrator::new(store, Pipeline::new(gate), &jobs_config)
            .with_notifier(Arc::new(notifier));

        match S3Uploader::from_env()? {
            Some(uploader) => {
                if let Err(e) = uploader.ensure_bucket().await {
                    warn!("Failed to ensure bucket {}: {}", uploader.config().bucket, e);
                }
                info!(
                    endpoint = %uploader.config().endpoint,
                    bucket = %uploader.config().bucket,
                    "Object storage enabled"
                );
                orchestrator = orchestrator.with_uploader(Arc::new(uploader));
            }
            None => warn!("Object storage not configured, combine jobs are disabled"),
        }

        Ok(Self::from_parts(config, jobs_config, orchestrator))
    }

    /// Assemble state from already-built components.
    pub fn from_parts(config: ApiConfig, jobs_config: JobsConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            jobs_config: Arc::new(jobs_config),
            orchestrator: Arc::new(orchestrator),
        }
    }
}
