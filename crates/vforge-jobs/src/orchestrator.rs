//! Job orchestration.
//!
//! Accepts validated requests, records them as pending jobs and runs each one
//! in its own task. The execution gate inside the pipeline is the only limit
//! on how many jobs make progress at once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};
use vforge_media::fs_utils::remove_quietly;
use vforge_media::{JobContext, Pipeline};
use vforge_models::{
    CombineRequest, CombineSource, Job, JobId, JobKind, JobStatus, ProcessingRequest,
    TransitionError, WebhookHeader, WebhookPayload, WebhookTarget,
};
use vforge_storage::{combined_object_key, ObjectUploader};

use crate::config::JobsConfig;
use crate::downloader::Downloader;
use crate::error::{JobsError, JobsResult};
use crate::logging::JobLogger;
use crate::notifier::NotificationSink;
use crate::store::JobStore;

/// Caller-supplied options that are not part of the processing request.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub webhook_url: Option<String>,
    pub webhook_header: Option<WebhookHeader>,
}

/// Returned to the caller when a job is accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Everything a job task needs. Cloned into each task.
#[derive(Clone)]
struct JobRunner {
    store: Arc<JobStore>,
    pipeline: Pipeline,
    downloader: Downloader,
    uploader: Option<Arc<dyn ObjectUploader>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    output_dir: PathBuf,
    temp_dir: PathBuf,
    job_timeout: Duration,
}

/// Creates jobs and drives them to a terminal state.
pub struct Orchestrator {
    runner: JobRunner,
    tasks: Mutex<JoinSet<()>>,
    accepting: AtomicBool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("gate", self.runner.pipeline.gate())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(store: Arc<JobStore>, pipeline: Pipeline, config: &JobsConfig) -> Self {
        Self {
            runner: JobRunner {
                store,
                pipeline,
                downloader: Downloader::new(&config.temp_dir),
                uploader: None,
                notifier: None,
                output_dir: config.output_dir.clone(),
                temp_dir: config.temp_dir.clone(),
                job_timeout: config.job_timeout,
            },
            tasks: Mutex::new(JoinSet::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Enable combine jobs by configuring object storage.
    pub fn with_uploader(mut self, uploader: Arc<dyn ObjectUploader>) -> Self {
        self.runner.uploader = Some(uploader);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.runner.notifier = Some(notifier);
        self
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.runner.downloader = downloader;
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.runner.store
    }

    pub fn has_uploader(&self) -> bool {
        self.runner.uploader.is_some()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Job tasks that have not finished yet.
    pub async fn active_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Validate a request, record it as pending and start processing it.
    ///
    /// Invalid requests never create a job.
    pub async fn submit(
        &self,
        request: ProcessingRequest,
        options: SubmitOptions,
    ) -> JobsResult<JobReceipt> {
        if !self.is_accepting() {
            return Err(JobsError::ShuttingDown);
        }
        request.validate()?;
        if request.kind() == JobKind::Combine && self.runner.uploader.is_none() {
            return Err(JobsError::StorageUnavailable);
        }

        let kind = request.kind();
        let job = Job::new().with_webhook(WebhookTarget::from_parts(
            options.webhook_url,
            options.webhook_header,
        ));
        let receipt = JobReceipt {
            job_id: job.id.clone(),
            status: job.status,
            message: "Job created successfully".to_string(),
            created_at: job.created_at,
        };

        let mut tasks = self.tasks.lock().await;
        // Shutdown may have started while we waited for the lock.
        if !self.is_accepting() {
            return Err(JobsError::ShuttingDown);
        }
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!("Job task panicked: {}", e);
            }
        }

        match self.runner.store.add(job).await {
            Ok(()) => {}
            Err(JobsError::Persistence(e)) => {
                error!(job_id = %receipt.job_id, "Failed to persist new job: {}", e);
            }
            Err(e) => return Err(e),
        }

        counter!("vforge_jobs_submitted_total", "kind" => kind.as_str()).increment(1);
        info!(job_id = %receipt.job_id, kind = %kind, "Job accepted");

        let runner = self.runner.clone();
        let id = receipt.job_id.clone();
        tasks.spawn(async move { runner.run(id, request).await });

        Ok(receipt)
    }

    /// Stop accepting jobs and wait for running ones.
    ///
    /// With a grace period, returns `false` if jobs were still running when it
    /// expired; they are left to finish on their own.
    pub async fn shutdown(&self, grace: Option<Duration>) -> bool {
        self.accepting.store(false, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;
        info!(active = tasks.len(), "Waiting for in-flight jobs");

        let drain = async {
            while let Some(finished) = tasks.join_next().await {
                if let Err(e) = finished {
                    error!("Job task panicked: {}", e);
                }
            }
        };

        match grace {
            Some(grace) => match tokio::time::timeout(grace, drain).await {
                Ok(()) => true,
                Err(_) => {
                    warn!(grace_secs = grace.as_secs(), "Shutdown grace period expired with jobs still running");
                    false
                }
            },
            None => {
                drain.await;
                true
            }
        }
    }
}

impl JobRunner {
    async fn run(self, id: JobId, request: ProcessingRequest) {
        let kind = request.kind();
        let logger = JobLogger::new(&id, kind);
        let span = logger.create_span();

        async move {
            logger.log_start("processing");
            gauge!("vforge_jobs_active").increment(1.0);
            let started = Instant::now();

            self.record(&id, |job| job.start_processing()).await;
            self.checkpoint(&id, &logger, 10).await;

            let ctx = JobContext::with_timeout(self.job_timeout);
            let output = self.output_dir.join(format!("{}.mp4", id));
            let result = match &request {
                ProcessingRequest::Combine(req) => {
                    self.combine(&ctx, &id, &logger, req, &output).await
                }
                other => {
                    self.checkpoint(&id, &logger, 30).await;
                    self.pipeline.run(&ctx, other, &output).await.map_err(JobsError::from)
                }
            };

            let finished = match result {
                Ok(()) => {
                    let output_path = output.to_string_lossy().into_owned();
                    counter!("vforge_jobs_completed_total", "kind" => kind.as_str()).increment(1);
                    logger.log_completion(&output_path);
                    self.record(&id, |job| job.complete(output_path)).await
                }
                Err(e) => {
                    let message = e.job_message();
                    counter!("vforge_jobs_failed_total", "kind" => kind.as_str()).increment(1);
                    logger.log_error(&message);
                    self.record(&id, |job| job.fail(message)).await
                }
            };

            histogram!("vforge_job_duration_seconds", "kind" => kind.as_str())
                .record(started.elapsed().as_secs_f64());
            gauge!("vforge_jobs_active").decrement(1.0);

            if let Some(job) = finished.filter(Job::is_terminal) {
                self.notify(&job);
            }
        }
        .instrument(span)
        .await
    }

    /// Download, concatenate and upload.
    async fn combine(
        &self,
        ctx: &JobContext,
        id: &JobId,
        logger: &JobLogger,
        request: &CombineRequest,
        output: &Path,
    ) -> JobsResult<()> {
        let uploader = self
            .uploader
            .clone()
            .ok_or(JobsError::StorageUnavailable)?;

        let sources = request.sources();
        let urls: Vec<_> = sources
            .iter()
            .filter_map(|s| match s {
                CombineSource::Remote(url) => Some(url.clone()),
                CombineSource::Local(_) => None,
            })
            .collect();

        self.checkpoint(id, logger, 20).await;
        let mut downloaded = self.downloader.download_all(&urls).await?.into_iter();
        self.checkpoint(id, logger, 40).await;

        let mut inputs = Vec::with_capacity(sources.len());
        for source in sources {
            let path = match source {
                CombineSource::Remote(_) => downloaded.next(),
                CombineSource::Local(path) => Some(path),
            };
            inputs.extend(path);
        }

        self.checkpoint(id, logger, 60).await;
        let result = self
            .concat_and_upload(ctx, id, logger, &inputs, output, uploader.as_ref())
            .await;

        for input in &inputs {
            if input.starts_with(&self.temp_dir) {
                remove_quietly(input).await;
            }
        }
        if result.is_err() {
            remove_quietly(output).await;
        }
        result
    }

    async fn concat_and_upload(
        &self,
        ctx: &JobContext,
        id: &JobId,
        logger: &JobLogger,
        inputs: &[PathBuf],
        output: &Path,
        uploader: &dyn ObjectUploader,
    ) -> JobsResult<()> {
        self.pipeline.concat(ctx, inputs, &self.temp_dir, output).await?;
        self.checkpoint(id, logger, 80).await;

        let key = combined_object_key(id.as_str(), output);
        let url = uploader.upload(output, &key).await?;
        logger.log_progress(90, &format!("uploaded to {}", url));
        self.record(id, |job| {
            job.set_s3_url(url)?;
            job.set_progress(90)
        })
        .await;
        Ok(())
    }

    async fn checkpoint(&self, id: &JobId, logger: &JobLogger, progress: u8) {
        if self.record(id, |job| job.set_progress(progress)).await.is_some() {
            logger.log_progress(progress, "checkpoint");
        }
    }

    /// Apply a transition to the stored job.
    ///
    /// Persistence failures are logged and the in-memory state is used.
    async fn record<F>(&self, id: &JobId, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        match self.store.modify(id, f).await {
            Ok(job) => Some(job),
            Err(JobsError::Persistence(e)) => {
                error!(job_id = %id, "Failed to persist job: {}", e);
                self.store.get(id).await
            }
            Err(e) => {
                warn!(job_id = %id, "Job update rejected: {}", e);
                None
            }
        }
    }

    fn notify(&self, job: &Job) {
        if let (Some(notifier), Some(target)) = (&self.notifier, &job.webhook) {
            notifier.notify(target.clone(), WebhookPayload::from_job(job));
        }
    }
}
