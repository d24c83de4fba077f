//! Periodic retention sweeper.
//!
//! Deletes files older than the retention period from the working
//! directories and the jobs directory, then forgets jobs whose records are
//! equally old. Runs once at start and then on a fixed interval until stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use vforge_models::JobId;

use crate::config::JobsConfig;
use crate::store::JobStore;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_deleted: usize,
    pub jobs_deleted: usize,
}

/// Expires old outputs, uploads, temp files and jobs.
pub struct RetentionSweeper {
    store: Arc<JobStore>,
    dirs: Vec<PathBuf>,
    jobs_dir: PathBuf,
    retention: Duration,
    interval: Duration,
    enabled: bool,
}

impl RetentionSweeper {
    pub fn new(store: Arc<JobStore>, config: &JobsConfig) -> Self {
        Self {
            store,
            dirs: config.swept_dirs(),
            jobs_dir: config.jobs_dir.clone(),
            retention: config.retention,
            interval: config.cleanup_interval,
            enabled: config.cleanup_enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start sweeping in the background.
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        SweeperHandle { stop_tx, task }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        if !self.enabled {
            info!("Retention sweeper disabled");
            return;
        }

        info!(
            retention_days = self.retention.as_secs() / 86_400,
            interval_secs = self.interval.as_secs(),
            "Starting retention sweeper"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Retention sweep failed: {:#}", e);
                    }
                }
                _ = stop.changed() => {
                    info!("Retention sweeper stopped");
                    break;
                }
            }
        }
    }

    /// Run a single sweep.
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let started = Instant::now();
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut report = SweepReport::default();
        for dir in &self.dirs {
            match clean_directory(dir, cutoff).await {
                Ok(count) => report.files_deleted += count,
                Err(e) => warn!("Failed to clean {}: {:#}", dir.display(), e),
            }
        }

        // Records the store never loaded (malformed or orphaned temp files)
        // are only reachable through the directory itself.
        match clean_records(&self.jobs_dir, cutoff).await {
            Ok((count, ids)) => {
                report.files_deleted += count;
                for id in ids {
                    match self.store.delete(&id).await {
                        Ok(true) => report.jobs_deleted += 1,
                        Ok(false) => {}
                        Err(e) => warn!(job_id = %id, "Failed to delete expired job: {}", e),
                    }
                }
            }
            Err(e) => warn!("Failed to clean {}: {:#}", self.jobs_dir.display(), e),
        }

        for id in self.store.expired(DateTime::<Utc>::from(cutoff)).await {
            match self.store.delete(&id).await {
                Ok(true) => report.jobs_deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(job_id = %id, "Failed to delete expired job: {}", e),
            }
        }

        counter!("vforge_sweeper_files_deleted_total").increment(report.files_deleted as u64);
        counter!("vforge_sweeper_jobs_deleted_total").increment(report.jobs_deleted as u64);
        info!(
            files_deleted = report.files_deleted,
            jobs_deleted = report.jobs_deleted,
            duration_ms = started.elapsed().as_millis() as u64,
            "Retention sweep finished"
        );

        Ok(report)
    }
}

/// Stops a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Retention sweeper task failed: {}", e);
        }
    }
}

/// Delete regular files in `dir` modified before `cutoff`.
async fn clean_directory(dir: &Path, cutoff: SystemTime) -> anyhow::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut deleted = 0;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Failed to stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if meta.is_dir() || meta.modified()? >= cutoff {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted expired file {}", path.display());
                deleted += 1;
            }
            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
        }
    }

    Ok(deleted)
}

/// Delete `<id>.json` and `<id>.json.tmp` files in `dir` modified before
/// `cutoff`. Returns the number of files deleted and the ids of the deleted
/// `.json` records.
async fn clean_records(dir: &Path, cutoff: SystemTime) -> anyhow::Result<(usize, Vec<JobId>)> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, Vec::new())),
        Err(e) => return Err(e.into()),
    };

    let mut deleted = 0;
    let mut ids = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(record) = name.to_str().and_then(RecordFile::parse) else {
            continue;
        };
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Failed to stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !meta.is_file() || meta.modified()? >= cutoff {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                deleted += 1;
                match record {
                    RecordFile::Record(id) => {
                        debug!(job_id = id, "Deleted expired job record");
                        ids.push(JobId::from(id));
                    }
                    RecordFile::Partial(id) => {
                        debug!(job_id = id, "Deleted stale partial job record");
                    }
                }
            }
            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
        }
    }

    Ok((deleted, ids))
}

/// A file name in the jobs directory.
#[derive(Debug, PartialEq, Eq)]
enum RecordFile<'a> {
    Record(&'a str),
    Partial(&'a str),
}

impl<'a> RecordFile<'a> {
    fn parse(name: &'a str) -> Option<Self> {
        if let Some(id) = name.strip_suffix(".json.tmp") {
            return Some(Self::Partial(id)).filter(|_| !id.is_empty());
        }
        name.strip_suffix(".json")
            .filter(|id| !id.is_empty())
            .map(Self::Record)
    }
}
