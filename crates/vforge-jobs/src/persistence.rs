//! One JSON file per job on local disk.
//!
//! Records are written to `<id>.json.tmp` and renamed over `<id>.json`, so a
//! crash mid-write never leaves a truncated record behind.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use vforge_models::{Job, JobId, JobStatus};

use crate::error::{JobsError, JobsResult};

/// On-disk form of a job. Absent output and error are empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status,
            progress: job.progress,
            output_path: job.output_path.clone().unwrap_or_default(),
            error: job.error.clone().unwrap_or_default(),
            s3_url: job.s3_url.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        let non_empty = |s: String| Some(s).filter(|s| !s.is_empty());
        Job {
            id: JobId::from(record.id),
            status: record.status,
            progress: record.progress.min(100),
            output_path: non_empty(record.output_path),
            s3_url: record.s3_url,
            error: non_empty(record.error),
            webhook: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Job records in a directory.
#[derive(Debug, Clone)]
pub struct JobPersistence {
    dir: PathBuf,
}

impl JobPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write the job's record atomically.
    pub async fn save(&self, job: &Job) -> JobsResult<()> {
        let data = serde_json::to_vec_pretty(&JobRecord::from(job))
            .map_err(|e| JobsError::persistence(format!("failed to encode job {}: {}", job.id, e)))?;

        let path = self.record_path(&job.id);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| JobsError::persistence(format!("failed to create {}: {}", self.dir.display(), e)))?;
        fs::write(&tmp, &data)
            .await
            .map_err(|e| JobsError::persistence(format!("failed to write {}: {}", tmp.display(), e)))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(JobsError::persistence(format!(
                "failed to rename {}: {}",
                tmp.display(),
                e
            )));
        }

        debug!(job_id = %job.id, "Persisted job record");
        Ok(())
    }

    /// Load every readable record. Malformed files are logged and skipped.
    pub async fn load_all(&self) -> JobsResult<Vec<Job>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(JobsError::persistence(format!(
                    "failed to read {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            match read_record(&path).await {
                Ok(record) => jobs.push(Job::from(record)),
                Err(e) => warn!("Skipping job record {}: {}", path.display(), e),
            }
        }

        Ok(jobs)
    }

    /// Remove a job's record. Missing records are ignored.
    pub async fn delete(&self, id: &JobId) -> JobsResult<()> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JobsError::persistence(format!(
                "failed to delete record of job {}: {}",
                id, e
            ))),
        }
    }

    /// Last modification time of a job's record.
    pub async fn modified(&self, id: &JobId) -> Option<SystemTime> {
        fs::metadata(self.record_path(id))
            .await
            .and_then(|meta| meta.modified())
            .ok()
    }
}

async fn read_record(path: &Path) -> anyhow::Result<JobRecord> {
    let data = fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}
