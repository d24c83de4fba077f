//! Authoritative job registry.
//!
//! The in-memory map is the source of truth; every accepted write is also
//! persisted under the write lock before it returns. If persisting fails the
//! in-memory change still stands and [`JobsError::Persistence`] is returned
//! so the caller can log it.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;
use vforge_models::{Job, JobId, TransitionError};

use crate::error::{JobsError, JobsResult};
use crate::persistence::JobPersistence;

/// Thread-safe job registry with optional on-disk records.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    persistence: Option<JobPersistence>,
}

impl JobStore {
    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a persistent store, reloading every record found in `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> JobsResult<Self> {
        let persistence = JobPersistence::new(dir.as_ref());
        let loaded = persistence.load_all().await?;
        info!(
            count = loaded.len(),
            dir = %dir.as_ref().display(),
            "Loaded persisted jobs"
        );

        let jobs = loaded.into_iter().map(|job| (job.id.clone(), job)).collect();
        Ok(Self {
            jobs: RwLock::new(jobs),
            persistence: Some(persistence),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Register a new job.
    pub async fn add(&self, job: Job) -> JobsResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(JobsError::AlreadyExists(job.id));
        }
        jobs.insert(job.id.clone(), job.clone());
        self.persist(&job).await
    }

    /// Snapshot of a job.
    pub async fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Replace a job with a newer snapshot.
    ///
    /// Rejects snapshots that leave a terminal state, move status backward or
    /// lower progress.
    pub async fn update(&self, job: Job) -> JobsResult<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get(&job.id)
            .ok_or_else(|| JobsError::NotFound(job.id.clone()))?;
        check_successor(stored, &job)?;

        jobs.insert(job.id.clone(), job.clone());
        self.persist(&job).await
    }

    /// Apply a transition to the stored job and return the new snapshot.
    pub async fn modify<F>(&self, id: &JobId, f: F) -> JobsResult<Job>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get(id).ok_or_else(|| JobsError::NotFound(id.clone()))?;

        let mut next = stored.clone();
        f(&mut next)?;
        check_successor(stored, &next)?;

        jobs.insert(id.clone(), next.clone());
        self.persist(&next).await?;
        Ok(next)
    }

    /// Remove a job from memory and disk. Returns whether it existed.
    pub async fn delete(&self, id: &JobId) -> JobsResult<bool> {
        let mut jobs = self.jobs.write().await;
        let existed = jobs.remove(id).is_some();
        if let Some(persistence) = &self.persistence {
            persistence.delete(id).await?;
        }
        Ok(existed)
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Jobs last written before `cutoff`.
    ///
    /// Uses the record's modification time when persisted, `updated_at`
    /// otherwise.
    pub async fn expired(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let candidates: Vec<(JobId, DateTime<Utc>)> = self
            .jobs
            .read()
            .await
            .values()
            .map(|job| (job.id.clone(), job.updated_at))
            .collect();

        let mut expired = Vec::new();
        for (id, updated_at) in candidates {
            let last_write = match &self.persistence {
                Some(persistence) => persistence
                    .modified(&id)
                    .await
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(updated_at),
                None => updated_at,
            };
            if last_write < cutoff {
                expired.push(id);
            }
        }
        expired
    }

    async fn persist(&self, job: &Job) -> JobsResult<()> {
        match &self.persistence {
            Some(persistence) => persistence.save(job).await,
            None => Ok(()),
        }
    }
}

fn check_successor(stored: &Job, next: &Job) -> Result<(), TransitionError> {
    if stored.is_terminal() {
        return Err(TransitionError::AlreadyTerminal(stored.status));
    }
    if !stored.status.can_transition_to(next.status) {
        return Err(TransitionError::InvalidTransition {
            from: stored.status,
            to: next.status,
        });
    }
    if next.progress < stored.progress {
        return Err(TransitionError::ProgressRegression {
            from: stored.progress,
            to: next.progress,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;
    use vforge_models::JobStatus;

    #[tokio::test]
    async fn test_add_and_get() {
        let store = JobStore::in_memory();
        let job = Job::new();
        store.add(job.clone()).await.unwrap();

        assert_eq!(store.get(&job.id).await, Some(job.clone()));
        assert_eq!(store.len().await, 1);
        assert!(matches!(
            store.add(job).await,
            Err(JobsError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let store = JobStore::in_memory();
        assert!(store.get(&JobId::from("missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_modify_walks_lifecycle() {
        let store = JobStore::in_memory();
        let job = Job::new();
        let id = job.id.clone();
        store.add(job).await.unwrap();

        store.modify(&id, |j| j.start_processing()).await.unwrap();
        store.modify(&id, |j| j.set_progress(30)).await.unwrap();
        let done = store.modify(&id, |j| j.complete("/outputs/x.mp4")).await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(store.get(&id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn test_update_rejects_terminal_rewrite() {
        let store = JobStore::in_memory();
        let mut job = Job::new();
        store.add(job.clone()).await.unwrap();

        job.fail("boom").unwrap();
        store.update(job.clone()).await.unwrap();

        let mut revived = job.clone();
        revived.status = JobStatus::Processing;
        let err = store.update(revived).await.unwrap_err();
        assert!(matches!(
            err,
            JobsError::InvalidTransition(TransitionError::AlreadyTerminal(JobStatus::Failed))
        ));
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_update_rejects_progress_regression() {
        let store = JobStore::in_memory();
        let mut job = Job::new();
        job.start_processing().unwrap();
        job.set_progress(30).unwrap();
        store.add(job.clone()).await.unwrap();

        let mut stale = job.clone();
        stale.progress = 10;
        assert!(matches!(
            store.update(stale).await,
            Err(JobsError::InvalidTransition(TransitionError::ProgressRegression { from: 30, to: 10 }))
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_job() {
        let store = JobStore::in_memory();
        assert!(matches!(store.update(Job::new()).await, Err(JobsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reload_reproduces_completed_job() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = JobStore::open(dir.path()).await.unwrap();
            let job = Job::new();
            let id = job.id.clone();
            store.add(job).await.unwrap();
            store.modify(&id, |j| j.start_processing()).await.unwrap();
            store.modify(&id, |j| j.complete("/outputs/r.mp4")).await.unwrap();
            id
        };

        let reopened = JobStore::open(dir.path()).await.unwrap();
        let job = reopened.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_path.as_deref(), Some("/outputs/r.mp4"));
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        let job = Job::new();
        store.add(job.clone()).await.unwrap();

        assert!(store.delete(&job.id).await.unwrap());
        assert!(!store.delete(&job.id).await.unwrap());
        assert!(store.is_empty().await);
        assert!(!dir.path().join(format!("{}.json", job.id)).exists());
    }

    #[tokio::test]
    async fn test_expired_in_memory_uses_updated_at() {
        let store = JobStore::in_memory();
        let mut old = Job::new();
        old.updated_at = Utc::now() - Duration::days(10);
        let fresh = Job::new();
        store.add(old.clone()).await.unwrap();
        store.add(fresh).await.unwrap();

        let expired = store.expired(Utc::now() - Duration::days(7)).await;
        assert_eq!(expired, vec![old.id]);
    }

    #[tokio::test]
    async fn test_expired_persistent_uses_record_mtime() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        let job = Job::new();
        store.add(job.clone()).await.unwrap();

        assert!(store.expired(Utc::now() - Duration::hours(1)).await.is_empty());
        assert_eq!(store.expired(Utc::now() + Duration::hours(1)).await, vec![job.id]);
    }

    #[tokio::test]
    async fn test_list_oldest_first() {
        let store = JobStore::in_memory();
        let mut first = Job::new();
        first.created_at = Utc::now() - Duration::minutes(5);
        let second = Job::new();
        store.add(second.clone()).await.unwrap();
        store.add(first.clone()).await.unwrap();

        let ids: Vec<JobId> = store.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
