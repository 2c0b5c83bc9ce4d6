//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::types::{BulkJob, JobId};

/// Job store abstraction.
///
/// Snapshots are whole jobs: writers publish a complete `BulkJob` and readers
/// get a complete clone, so a reader never observes a half-updated summary.
pub trait JobStore: Send + Sync {
    /// Register a new job.
    fn insert(&self, job: BulkJob) -> Result<(), JobStoreError>;

    /// Get the latest snapshot of a job. Expired jobs are reported as absent.
    fn get(&self, job_id: JobId) -> Result<Option<BulkJob>, JobStoreError>;

    /// Replace the stored snapshot of an existing job.
    fn publish(&self, job: &BulkJob) -> Result<(), JobStoreError>;

    /// Remove expired jobs, returning how many were dropped.
    fn purge_expired(&self) -> Result<usize, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, BulkJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("lock poisoned".to_string())
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: BulkJob) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    fn get(&self, job_id: JobId) -> Result<Option<BulkJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let now = Utc::now();
        Ok(jobs
            .get(&job_id)
            .filter(|job| !job.is_expired_at(now))
            .cloned())
    }

    fn publish(&self, job: &BulkJob) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    fn purge_expired(&self) -> Result<usize, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let now = Utc::now();
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired_at(now));
        Ok(before - jobs.len())
    }
}

impl JobStore for Arc<InMemoryJobStore> {
    fn insert(&self, job: BulkJob) -> Result<(), JobStoreError> {
        (**self).insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<BulkJob>, JobStoreError> {
        (**self).get(job_id)
    }

    fn publish(&self, job: &BulkJob) -> Result<(), JobStoreError> {
        (**self).publish(job)
    }

    fn purge_expired(&self) -> Result<usize, JobStoreError> {
        (**self).purge_expired()
    }
}
