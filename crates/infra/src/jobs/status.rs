//! Read-only view of a job for polling clients.

use serde::{Deserialize, Serialize};

use itemflow_core::ItemId;

use super::types::{BulkJob, ItemFailure, JobId, JobStatus, JobSummary};

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub summary: JobSummary,
    #[serde(rename = "skippedIds")]
    pub skipped_ids: Vec<ItemId>,
    pub failures: Vec<ItemFailure>,
}

impl From<&BulkJob> for JobStatusView {
    fn from(job: &BulkJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            summary: job.summary,
            skipped_ids: job.skipped_ids.clone(),
            failures: job.failures.clone(),
        }
    }
}

impl From<BulkJob> for JobStatusView {
    fn from(job: BulkJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            summary: job.summary,
            skipped_ids: job.skipped_ids,
            failures: job.failures,
        }
    }
}

impl JobStatusView {
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }
}
