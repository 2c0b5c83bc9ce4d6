use serde::{Deserialize, Serialize};

use itemflow_core::ItemPatch;
use itemflow_infra::jobs::{BulkJob, JobId, JobStatus};

// -------------------------
// Request DTOs
// -------------------------

/// `PUT /items/:id`: the version token plus any fields to change.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub version: Option<u64>,
    #[serde(flatten)]
    pub patch: ItemPatch,
}

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<u64>,
}

// -------------------------
// Response DTOs
// -------------------------

/// `202 Accepted` body for a bulk submission.
#[derive(Debug, Serialize)]
pub struct BulkAcceptedResponse {
    pub job_id: JobId,
    pub job_status: JobStatus,
    pub job_progress: u8,
    pub total_items: usize,
}

impl From<&BulkJob> for BulkAcceptedResponse {
    fn from(job: &BulkJob) -> Self {
        Self {
            job_id: job.id,
            job_status: job.status,
            job_progress: job.progress,
            total_items: job.summary.total,
        }
    }
}
