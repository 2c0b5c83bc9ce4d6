//! Bulk job record and its bookkeeping rules.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use itemflow_core::{BulkOperation, ItemId};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s.trim()).map(Self)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, no item touched yet
    Pending,
    /// Items are being resolved
    Processing,
    /// Every target resolved (terminal)
    Completed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
        }
    }
}

/// Running counters. Skips are tracked by id in [`BulkJob::skipped_ids`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// A target item that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: ItemId,
    pub error: String,
}

/// A bulk mutation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkJob {
    pub id: JobId,
    pub operation: BulkOperation,
    /// Targets in submission order, duplicates collapsed.
    pub target_ids: Vec<ItemId>,
    pub status: JobStatus,
    /// 0..=100; 100 exactly when completed.
    pub progress: u8,
    pub summary: JobSummary,
    pub skipped_ids: Vec<ItemId>,
    pub failures: Vec<ItemFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl BulkJob {
    /// Create a pending job over `target_ids` (deduplicated, first occurrence wins).
    pub fn new(operation: BulkOperation, target_ids: Vec<ItemId>, ttl: Duration) -> Self {
        let now = Utc::now();
        let target_ids = dedup_preserving_order(target_ids);
        Self {
            id: JobId::new(),
            operation,
            summary: JobSummary {
                total: target_ids.len(),
                ..JobSummary::default()
            },
            target_ids,
            status: JobStatus::Pending,
            progress: 0,
            skipped_ids: Vec::new(),
            failures: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Targets resolved so far (success, skip or failure).
    pub fn processed(&self) -> usize {
        self.summary.success + self.summary.failed + self.skipped_ids.len()
    }

    pub fn mark_processing(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Processing;
            self.updated_at = Utc::now();
        }
    }

    pub fn record_success(&mut self) {
        self.summary.success += 1;
        self.resolved();
    }

    pub fn record_skip(&mut self, id: ItemId) {
        self.skipped_ids.push(id);
        self.resolved();
    }

    pub fn record_failure(&mut self, id: ItemId, error: impl Into<String>) {
        self.summary.failed += 1;
        self.failures.push(ItemFailure {
            id,
            error: error.into(),
        });
        self.resolved();
    }

    /// Recompute progress after one target resolves; the last one completes the job.
    fn resolved(&mut self) {
        let now = Utc::now();
        let total = self.summary.total.max(1);
        let processed = self.processed().min(total);
        self.updated_at = now;
        self.progress = ((100 * processed) / total) as u8;

        if processed == self.summary.total {
            self.status = JobStatus::Completed;
            self.progress = 100;
            self.completed_at = Some(now);
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Accounting invariant: completed jobs account for every target exactly once.
    pub fn is_consistent(&self) -> bool {
        let accounted = self.processed() <= self.summary.total
            && self.summary.total == self.target_ids.len()
            && self.summary.failed == self.failures.len();
        match self.status {
            JobStatus::Completed => {
                accounted && self.processed() == self.summary.total && self.progress == 100
            }
            _ => accounted && self.progress < 100,
        }
    }
}

/// Drop repeated ids, keeping the first occurrence of each.
pub fn dedup_preserving_order(ids: Vec<ItemId>) -> Vec<ItemId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
