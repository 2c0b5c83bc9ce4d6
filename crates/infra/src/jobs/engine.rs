//! Bulk job engine.
//!
//! Accepts bulk requests, registers a pending job, and resolves every target
//! item on a dedicated tokio task. Each target goes through the planner and
//! then, if a write is needed, through the retry coordinator and the
//! optimistic lock guard. Progress is published as a whole-job snapshot after
//! every target, so pollers always see a consistent summary.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use itemflow_core::{BulkOperation, ExpectedVersion, ItemId, Plan};

use crate::guard::{OptimisticLockGuard, WriteError};
use crate::store::ItemStore;
use crate::transaction::TransactionalRetryCoordinator;

use super::status::JobStatusView;
use super::store::{JobStore, JobStoreError};
use super::types::{BulkJob, JobId};

/// A bulk mutation request as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest {
    pub operation: String,
    #[serde(rename = "itemIds", default)]
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub payload: JsonValue,
}

/// Bulk engine error.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("job bookkeeping failed: {0}")]
    Bookkeeping(#[from] JobStoreError),
    #[error("timed out waiting for job {0}")]
    Timeout(JobId),
}

/// Engine limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on distinct targets per job
    pub max_items_per_job: usize,
    /// How long a job stays queryable after creation
    pub job_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_items_per_job: 1_000,
            job_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// How one target item resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Applied,
    Skipped(String),
    Failed(String),
}

struct EngineInner<S, J> {
    guard: OptimisticLockGuard<S>,
    coordinator: TransactionalRetryCoordinator<S>,
    jobs: J,
    config: EngineConfig,
}

/// Owns bulk job lifecycle. Cheap to clone; clones share state.
pub struct BulkJobEngine<S, J> {
    inner: Arc<EngineInner<S, J>>,
}

impl<S, J> Clone for BulkJobEngine<S, J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, J> BulkJobEngine<S, J>
where
    S: ItemStore + Clone + 'static,
    J: JobStore + 'static,
{
    /// Item reads and guarded writes use the coordinator's store.
    pub fn new(
        coordinator: TransactionalRetryCoordinator<S>,
        jobs: J,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                guard: OptimisticLockGuard::new(coordinator.store().clone()),
                coordinator,
                jobs,
                config,
            }),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.inner.config
    }

    /// Validate and register a job, then start processing it in the background.
    ///
    /// Returns the pending snapshot without waiting for any item. Must be
    /// called from within a tokio runtime.
    pub fn submit(&self, request: BulkRequest) -> Result<BulkJob, EngineError> {
        let operation = BulkOperation::parse(&request.operation, &request.payload)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        if request.item_ids.is_empty() {
            return Err(EngineError::Validation(
                "itemIds must be a non-empty array".to_string(),
            ));
        }

        let target_ids = request
            .item_ids
            .iter()
            .map(|raw| {
                raw.parse::<ItemId>()
                    .map_err(|_| EngineError::Validation(format!("invalid item id '{raw}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let job = BulkJob::new(operation, target_ids, self.inner.config.job_ttl);
        let max = self.inner.config.max_items_per_job;
        if job.target_ids.len() > max {
            return Err(EngineError::Validation(format!(
                "at most {max} distinct items per bulk operation (got {})",
                job.target_ids.len()
            )));
        }

        self.inner.jobs.insert(job.clone())?;
        info!(
            job_id = %job.id,
            operation = %job.operation,
            total = job.summary.total,
            "bulk job submitted"
        );

        let engine = self.clone();
        let snapshot = job.clone();
        tokio::spawn(async move {
            let job_id = job.id;
            match engine.run(job).await {
                Ok(()) => {}
                // Purged by the sweeper while still running.
                Err(JobStoreError::NotFound(_)) => {
                    debug!(job_id = %job_id, "bulk job expired before completion; stopped");
                }
                Err(e) => {
                    error!(
                        job_id = %job_id,
                        error = %e,
                        "bulk job bookkeeping failed; job abandoned"
                    );
                }
            }
        });

        Ok(snapshot)
    }

    /// Current snapshot of a job.
    pub fn status(&self, job_id: JobId) -> Result<JobStatusView, EngineError> {
        self.inner
            .jobs
            .get(job_id)?
            .map(JobStatusView::from)
            .ok_or(EngineError::JobNotFound(job_id))
    }

    /// Poll until the job completes or `timeout` elapses.
    pub async fn wait_for_completion(
        &self,
        job_id: JobId,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<JobStatusView, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let view = self.status(job_id)?;
            if view.is_completed() {
                return Ok(view);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::Timeout(job_id));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Drop jobs past their TTL.
    pub fn purge_expired(&self) -> Result<usize, EngineError> {
        let purged = self.inner.jobs.purge_expired()?;
        if purged > 0 {
            debug!(purged, "expired bulk jobs purged");
        }
        Ok(purged)
    }

    async fn run(&self, mut job: BulkJob) -> Result<(), JobStoreError> {
        job.mark_processing();
        self.inner.jobs.publish(&job)?;
        info!(job_id = %job.id, "bulk job processing");

        let targets = job.target_ids.clone();
        for id in targets {
            match self.resolve_item(&job.operation, id).await {
                ItemOutcome::Applied => job.record_success(),
                ItemOutcome::Skipped(reason) => {
                    debug!(job_id = %job.id, item_id = %id, reason = %reason, "item skipped");
                    job.record_skip(id);
                }
                ItemOutcome::Failed(reason) => {
                    debug!(job_id = %job.id, item_id = %id, error = %reason, "item failed");
                    job.record_failure(id, reason);
                }
            }
            self.inner.jobs.publish(&job)?;
            tokio::task::yield_now().await;
        }

        info!(
            job_id = %job.id,
            total = job.summary.total,
            success = job.summary.success,
            failed = job.summary.failed,
            skipped = job.skipped_ids.len(),
            "bulk job completed"
        );
        Ok(())
    }

    /// Plan and apply one target. Conflicts with concurrent edits re-read and
    /// re-plan, bounded by the coordinator's retry policy.
    async fn resolve_item(&self, operation: &BulkOperation, id: ItemId) -> ItemOutcome {
        let policy = self.inner.coordinator.policy();
        let mut attempt = 0;

        loop {
            let current = match self.inner.guard.store().get(id) {
                Ok(current) => current,
                Err(e) => return ItemOutcome::Failed(e.to_string()),
            };

            let mutation = match operation.plan(current.as_ref()) {
                Plan::Apply(mutation) => mutation,
                Plan::Skip(reason) => return ItemOutcome::Skipped(reason),
                Plan::Reject(reason) => return ItemOutcome::Failed(reason.to_string()),
            };

            // Apply is only planned for a present item.
            let version = current.as_ref().map_or(0, |item| item.version());
            let expected = match ExpectedVersion::new(version) {
                Ok(expected) => expected,
                Err(e) => return ItemOutcome::Failed(e.to_string()),
            };

            let guard = &self.inner.guard;
            let result = self
                .inner
                .coordinator
                .run_in_transaction(|tx| guard.apply_versioned_write(tx, id, expected, &mutation))
                .await;

            match result {
                Ok(_) => return ItemOutcome::Applied,
                Err(e @ (WriteError::Conflict { .. } | WriteError::NotFound))
                    if policy.should_retry(attempt) =>
                {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        item_id = %id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "item changed under bulk job; re-planning"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return ItemOutcome::Failed(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use serde_json::json;

    use itemflow_core::{Item, ItemMutation, ItemPatch, NewItem};

    use crate::jobs::{InMemoryJobStore, JobStatus, JobSummary};
    use crate::store::{InMemoryItemStore, StoreError, StoreTransaction};
    use crate::transaction::{RetryPolicy, TransactionSupport};

    type TestEngine = BulkJobEngine<Arc<InMemoryItemStore>, Arc<InMemoryJobStore>>;

    const POLL: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(5);

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(10))
    }

    fn engine_with(store: Arc<InMemoryItemStore>, support: TransactionSupport) -> TestEngine {
        engine_over(store, support)
    }

    fn engine() -> (TestEngine, Arc<InMemoryItemStore>) {
        let store = InMemoryItemStore::arc();
        (engine_with(store.clone(), TransactionSupport::Supported), store)
    }

    fn seed(store: &InMemoryItemStore, active: bool, category: &str) -> ItemId {
        let mut item = Item::create(
            ItemId::new(),
            NewItem {
                name: "Garden Hose".to_string(),
                description: "Twenty metre garden hose".to_string(),
                category: category.to_string(),
                price_cents: 3_000,
                tags: vec![],
            },
            Utc::now(),
        )
        .unwrap();
        if !active {
            item = item.mutated(&ItemMutation::Deactivate, Utc::now()).unwrap();
        }
        let id = item.id();
        store.insert(item).unwrap();
        id
    }

    fn request(operation: &str, ids: &[ItemId], payload: JsonValue) -> BulkRequest {
        BulkRequest {
            operation: operation.to_string(),
            item_ids: ids.iter().map(ToString::to_string).collect(),
            payload,
        }
    }

    #[tokio::test]
    async fn submit_returns_pending_snapshot() {
        let (engine, store) = engine();
        let id = seed(&store, true, "Garden");

        let job = engine
            .submit(request("deactivate", &[id, id], JsonValue::Null))
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.summary.total, 1);

        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();
        assert_eq!(done.progress, 100);
    }

    #[tokio::test]
    async fn submit_validates_request() {
        let (engine, _) = engine();
        let cases = [
            request("archive", &[ItemId::new()], JsonValue::Null),
            request("deactivate", &[], JsonValue::Null),
            request("update_category", &[ItemId::new()], json!({})),
            BulkRequest {
                operation: "activate".to_string(),
                item_ids: vec!["not-a-uuid".to_string()],
                payload: JsonValue::Null,
            },
        ];
        for case in cases {
            assert!(matches!(
                engine.submit(case),
                Err(EngineError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn submit_enforces_item_limit() {
        let coordinator = TransactionalRetryCoordinator::new(
            InMemoryItemStore::arc(),
            TransactionSupport::Supported,
            fast_policy(),
        );
        let engine = BulkJobEngine::new(
            coordinator,
            InMemoryJobStore::arc(),
            EngineConfig {
                max_items_per_job: 2,
                ..EngineConfig::default()
            },
        );
        let ids: Vec<_> = (0..3).map(|_| ItemId::new()).collect();
        assert!(matches!(
            engine.submit(request("activate", &ids, JsonValue::Null)),
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn partial_failure_accounting() {
        let (engine, store) = engine();
        let a = seed(&store, true, "Garden");
        let b = seed(&store, true, "Garden");
        let c = seed(&store, false, "Garden");

        let job = engine
            .submit(request("deactivate", &[a, b, c], JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();

        assert_eq!(
            done.summary,
            JobSummary {
                total: 3,
                success: 2,
                failed: 0
            }
        );
        assert_eq!(done.skipped_ids, vec![c]);
        assert_eq!(store.get(a).unwrap().unwrap().version(), 2);
        assert_eq!(store.get(c).unwrap().unwrap().version(), 2);
    }

    #[tokio::test]
    async fn repeated_deactivate_is_idempotent() {
        let (engine, store) = engine();
        let ids: Vec<_> = (0..4).map(|_| seed(&store, true, "Garden")).collect();

        let first = engine
            .submit(request("deactivate", &ids, JsonValue::Null))
            .unwrap();
        engine.wait_for_completion(first.id, POLL, WAIT).await.unwrap();

        let second = engine
            .submit(request("deactivate", &ids, JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(second.id, POLL, WAIT).await.unwrap();

        assert_eq!(done.summary.success, 0);
        assert_eq!(done.skipped_ids, ids);
        for id in &ids {
            assert_eq!(store.get(*id).unwrap().unwrap().version(), 2);
        }
    }

    #[tokio::test]
    async fn update_category_fails_inactive_targets() {
        let (engine, store) = engine();
        let ids = [
            seed(&store, false, "Initial"),
            seed(&store, false, "Initial"),
            seed(&store, true, "Initial"),
            seed(&store, true, "Initial"),
        ];

        let job = engine
            .submit(request(
                "update_category",
                &ids,
                json!({"category": "electronics"}),
            ))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();

        assert_eq!(
            done.summary,
            JobSummary {
                total: 4,
                success: 2,
                failed: 2
            }
        );
        assert!(done.skipped_ids.is_empty());
        assert_eq!(done.failures[0].id, ids[0]);
        assert_eq!(
            done.failures[0].error,
            "cannot update category of inactive item"
        );
        assert_eq!(store.get(ids[3]).unwrap().unwrap().category(), "Electronics");
    }

    #[tokio::test]
    async fn missing_items_are_failures() {
        let (engine, store) = engine();
        let present = seed(&store, false, "Garden");
        let missing = ItemId::new();

        let job = engine
            .submit(request("activate", &[missing, present], JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();

        assert_eq!(done.summary.success, 1);
        assert_eq!(done.failures.len(), 1);
        assert_eq!(done.failures[0].error, "item not found");
    }

    #[tokio::test]
    async fn soft_delete_then_activate_is_rejected() {
        let (engine, store) = engine();
        let id = seed(&store, true, "Garden");

        let job = engine.submit(request("delete", &[id], JsonValue::Null)).unwrap();
        engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();
        assert!(store.get(id).unwrap().unwrap().is_deleted());

        let job = engine.submit(request("activate", &[id], JsonValue::Null)).unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();
        assert_eq!(done.summary.failed, 1);
    }

    #[tokio::test]
    async fn works_without_transactions() {
        let store = Arc::new(InMemoryItemStore::without_transactions());
        let engine = engine_with(store.clone(), TransactionSupport::Unsupported);
        let id = seed(&store, true, "Garden");

        let job = engine
            .submit(request("deactivate", &[id], JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();
        assert_eq!(done.summary.success, 1);
        assert!(!store.get(id).unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.status(JobId::new()),
            Err(EngineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn expired_jobs_report_not_found_and_purge() {
        let store = InMemoryItemStore::arc();
        let coordinator = TransactionalRetryCoordinator::new(
            store.clone(),
            TransactionSupport::Supported,
            fast_policy(),
        );
        let jobs = InMemoryJobStore::arc();
        let engine = BulkJobEngine::new(
            coordinator,
            jobs.clone(),
            EngineConfig {
                job_ttl: Duration::ZERO,
                ..EngineConfig::default()
            },
        );
        let id = seed(&store, true, "Garden");

        let job = engine
            .submit(request("deactivate", &[id], JsonValue::Null))
            .unwrap();
        assert!(matches!(
            engine.status(job.id),
            Err(EngineError::JobNotFound(_))
        ));
        assert_eq!(engine.purge_expired().unwrap(), 1);
        assert!(jobs.is_empty());

        // The worker finds its job gone and stops before touching any item.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(jobs.is_empty());
        let item = store.get(id).unwrap().unwrap();
        assert_eq!(item.version(), 1);
        assert!(item.is_active());
    }

    #[tokio::test]
    async fn progress_is_monotonic_while_polling() {
        let (engine, store) = engine();
        let ids: Vec<_> = (0..200).map(|_| seed(&store, true, "Garden")).collect();

        let job = engine
            .submit(request("deactivate", &ids, JsonValue::Null))
            .unwrap();

        let mut last = 0;
        loop {
            let view = engine.status(job.id).unwrap();
            assert!(view.progress >= last);
            assert_eq!(view.progress == 100, view.is_completed());
            last = view.progress;
            if view.is_completed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(last, 100);
    }

    /// Store wrapper whose transactions lose the commit race a fixed number of times.
    #[derive(Clone)]
    struct FlakyCommits {
        inner: Arc<InMemoryItemStore>,
        remaining: Arc<std::sync::atomic::AtomicU32>,
    }

    struct FlakyTx {
        inner: Box<dyn StoreTransaction>,
        fail: bool,
    }

    impl StoreTransaction for FlakyTx {
        fn get(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
            self.inner.get(id)
        }

        fn put_if_version(
            &mut self,
            item: Item,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.inner.put_if_version(item, expected)
        }

        fn commit(self: Box<Self>) -> Result<(), StoreError> {
            if self.fail {
                self.inner.abort();
                return Err(StoreError::WriteConflict("simulated".to_string()));
            }
            self.inner.commit()
        }

        fn abort(self: Box<Self>) {
            self.inner.abort();
        }
    }

    impl ItemStore for FlakyCommits {
        fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
            self.inner.get(id)
        }

        fn insert(&self, item: Item) -> Result<(), StoreError> {
            self.inner.insert(item)
        }

        fn replace_if_version(
            &self,
            item: Item,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.inner.replace_if_version(item, expected)
        }

        fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
            use std::sync::atomic::Ordering;
            let fail = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            Ok(Box::new(FlakyTx {
                inner: self.inner.begin()?,
                fail,
            }))
        }

        fn list(&self) -> Result<Vec<Item>, StoreError> {
            self.inner.list()
        }
    }

    fn engine_over<S: ItemStore + Clone + 'static>(
        store: S,
        support: TransactionSupport,
    ) -> BulkJobEngine<S, Arc<InMemoryJobStore>> {
        let coordinator = TransactionalRetryCoordinator::new(store, support, fast_policy());
        BulkJobEngine::new(coordinator, InMemoryJobStore::arc(), EngineConfig::default())
    }

    fn flaky_engine(
        failures: u32,
    ) -> (
        BulkJobEngine<FlakyCommits, Arc<InMemoryJobStore>>,
        Arc<InMemoryItemStore>,
    ) {
        let inner = InMemoryItemStore::arc();
        let store = FlakyCommits {
            inner: inner.clone(),
            remaining: Arc::new(std::sync::atomic::AtomicU32::new(failures)),
        };
        (engine_over(store, TransactionSupport::Supported), inner)
    }

    #[tokio::test]
    async fn transient_commit_conflicts_are_retried() {
        let (engine, store) = flaky_engine(2);
        let id = seed(&store, true, "Garden");

        let job = engine
            .submit(request("deactivate", &[id], JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();
        assert_eq!(done.summary.success, 1);
        assert_eq!(store.get(id).unwrap().unwrap().version(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_record_failure() {
        let (engine, store) = flaky_engine(100);
        let id = seed(&store, true, "Garden");

        let job = engine
            .submit(request("deactivate", &[id], JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();
        assert_eq!(done.summary.failed, 1);
        assert!(done.failures[0].error.contains("write conflict"));
        assert_eq!(store.get(id).unwrap().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn concurrent_edit_and_bulk_job_never_share_a_base_version() {
        let (engine, store) = engine();
        let ids: Vec<_> = (0..50).map(|_| seed(&store, true, "Garden")).collect();
        let guard = OptimisticLockGuard::new(store.clone());

        let job = engine
            .submit(request("update_category", &ids, json!({"category": "Patio"})))
            .unwrap();

        // Single edits race the job, each against version 1.
        let mut edits_ok = Vec::new();
        for id in &ids {
            let edited = guard
                .apply_versioned_write(
                    None,
                    *id,
                    ExpectedVersion::new(1).unwrap(),
                    &ItemMutation::SetCategory {
                        category: "Lawn".to_string(),
                    },
                )
                .is_ok();
            edits_ok.push(edited);
            tokio::task::yield_now().await;
        }

        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();
        assert_eq!(done.summary.failed, 0);
        assert_eq!(done.summary.success, ids.len());
        for (id, edited) in ids.iter().zip(edits_ok) {
            let item = store.get(*id).unwrap().unwrap();
            // Both writers may land, but never on the same base version.
            let expected = if edited { 3 } else { 2 };
            assert_eq!(item.version(), expected);
            assert_eq!(item.category(), "Patio");
        }
    }

    /// Store wrapper that lands a competing edit on one item whenever a write
    /// is about to start, i.e. after the bulk job has read and planned it.
    #[derive(Clone)]
    struct RacingEdits {
        inner: Arc<InMemoryItemStore>,
        target: ItemId,
        edit: ItemMutation,
        remaining: Arc<std::sync::atomic::AtomicU32>,
    }

    impl RacingEdits {
        fn new(
            inner: Arc<InMemoryItemStore>,
            target: ItemId,
            edit: ItemMutation,
            times: u32,
        ) -> Self {
            Self {
                inner,
                target,
                edit,
                remaining: Arc::new(std::sync::atomic::AtomicU32::new(times)),
            }
        }

        fn race(&self) {
            use std::sync::atomic::Ordering;
            let due = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !due {
                return;
            }
            let current = self.inner.get(self.target).unwrap().unwrap();
            let next = current.mutated(&self.edit, Utc::now()).unwrap();
            self.inner
                .replace_if_version(next, ExpectedVersion::new(current.version()).unwrap())
                .unwrap();
        }
    }

    impl ItemStore for RacingEdits {
        fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
            self.inner.get(id)
        }

        fn insert(&self, item: Item) -> Result<(), StoreError> {
            self.inner.insert(item)
        }

        fn replace_if_version(
            &self,
            item: Item,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.race();
            self.inner.replace_if_version(item, expected)
        }

        fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
            self.race();
            self.inner.begin()
        }

        fn list(&self) -> Result<Vec<Item>, StoreError> {
            self.inner.list()
        }
    }

    fn price_edit(price_cents: u64) -> ItemMutation {
        ItemMutation::Patch(ItemPatch {
            price_cents: Some(price_cents),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn edit_between_read_and_write_replans_into_skip() {
        let inner = InMemoryItemStore::arc();
        let id = seed(&inner, true, "Garden");
        let store = RacingEdits::new(inner.clone(), id, ItemMutation::Deactivate, 1);
        let engine = engine_over(store, TransactionSupport::Supported);

        let job = engine
            .submit(request("deactivate", &[id], JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();

        assert_eq!(
            done.summary,
            JobSummary {
                total: 1,
                success: 0,
                failed: 0
            }
        );
        assert_eq!(done.skipped_ids, vec![id]);
        // Only the competing edit landed.
        assert_eq!(inner.get(id).unwrap().unwrap().version(), 2);
    }

    #[tokio::test]
    async fn edit_between_read_and_write_replans_and_applies_on_new_version() {
        for support in [TransactionSupport::Supported, TransactionSupport::Unsupported] {
            let inner = if support == TransactionSupport::Supported {
                InMemoryItemStore::arc()
            } else {
                Arc::new(InMemoryItemStore::without_transactions())
            };
            let id = seed(&inner, true, "Garden");
            let store = RacingEdits::new(inner.clone(), id, price_edit(1_234), 1);
            let engine = engine_over(store, support);

            let job = engine
                .submit(request("update_category", &[id], json!({"category": "patio"})))
                .unwrap();
            let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();

            assert_eq!(done.summary.success, 1, "{support:?}");
            assert!(done.failures.is_empty());
            let item = inner.get(id).unwrap().unwrap();
            assert_eq!(item.version(), 3);
            assert_eq!(item.category(), "Patio");
            assert_eq!(item.price_cents(), 1_234);
        }
    }

    #[tokio::test]
    async fn persistent_edits_exhaust_replans_and_record_conflict() {
        let inner = InMemoryItemStore::arc();
        let id = seed(&inner, true, "Garden");
        let store = RacingEdits::new(inner.clone(), id, price_edit(999), u32::MAX);
        let engine = engine_over(store, TransactionSupport::Supported);

        let job = engine
            .submit(request("update_category", &[id], json!({"category": "patio"})))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();

        assert_eq!(done.summary.failed, 1);
        assert_eq!(done.summary.success, 0);
        assert!(done.failures[0].error.starts_with("version conflict"));
        let item = inner.get(id).unwrap().unwrap();
        // First attempt plus three re-plans, each beaten by one edit.
        assert_eq!(item.version(), 1 + 4);
        assert_eq!(item.category(), "Garden");
    }

    #[tokio::test]
    async fn delete_between_read_and_write_replans_into_skip() {
        let inner = InMemoryItemStore::arc();
        let id = seed(&inner, true, "Garden");
        let store = RacingEdits::new(inner.clone(), id, ItemMutation::SoftDelete, 1);
        let engine = engine_over(store, TransactionSupport::Supported);

        let job = engine
            .submit(request("deactivate", &[id], JsonValue::Null))
            .unwrap();
        let done = engine.wait_for_completion(job.id, POLL, WAIT).await.unwrap();

        assert_eq!(done.summary.failed, 0);
        assert_eq!(done.summary.success, 0);
        assert_eq!(done.skipped_ids, vec![id]);
        let item = inner.get(id).unwrap().unwrap();
        assert!(item.is_deleted());
        assert_eq!(item.version(), 2);
    }
}
