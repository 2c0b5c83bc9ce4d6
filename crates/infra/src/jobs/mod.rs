//! Bulk mutation jobs.
//!
//! ## Design
//!
//! - A job is created `pending` the moment a request is accepted
//! - One tokio task per job resolves targets sequentially, in submission order
//! - Every target ends as success, skip (already in target state) or failure
//! - Whole-job snapshots are published after each target; readers never see a torn summary
//! - Jobs live in process memory and expire after a TTL
//!
//! ## Components
//!
//! - `BulkJob`: job record and bookkeeping rules
//! - `JobStore`: snapshot storage (in-memory)
//! - `BulkJobEngine`: submission, processing loop, status, expiry
//! - `JobStatusView`: what polling clients see

pub mod engine;
pub mod status;
pub mod store;
pub mod types;

pub use engine::{BulkJobEngine, BulkRequest, EngineConfig, EngineError};
pub use status::JobStatusView;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{dedup_preserving_order, BulkJob, ItemFailure, JobId, JobStatus, JobSummary};
