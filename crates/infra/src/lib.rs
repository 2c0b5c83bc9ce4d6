//! Infrastructure layer: item store, guarded writes, retries, bulk jobs, config.

pub mod config;
pub mod guard;
pub mod item_service;
pub mod jobs;
pub mod store;
pub mod transaction;

pub use config::{AppConfig, ConfigError};
pub use guard::{OptimisticLockGuard, WriteError};
pub use item_service::ItemService;
pub use store::{InMemoryItemStore, ItemStore, StoreError, StoreTransaction};
pub use transaction::{RetryPolicy, Retryable, TransactionSupport, TransactionalRetryCoordinator};
