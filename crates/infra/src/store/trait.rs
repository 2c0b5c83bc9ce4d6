use std::sync::Arc;

use thiserror::Error;

use itemflow_core::{ExpectedVersion, Item, ItemId};

/// Item store operation error.
///
/// These are **infrastructure errors** (storage, races, capability) as opposed to
/// domain errors (validation, eligibility).
///
/// ## Retry classification
///
/// - **WriteConflict**: a transaction lost a race at commit; retrying re-reads state
/// - **DuplicateKey**: an insert raced another insert of the same id
/// - **Unavailable**: transient timeout or connectivity loss
///
/// Everything else is permanent for the current call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("write conflict: {0}")]
    WriteConflict(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(ItemId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write found a different version than expected.
    #[error("version mismatch (current: {current}, expected: {expected})")]
    VersionMismatch { current: u64, expected: u64 },

    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// This deployment cannot run multi-document transactions.
    #[error("transactions are not supported by this deployment")]
    TransactionsUnsupported,

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::WriteConflict(_) | StoreError::DuplicateKey(_) | StoreError::Unavailable(_)
        )
    }
}

/// Item store abstraction.
///
/// Implementations must be thread-safe; the bulk engine and request handlers
/// call into the same store concurrently.
pub trait ItemStore: Send + Sync {
    /// Load an item (soft-deleted items included).
    fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Insert a new item. Fails with `DuplicateKey` if the id is taken.
    fn insert(&self, item: Item) -> Result<(), StoreError>;

    /// Replace an item only if its stored version equals `expected`.
    ///
    /// The check and the write happen under one lock; no other writer can
    /// interleave.
    fn replace_if_version(&self, item: Item, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Begin a transaction.
    ///
    /// Returns `TransactionsUnsupported` on deployments without transaction support.
    fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// All items ordered by id.
    fn list(&self) -> Result<Vec<Item>, StoreError>;
}

/// A unit of work against the item store.
///
/// Reads observe the transaction's own buffered writes. Nothing is visible to
/// other readers until `commit` succeeds.
pub trait StoreTransaction: Send {
    fn get(&mut self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Buffer a conditional write. Fails immediately if the version visible to
    /// this transaction already differs from `expected`.
    fn put_if_version(&mut self, item: Item, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Apply every buffered write atomically.
    ///
    /// If another writer changed a touched item since it was buffered, nothing is
    /// applied and `WriteConflict` is returned.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Drop every buffered write.
    fn abort(self: Box<Self>);
}

impl<S: ItemStore + ?Sized> ItemStore for Arc<S> {
    fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get(id)
    }

    fn insert(&self, item: Item) -> Result<(), StoreError> {
        (**self).insert(item)
    }

    fn replace_if_version(&self, item: Item, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).replace_if_version(item, expected)
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        (**self).begin()
    }

    fn list(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list()
    }
}
