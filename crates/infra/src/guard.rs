//! Version-checked single-item writes.
//!
//! Every write to an item, whether it comes from a single edit request or from
//! a bulk job, goes through [`OptimisticLockGuard::apply_versioned_write`]. The
//! guard is the only place where an item's version is compared and advanced,
//! which makes the store's version counter the sole arbiter of write order.
//!
//! ## Write Flow
//!
//! ```text
//! (id, expected_version, mutation)
//!   ↓
//! 1. Load current item (through the transaction if one is open)
//!   ↓
//! 2. Missing or soft-deleted → NotFound
//!   ↓
//! 3. expected_version != current.version → Conflict
//!   ↓
//! 4. Apply mutation (pure; field rules → Validation)
//!   ↓
//! 5. Conditional write at expected_version (store re-checks under its lock)
//! ```
//!
//! A write that loses the race between steps 3 and 5 still fails with
//! `Conflict`, because the store repeats the version check atomically.

use chrono::Utc;
use thiserror::Error;

use itemflow_core::{DomainError, ExpectedVersion, Item, ItemId, ItemMutation};

use crate::store::{ItemStore, StoreError, StoreTransaction};

/// Guarded write failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    /// The caller's version is stale.
    #[error("version conflict (current: {current_version}, provided: {provided_version})")]
    Conflict {
        current_version: u64,
        provided_version: u64,
    },

    #[error("item not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for WriteError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict {
                current_version,
                provided_version,
            } => WriteError::Conflict {
                current_version,
                provided_version,
            },
            DomainError::NotFound => WriteError::NotFound,
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::IneligibleState(msg) => WriteError::Validation(msg),
        }
    }
}

impl From<StoreError> for WriteError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionMismatch { current, expected } => WriteError::Conflict {
                current_version: current,
                provided_version: expected,
            },
            StoreError::NotFound(_) => WriteError::NotFound,
            other => WriteError::Store(other),
        }
    }
}

impl WriteError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteError::Conflict { .. })
    }
}

/// Applies mutations to items only when the caller's version is current.
#[derive(Debug, Clone)]
pub struct OptimisticLockGuard<S> {
    store: S,
}

impl<S: ItemStore> OptimisticLockGuard<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply `mutation` to item `id` if it is at `expected_version`.
    ///
    /// With `tx = None` the write is a single conditional replace. With
    /// `tx = Some(..)` the write is buffered in the transaction and becomes
    /// visible only when the caller commits.
    ///
    /// Returns the item as written (version `expected_version + 1`).
    pub fn apply_versioned_write(
        &self,
        tx: Option<&mut dyn StoreTransaction>,
        id: ItemId,
        expected_version: ExpectedVersion,
        mutation: &ItemMutation,
    ) -> Result<Item, WriteError> {
        match tx {
            Some(tx) => {
                let current = live(tx.get(id)?)?;
                let next = Self::prepare(&current, expected_version, mutation)?;
                tx.put_if_version(next.clone(), expected_version)?;
                Ok(next)
            }
            None => {
                let current = live(self.store.get(id)?)?;
                let next = Self::prepare(&current, expected_version, mutation)?;
                self.store.replace_if_version(next.clone(), expected_version)?;
                Ok(next)
            }
        }
    }

    fn prepare(
        current: &Item,
        expected_version: ExpectedVersion,
        mutation: &ItemMutation,
    ) -> Result<Item, WriteError> {
        expected_version.check(current.version())?;
        let next = current.mutated(mutation, Utc::now())?;
        debug_assert_eq!(next.version(), expected_version.next());
        Ok(next)
    }
}

fn live(item: Option<Item>) -> Result<Item, WriteError> {
    match item {
        Some(item) if !item.is_deleted() => Ok(item),
        _ => Err(WriteError::NotFound),
    }
}
