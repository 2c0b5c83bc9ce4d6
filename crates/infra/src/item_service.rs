//! Single-item edit path used by the HTTP layer.
//!
//! Reads go straight to the store. Every write is a versioned mutation run
//! through the retry coordinator and the optimistic lock guard, the same path
//! bulk jobs use, so a single edit and a bulk job can never both land on the
//! same base version.

use chrono::Utc;
use tracing::debug;

use itemflow_core::{ExpectedVersion, Item, ItemId, ItemMutation, ItemPatch, NewItem};

use crate::guard::{OptimisticLockGuard, WriteError};
use crate::store::ItemStore;
use crate::transaction::TransactionalRetryCoordinator;

#[derive(Debug, Clone)]
pub struct ItemService<S> {
    guard: OptimisticLockGuard<S>,
    coordinator: TransactionalRetryCoordinator<S>,
}

impl<S: ItemStore + Clone> ItemService<S> {
    /// Reads and guarded writes use the coordinator's store.
    pub fn new(coordinator: TransactionalRetryCoordinator<S>) -> Self {
        Self {
            guard: OptimisticLockGuard::new(coordinator.store().clone()),
            coordinator,
        }
    }

    /// Create an active item at version 1.
    pub fn create_item(&self, draft: NewItem) -> Result<Item, WriteError> {
        let item = Item::create(ItemId::new(), draft, Utc::now())?;
        self.guard.store().insert(item.clone())?;
        debug!(item_id = %item.id(), "item created");
        Ok(item)
    }

    /// Load a live item; soft-deleted items are `NotFound`.
    pub fn get_item(&self, id: ItemId) -> Result<Item, WriteError> {
        match self.guard.store().get(id)? {
            Some(item) if !item.is_deleted() => Ok(item),
            _ => Err(WriteError::NotFound),
        }
    }

    /// Live items ordered by id.
    pub fn list_items(&self) -> Result<Vec<Item>, WriteError> {
        Ok(self
            .guard
            .store()
            .list()?
            .into_iter()
            .filter(|item| !item.is_deleted())
            .collect())
    }

    pub async fn update_item(
        &self,
        id: ItemId,
        expected_version: ExpectedVersion,
        patch: ItemPatch,
    ) -> Result<Item, WriteError> {
        self.write(id, expected_version, ItemMutation::Patch(patch)).await
    }

    /// Soft delete.
    pub async fn delete_item(
        &self,
        id: ItemId,
        expected_version: ExpectedVersion,
    ) -> Result<Item, WriteError> {
        self.write(id, expected_version, ItemMutation::SoftDelete).await
    }

    async fn write(
        &self,
        id: ItemId,
        expected_version: ExpectedVersion,
        mutation: ItemMutation,
    ) -> Result<Item, WriteError> {
        let guard = &self.guard;
        let item = self
            .coordinator
            .run_in_transaction(|tx| {
                guard.apply_versioned_write(tx, id, expected_version, &mutation)
            })
            .await?;
        debug!(item_id = %id, version = item.version(), "item written");
        Ok(item)
    }
}
