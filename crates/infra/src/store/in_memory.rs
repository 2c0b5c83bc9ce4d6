use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use itemflow_core::{ExpectedVersion, Item, ItemId};

use super::r#trait::{ItemStore, StoreError, StoreTransaction};

type Items = Arc<RwLock<HashMap<ItemId, Item>>>;

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

/// In-memory item store.
///
/// Intended for tests/dev and single-process deployments. Built with
/// [`InMemoryItemStore::without_transactions`] it behaves like a single-node
/// database that refuses multi-document transactions.
#[derive(Debug)]
pub struct InMemoryItemStore {
    items: Items,
    transactions: bool,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            transactions: true,
        }
    }

    pub fn without_transactions() -> Self {
        Self {
            transactions: false,
            ..Self::new()
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn supports_transactions(&self) -> bool {
        self.transactions
    }
}

impl Default for InMemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore for InMemoryItemStore {
    fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(&id).cloned())
    }

    fn insert(&self, item: Item) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        if items.contains_key(&item.id()) {
            return Err(StoreError::DuplicateKey(item.id()));
        }
        items.insert(item.id(), item);
        Ok(())
    }

    fn replace_if_version(&self, item: Item, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let current = items
            .get(&item.id())
            .map(Item::version)
            .ok_or(StoreError::NotFound(item.id()))?;

        if !expected.matches(current) {
            return Err(StoreError::VersionMismatch {
                current,
                expected: expected.get(),
            });
        }

        items.insert(item.id(), item);
        Ok(())
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        if !self.transactions {
            return Err(StoreError::TransactionsUnsupported);
        }
        Ok(Box::new(InMemoryTransaction {
            items: Arc::clone(&self.items),
            writes: Vec::new(),
        }))
    }

    fn list(&self) -> Result<Vec<Item>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        let mut all: Vec<_> = items.values().cloned().collect();
        all.sort_by_key(Item::id);
        Ok(all)
    }
}

/// Buffered transaction over the shared item map.
struct InMemoryTransaction {
    items: Items,
    writes: Vec<(Item, ExpectedVersion)>,
}

impl InMemoryTransaction {
    fn buffered(&self, id: ItemId) -> Option<&Item> {
        self.writes
            .iter()
            .rev()
            .find(|(item, _)| item.id() == id)
            .map(|(item, _)| item)
    }
}

impl StoreTransaction for InMemoryTransaction {
    fn get(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
        if let Some(item) = self.buffered(id) {
            return Ok(Some(item.clone()));
        }
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(&id).cloned())
    }

    fn put_if_version(&mut self, item: Item, expected: ExpectedVersion) -> Result<(), StoreError> {
        let current = self
            .get(item.id())?
            .map(|i| i.version())
            .ok_or(StoreError::NotFound(item.id()))?;

        if !expected.matches(current) {
            return Err(StoreError::VersionMismatch {
                current,
                expected: expected.get(),
            });
        }

        self.writes.push((item, expected));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;

        // Only the first write per id is checked against the store; later
        // writes to the same id were checked against the buffer.
        let mut checked = std::collections::HashSet::new();
        for (item, expected) in &self.writes {
            if !checked.insert(item.id()) {
                continue;
            }
            let current = items.get(&item.id()).map(Item::version);
            if current != Some(expected.get()) {
                return Err(StoreError::WriteConflict(format!(
                    "item {} changed during transaction",
                    item.id()
                )));
            }
        }

        for (item, _) in self.writes {
            items.insert(item.id(), item);
        }
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}
