use std::sync::Arc;

use itemflow_infra::jobs::{BulkJobEngine, InMemoryJobStore};
use itemflow_infra::{
    AppConfig, InMemoryItemStore, ItemService, TransactionSupport, TransactionalRetryCoordinator,
};

type Store = Arc<InMemoryItemStore>;

pub type BulkEngine = BulkJobEngine<Store, Arc<InMemoryJobStore>>;

#[derive(Clone)]
pub struct AppServices {
    pub items: ItemService<Store>,
    pub bulk: BulkEngine,
}

/// In-memory wiring. `ITEMFLOW_TRANSACTIONS=unsupported` models a single-node
/// deployment: the store refuses transactions and the coordinator never asks.
pub fn build_services(config: &AppConfig) -> AppServices {
    let store: Store = match config.transactions {
        TransactionSupport::Supported => InMemoryItemStore::arc(),
        TransactionSupport::Unsupported => Arc::new(InMemoryItemStore::without_transactions()),
    };

    let coordinator = TransactionalRetryCoordinator::new(store, config.transactions, config.retry);

    AppServices {
        items: ItemService::new(coordinator.clone()),
        bulk: BulkJobEngine::new(coordinator, InMemoryJobStore::arc(), config.engine),
    }
}
