//! `itemflow-core` — item model and bulk planning building blocks.
//!
//! This crate contains **pure domain** logic (no infrastructure concerns):
//! the versioned [`Item`], the optimistic-concurrency [`ExpectedVersion`], and
//! the state-aware [`Plan`] decision for bulk operations.

pub mod error;
pub mod id;
pub mod item;
pub mod operation;
pub mod planner;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::ItemId;
pub use item::{normalize_category, Item, ItemMutation, ItemPatch, NewItem};
pub use operation::BulkOperation;
pub use planner::Plan;
pub use version::{ExpectedVersion, INITIAL_VERSION};
