//! Item persistence boundary.
//!
//! The store keeps one record per item and enforces the version check on
//! every write. Two write paths exist: single-document conditional writes
//! (`replace_if_version`) and a buffered transaction (`begin`) that validates
//! all versions again at commit.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryItemStore;
pub use r#trait::{ItemStore, StoreError, StoreTransaction};
