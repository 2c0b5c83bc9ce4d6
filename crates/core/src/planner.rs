//! State-aware mutation planning.
//!
//! Given a bulk operation and the current state of one target item, decide
//! whether to write, skip (already in the target state) or reject (the item
//! cannot take this transition). Pure and deterministic: no IO, no clock.

use crate::error::DomainError;
use crate::item::{Item, ItemMutation};
use crate::operation::BulkOperation;

/// Planner decision for one target item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Apply(ItemMutation),
    Skip(String),
    Reject(DomainError),
}

impl BulkOperation {
    pub fn plan(&self, item: Option<&Item>) -> Plan {
        let Some(item) = item else {
            return Plan::Reject(DomainError::not_found());
        };

        match self {
            Self::Activate => {
                if item.is_deleted() {
                    Plan::Reject(DomainError::ineligible("cannot activate a deleted item"))
                } else if item.is_active() {
                    Plan::Skip("already active".to_string())
                } else {
                    Plan::Apply(ItemMutation::Activate)
                }
            }
            Self::Deactivate => {
                if !item.is_active() {
                    Plan::Skip("already inactive".to_string())
                } else {
                    Plan::Apply(ItemMutation::Deactivate)
                }
            }
            Self::Delete => {
                if item.is_deleted() {
                    Plan::Skip("already deleted".to_string())
                } else {
                    Plan::Apply(ItemMutation::SoftDelete)
                }
            }
            Self::UpdateCategory { category } => {
                if item.is_deleted() || !item.is_active() {
                    Plan::Reject(DomainError::ineligible(
                        "cannot update category of inactive item",
                    ))
                } else if item.category() == category {
                    Plan::Skip(format!("category already '{category}'"))
                } else {
                    Plan::Apply(ItemMutation::SetCategory {
                        category: category.clone(),
                    })
                }
            }
        }
    }
}
