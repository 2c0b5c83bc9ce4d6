//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// eligibility, version conflicts). Storage concerns belong to the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The item does not exist or has been soft-deleted.
    #[error("item not found")]
    NotFound,

    /// Optimistic concurrency failure: the caller's version is stale.
    #[error("version conflict (current: {current_version}, provided: {provided_version})")]
    Conflict {
        current_version: u64,
        provided_version: u64,
    },

    /// The item is in a state the requested operation cannot act on.
    #[error("{0}")]
    IneligibleState(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn ineligible(msg: impl Into<String>) -> Self {
        Self::IneligibleState(msg.into())
    }

    pub fn conflict(current_version: u64, provided_version: u64) -> Self {
        Self::Conflict {
            current_version,
            provided_version,
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
