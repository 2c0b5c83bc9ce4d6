//! Optimistic concurrency primitives.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Version every item starts at.
pub const INITIAL_VERSION: u64 = 1;

/// Version a writer expects the item to be at.
///
/// Only exact matches are accepted; there is no "at least" or "any" mode.
/// Versions start at 1, so 0 is rejected at construction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ExpectedVersion(u64);

impl ExpectedVersion {
    pub fn new(version: u64) -> DomainResult<Self> {
        if version < INITIAL_VERSION {
            return Err(DomainError::validation(
                "version must be a positive integer",
            ));
        }
        Ok(Self(version))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Version the item will carry after a successful write.
    pub fn next(self) -> u64 {
        self.0 + 1
    }

    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(actual, self.0))
        }
    }
}

impl TryFrom<u64> for ExpectedVersion {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExpectedVersion> for u64 {
    fn from(value: ExpectedVersion) -> Self {
        value.0
    }
}

impl core::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
