//! Transactional retry coordinator.
//!
//! Wraps a unit of work in a store transaction and retries it when the failure
//! is transient (lost commit race, duplicate key from a concurrent insert,
//! timeout). Deployments without transaction support run the work once,
//! directly against the store.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::guard::WriteError;
use crate::store::{ItemStore, StoreError, StoreTransaction};

/// Whether the backing store can run multi-document transactions.
///
/// Decided once by the deployment layer and injected at construction; the
/// coordinator never probes for it per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSupport {
    Supported,
    Unsupported,
}

impl FromStr for TransactionSupport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supported" => Ok(Self::Supported),
            "unsupported" => Ok(Self::Unsupported),
            other => Err(format!(
                "expected 'supported' or 'unsupported', got '{other}'"
            )),
        }
    }
}

/// Retry policy for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = run once).
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Calculate delay before retry number `attempt` (0-indexed): `base * 2^attempt`, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Check if another retry is allowed after `attempt` retries have run.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Classification of failures for the retry loop.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// The store refused to open a transaction at all.
    fn is_transactions_unsupported(&self) -> bool {
        false
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        StoreError::is_retryable(self)
    }

    fn is_transactions_unsupported(&self) -> bool {
        matches!(self, StoreError::TransactionsUnsupported)
    }
}

impl Retryable for WriteError {
    fn is_retryable(&self) -> bool {
        matches!(self, WriteError::Store(e) if e.is_retryable())
    }

    fn is_transactions_unsupported(&self) -> bool {
        matches!(self, WriteError::Store(StoreError::TransactionsUnsupported))
    }
}

enum Attempt<E> {
    Unsupported,
    Failed(E),
}

/// Runs units of work in transactions, retrying transient failures with backoff.
#[derive(Debug, Clone)]
pub struct TransactionalRetryCoordinator<S> {
    store: S,
    support: TransactionSupport,
    policy: RetryPolicy,
}

impl<S: ItemStore> TransactionalRetryCoordinator<S> {
    pub fn new(store: S, support: TransactionSupport, policy: RetryPolicy) -> Self {
        Self {
            store,
            support,
            policy,
        }
    }

    /// The store transactions are opened on. Guards that write through this
    /// coordinator must be built from it.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn support(&self) -> TransactionSupport {
        self.support
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `work` inside a transaction and commit it.
    ///
    /// - `Unsupported` deployments call `work(None)` exactly once.
    /// - Retryable failures (from `work`, `begin` or `commit`) abort the
    ///   transaction and retry after `policy.delay_for_attempt(n)`, up to
    ///   `policy.max_retries` times; the last error is returned.
    /// - Non-retryable failures are returned immediately.
    /// - If the store reports that transactions are unsupported, the call
    ///   falls back to `work(None)` instead of retrying.
    pub async fn run_in_transaction<T, E, F>(&self, mut work: F) -> Result<T, E>
    where
        E: From<StoreError> + Retryable + Display,
        F: FnMut(Option<&mut dyn StoreTransaction>) -> Result<T, E>,
    {
        if self.support == TransactionSupport::Unsupported {
            return work(None);
        }

        let mut attempt = 0;
        loop {
            match self.attempt_once(&mut work) {
                Ok(value) => return Ok(value),
                Err(Attempt::Unsupported) => {
                    debug!("store refused transaction; running without one");
                    return work(None);
                }
                Err(Attempt::Failed(e))
                    if e.is_retryable() && self.policy.should_retry(attempt) =>
                {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient store failure; retrying transaction"
                    );
                    drop(e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(Attempt::Failed(e)) => return Err(e),
            }
        }
    }

    fn attempt_once<T, E, F>(&self, work: &mut F) -> Result<T, Attempt<E>>
    where
        E: From<StoreError> + Retryable,
        F: FnMut(Option<&mut dyn StoreTransaction>) -> Result<T, E>,
    {
        let mut tx = match self.store.begin() {
            Ok(tx) => tx,
            Err(StoreError::TransactionsUnsupported) => return Err(Attempt::Unsupported),
            Err(e) => return Err(Attempt::Failed(e.into())),
        };

        match work(Some(tx.as_mut())) {
            Ok(value) => match tx.commit() {
                Ok(()) => Ok(value),
                Err(StoreError::TransactionsUnsupported) => Err(Attempt::Unsupported),
                Err(e) => Err(Attempt::Failed(e.into())),
            },
            Err(e) => {
                tx.abort();
                if e.is_transactions_unsupported() {
                    Err(Attempt::Unsupported)
                } else {
                    Err(Attempt::Failed(e))
                }
            }
        }
    }
}
