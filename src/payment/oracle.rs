//! Ledger lookups.
//!
//! The gate never talks to the ledger directly; it asks a
//! [`TransactionOracle`] for the finalized transfer behind a signature.

use crate::error::{Error, Result};
use crate::payment::amount::Lamports;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Transfer details reported by the ledger for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Paying account.
    pub sender: String,
    /// Receiving account.
    pub recipient: String,
    /// Amount moved, in lamports.
    pub amount: Lamports,
    /// Whether the transaction reached finality without error.
    pub confirmed: bool,
    /// Block time, when the ledger reports one.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Source of truth for claimed payments.
#[async_trait]
pub trait TransactionOracle: Send + Sync {
    /// Look up the transfer behind `signature`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - Transaction known to the ledger
    /// * `Ok(None)` - Transaction not found
    ///
    /// # Errors
    ///
    /// Returns an error when the ledger cannot be queried. Callers treat
    /// this as `UpstreamUnavailable` and fail closed.
    async fn lookup(&self, signature: &str) -> Result<Option<TransactionRecord>>;
}

/// In-process oracle backed by a map.
///
/// Used for offline runs and tests. It can be switched into an
/// unavailable mode or slowed down to exercise timeout handling.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    records: RwLock<HashMap<String, TransactionRecord>>,
    unavailable: AtomicBool,
    delay: RwLock<Option<Duration>>,
    lookups: AtomicU64,
}

impl MemoryOracle {
    /// Create an empty oracle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the record returned for `signature`.
    pub fn insert(&self, signature: impl Into<String>, record: TransactionRecord) {
        self.records.write().insert(signature.into(), record);
    }

    /// Make every lookup fail as if the ledger were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every lookup by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    /// Number of lookups served, including failed ones.
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionOracle for MemoryOracle {
    async fn lookup(&self, signature: &str) -> Result<Option<TransactionRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::UpstreamUnavailable(
                "memory oracle marked unavailable".to_string(),
            ));
        }

        let record = self.records.read().get(signature).cloned();
        debug!("Memory oracle lookup found={}", record.is_some());
        Ok(record)
    }
}
