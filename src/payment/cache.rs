//! LRU cache for finalized transaction records.
//!
//! A finalized transaction never changes, so once the ledger has reported one
//! the validator can answer repeat lookups (retries, replays, audit review)
//! without another round trip. Unconfirmed records are never cached because
//! a later lookup may find them finalized.

use crate::payment::oracle::TransactionRecord;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Default number of records kept.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Lookup counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to go to the ledger.
    pub misses: u64,
    /// Records stored.
    pub additions: u64,
}

impl CacheStats {
    /// Share of lookups answered from the cache, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 * 100.0 / lookups as f64,
        }
    }
}

struct CacheState {
    records: LruCache<String, TransactionRecord>,
    stats: CacheStats,
}

/// Signature-keyed LRU of confirmed transaction records.
pub struct RecordCache {
    state: Mutex<CacheState>,
}

impl RecordCache {
    /// Cache holding up to the default number of records.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Cache holding up to `capacity` records (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                records: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// The cached record for `signature`, counting a hit or a miss.
    pub fn get(&self, signature: &str) -> Option<TransactionRecord> {
        let mut state = self.state.lock();
        let found = state.records.get(signature).cloned();
        match found {
            Some(_) => state.stats.hits += 1,
            None => state.stats.misses += 1,
        }
        found
    }

    /// Remember `record` if it is confirmed.
    pub fn insert(&self, signature: &str, record: &TransactionRecord) {
        if !record.confirmed {
            return;
        }
        let mut state = self.state.lock();
        state.records.put(signature.to_string(), record.clone());
        state.stats.additions += 1;
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    /// Records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns true if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}
