//! Replay protection for redeemed transaction signatures.
//!
//! A signature moves `Unseen -> Used` exactly once and never back. The store
//! keeps two things per redeemed signature:
//!
//! - a SHA-256 digest of the signature, kept for the life of the store
//! - a [`RedemptionRecord`] with bookkeeping detail, which pruning may drop
//!
//! Pruning only forgets detail. A pruned signature is still reported as used.

use crate::payment::{Lamports, PaymentClaim};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

type SignatureDigest = [u8; 32];

fn digest(signature: &str) -> SignatureDigest {
    Sha256::digest(signature.as_bytes()).into()
}

/// Storage for consumed signatures.
///
/// Implementations must make [`ReplayStore::mark_used`] an atomic
/// insert-if-absent so two concurrent redemptions of one signature cannot
/// both succeed.
pub trait ReplayStore: Send + Sync {
    /// Returns true if `signature` has been redeemed.
    fn is_used(&self, signature: &str) -> bool;

    /// Mark `signature` as redeemed by `claim`.
    ///
    /// Returns false, and changes nothing, if it was already used.
    fn mark_used(&self, signature: &str, claim: &PaymentClaim) -> bool;

    /// Drop bookkeeping older than `age`. Returns the number of records removed.
    ///
    /// Signatures stay marked as used.
    fn clear_older_than(&self, age: Duration) -> usize;

    /// Number of signatures ever redeemed.
    fn len(&self) -> usize;

    /// Returns true if nothing has been redeemed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Detail kept about a redemption until it is pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionRecord {
    /// Content unlocked.
    pub content_id: String,
    /// Paying account.
    pub sender_address: String,
    /// Price in force when the signature was redeemed.
    pub price: Lamports,
    /// When the signature was consumed.
    pub used_at: DateTime<Utc>,
}

#[derive(Default)]
struct ReplayState {
    used: HashSet<SignatureDigest>,
    details: HashMap<SignatureDigest, RedemptionRecord>,
}

/// In-memory replay store.
#[derive(Default)]
pub struct MemoryReplayStore {
    state: Mutex<ReplayState>,
}

impl MemoryReplayStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redemption detail for `signature`, if not yet pruned.
    #[must_use]
    pub fn redemption(&self, signature: &str) -> Option<RedemptionRecord> {
        self.state.lock().details.get(&digest(signature)).cloned()
    }

    /// Number of redemption records still held.
    #[must_use]
    pub fn detail_count(&self) -> usize {
        self.state.lock().details.len()
    }

    /// Drop detail records consumed before `cutoff`.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let before = state.details.len();
        state.details.retain(|_, record| record.used_at >= cutoff);
        let removed = before - state.details.len();
        if removed > 0 {
            info!(
                "Pruned {removed} redemption records ({} signatures remain blocked)",
                state.used.len()
            );
        }
        removed
    }
}

impl ReplayStore for MemoryReplayStore {
    fn is_used(&self, signature: &str) -> bool {
        self.state.lock().used.contains(&digest(signature))
    }

    fn mark_used(&self, signature: &str, claim: &PaymentClaim) -> bool {
        let key = digest(signature);
        let mut state = self.state.lock();
        if !state.used.insert(key) {
            debug!("Signature already marked used");
            return false;
        }
        state.details.insert(
            key,
            RedemptionRecord {
                content_id: claim.content_id.clone(),
                sender_address: claim.sender_address.clone(),
                price: claim.expected_amount,
                used_at: Utc::now(),
            },
        );
        true
    }

    fn clear_older_than(&self, age: Duration) -> usize {
        // An age reaching past the representable range prunes nothing.
        let cutoff = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_before(cutoff)
    }

    fn len(&self) -> usize {
        self.state.lock().used.len()
    }
}
