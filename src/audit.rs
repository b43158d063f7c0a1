//! Tamper-evident audit trail of unlock attempts and previews.
//!
//! Entries are hash-chained: each one stores the hash of its predecessor and
//! its own hash over `prev_hash || canonical entry bytes`. Editing or
//! removing an entry in the middle of the log breaks the chain. Age-based
//! pruning drops the oldest entries; the first retained entry's `prev_hash`
//! becomes the anchor the chain is verified from.

use crate::error::{Error, Result};
use crate::payment::{Lamports, RejectionReason};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{info, warn};

/// What happened on one audited request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Payment verified and content released.
    Unlocked,
    /// Payment verification failed.
    PaymentRejected(RejectionReason),
    /// Signature had already been redeemed.
    ReplayDetected,
    /// Signature did not open the stored content.
    DecryptionFailed,
    /// No content under the requested id.
    ContentNotFound,
    /// Request failed syntax checks.
    MalformedInput,
    /// Teaser served without payment.
    PreviewServed,
    /// Payment checked on its own, without unlocking anything.
    PaymentVerified,
    /// Storage or crypto failure on the server side.
    InternalError,
}

impl AuditOutcome {
    /// Returns true for a successful unlock.
    #[must_use]
    pub fn is_unlock(self) -> bool {
        matches!(self, Self::Unlocked)
    }

    /// Stable label for logs and events.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::PaymentRejected(reason) => reason.as_str(),
            Self::ReplayDetected => "replay_detected",
            Self::DecryptionFailed => "decryption_failed",
            Self::ContentNotFound => "content_not_found",
            Self::MalformedInput => "malformed_input",
            Self::PreviewServed => "preview_served",
            Self::PaymentVerified => "payment_verified",
            Self::InternalError => "internal_error",
        }
    }
}

impl From<&Error> for AuditOutcome {
    fn from(error: &Error) -> Self {
        match error {
            Error::MalformedInput(_) => Self::MalformedInput,
            Error::PaymentUnverified(reason) => Self::PaymentRejected(*reason),
            Error::UpstreamUnavailable(_) => {
                Self::PaymentRejected(RejectionReason::UpstreamUnavailable)
            }
            Error::ReplayDetected => Self::ReplayDetected,
            Error::DecryptionFailed => Self::DecryptionFailed,
            Error::ContentNotFound(_) => Self::ContentNotFound,
            Error::Config(_)
            | Error::Io(_)
            | Error::ContentExists(_)
            | Error::Crypto(_)
            | Error::Storage(_)
            | Error::Serialization(_) => Self::InternalError,
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLogEntry {
    /// Position in the log, assigned on record.
    pub sequence: u64,
    /// Presented signature. Absent for previews.
    pub transaction_signature: Option<String>,
    /// Content requested.
    pub content_id: String,
    /// Claimed paying account, when one was given.
    pub sender_address: Option<String>,
    /// Amount transferred according to the ledger, when known.
    pub amount: Option<Lamports>,
    /// When the attempt was evaluated.
    pub verified_at: DateTime<Utc>,
    /// Result of the attempt.
    pub outcome: AuditOutcome,
    /// Hash of the previous entry.
    #[serde(with = "hex")]
    pub prev_hash: [u8; 32],
    /// Hash of this entry.
    #[serde(with = "hex")]
    pub entry_hash: [u8; 32],
}

#[derive(Serialize)]
struct CanonicalEntry<'a> {
    sequence: u64,
    transaction_signature: Option<&'a str>,
    content_id: &'a str,
    sender_address: Option<&'a str>,
    amount: Option<u64>,
    verified_at: i64,
    verified_at_nanos: u32,
    outcome: AuditOutcome,
}

impl PaymentLogEntry {
    /// Entry for an unlock attempt, stamped now.
    #[must_use]
    pub fn unlock_attempt(
        signature: impl Into<String>,
        content_id: impl Into<String>,
        sender_address: impl Into<String>,
        amount: Option<Lamports>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            sequence: 0,
            transaction_signature: Some(signature.into()),
            content_id: content_id.into(),
            sender_address: Some(sender_address.into()),
            amount,
            verified_at: Utc::now(),
            outcome,
            prev_hash: [0u8; 32],
            entry_hash: [0u8; 32],
        }
    }

    /// Entry for a served preview, stamped now.
    #[must_use]
    pub fn preview(content_id: impl Into<String>) -> Self {
        Self::preview_attempt(content_id, AuditOutcome::PreviewServed)
    }

    /// Entry for a preview request that ended with `outcome`, stamped now.
    #[must_use]
    pub fn preview_attempt(content_id: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            sequence: 0,
            transaction_signature: None,
            content_id: content_id.into(),
            sender_address: None,
            amount: None,
            verified_at: Utc::now(),
            outcome,
            prev_hash: [0u8; 32],
            entry_hash: [0u8; 32],
        }
    }

    /// Hash of this entry chained onto `prev_hash`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the entry cannot be encoded.
    pub fn compute_hash(&self, prev_hash: &[u8; 32]) -> Result<[u8; 32]> {
        let canonical = CanonicalEntry {
            sequence: self.sequence,
            transaction_signature: self.transaction_signature.as_deref(),
            content_id: &self.content_id,
            sender_address: self.sender_address.as_deref(),
            amount: self.amount.map(Lamports::get),
            verified_at: self.verified_at.timestamp(),
            verified_at_nanos: self.verified_at.timestamp_subsec_nanos(),
            outcome: self.outcome,
        };
        let bytes =
            serde_json::to_vec(&canonical).map_err(|e| Error::Serialization(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(prev_hash);
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }
}

/// Counts by outcome over the retained entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditStats {
    /// Entries retained.
    pub total: usize,
    /// Successful unlocks.
    pub unlocked: usize,
    /// Failed unlock attempts of any kind.
    pub rejected: usize,
    /// Previews served.
    pub previews: usize,
    /// Stand-alone payment checks that passed.
    pub verified: usize,
}

/// Append-only audit log.
pub trait AuditLog: Send + Sync {
    /// Append an entry, assigning its sequence number and chain hashes.
    ///
    /// A `verified_at` earlier than the last recorded one is raised to it,
    /// so stamps never decrease along the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if a second successful unlock is recorded for one
    /// signature, or if the entry cannot be hashed or stored.
    fn record(&self, entry: PaymentLogEntry) -> Result<()>;

    /// The successful entry for `signature` if one exists, otherwise the
    /// most recent entry for it.
    fn query(&self, signature: &str) -> Option<PaymentLogEntry>;

    /// All retained entries in insertion order.
    fn all(&self) -> Vec<PaymentLogEntry>;

    /// Remove entries verified more than `hours` hours ago.
    fn prune_older_than(&self, hours: u64) -> usize;

    /// Number of retained entries.
    fn len(&self) -> usize;

    /// Returns true if no entries are retained.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts by outcome.
    fn stats(&self) -> AuditStats;

    /// Recompute the hash chain over retained entries.
    ///
    /// # Errors
    ///
    /// Returns a storage error naming the first entry that does not link.
    fn verify_chain(&self) -> Result<()>;
}

#[derive(Default)]
struct AuditState {
    entries: Vec<PaymentLogEntry>,
    head: [u8; 32],
    next_sequence: u64,
    unlocked: HashSet<String>,
    /// Latest `verified_at` ever recorded, kept across pruning.
    last_verified_at: Option<DateTime<Utc>>,
}

/// In-memory audit log.
#[derive(Default)]
pub struct MemoryAuditLog {
    state: RwLock<AuditState>,
}

impl MemoryAuditLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove entries verified before `cutoff`.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.write();
        let AuditState {
            entries, unlocked, ..
        } = &mut *state;

        // Stamps never decrease, so old entries always form a prefix and
        // the retained tail still links.
        let removed = entries.partition_point(|entry| entry.verified_at < cutoff);
        for entry in entries.drain(..removed) {
            if entry.outcome.is_unlock() {
                if let Some(signature) = entry.transaction_signature {
                    unlocked.remove(&signature);
                }
            }
        }
        if removed > 0 {
            info!("Pruned {removed} audit entries older than {cutoff}");
        }
        removed
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, mut entry: PaymentLogEntry) -> Result<()> {
        let mut state = self.state.write();

        if entry.outcome.is_unlock() {
            let Some(ref signature) = entry.transaction_signature else {
                return Err(Error::Storage("unlock entry without signature".to_string()));
            };
            if state.unlocked.contains(signature) {
                warn!("Refusing second successful audit entry for one signature");
                return Err(Error::Storage(
                    "signature already has a successful entry".to_string(),
                ));
            }
        }

        if let Some(last) = state.last_verified_at {
            entry.verified_at = entry.verified_at.max(last);
        }
        entry.sequence = state.next_sequence;
        entry.prev_hash = state.head;
        entry.entry_hash = entry.compute_hash(&entry.prev_hash)?;

        if entry.outcome.is_unlock() {
            if let Some(ref signature) = entry.transaction_signature {
                state.unlocked.insert(signature.clone());
            }
        }
        state.head = entry.entry_hash;
        state.last_verified_at = Some(entry.verified_at);
        state.next_sequence += 1;
        state.entries.push(entry);
        Ok(())
    }

    fn query(&self, signature: &str) -> Option<PaymentLogEntry> {
        let state = self.state.read();
        let mut matching = state
            .entries
            .iter()
            .rev()
            .filter(|e| e.transaction_signature.as_deref() == Some(signature));
        let latest = matching.next()?;
        if latest.outcome.is_unlock() {
            return Some(latest.clone());
        }
        Some(
            matching
                .find(|e| e.outcome.is_unlock())
                .unwrap_or(latest)
                .clone(),
        )
    }

    fn all(&self) -> Vec<PaymentLogEntry> {
        self.state.read().entries.clone()
    }

    fn prune_older_than(&self, hours: u64) -> usize {
        let hours = i64::try_from(hours).unwrap_or(i64::MAX);
        let cutoff = chrono::Duration::try_hours(hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_before(cutoff)
    }

    fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    fn stats(&self) -> AuditStats {
        let state = self.state.read();
        let mut stats = AuditStats {
            total: state.entries.len(),
            ..AuditStats::default()
        };
        for entry in &state.entries {
            match entry.outcome {
                AuditOutcome::Unlocked => stats.unlocked += 1,
                AuditOutcome::PreviewServed => stats.previews += 1,
                AuditOutcome::PaymentVerified => stats.verified += 1,
                _ => stats.rejected += 1,
            }
        }
        stats
    }

    fn verify_chain(&self) -> Result<()> {
        let state = self.state.read();
        let Some(first) = state.entries.first() else {
            return Ok(());
        };

        let mut prev = first.prev_hash;
        for entry in &state.entries {
            if entry.prev_hash != prev || entry.compute_hash(&prev)? != entry.entry_hash {
                return Err(Error::Storage(format!(
                    "audit chain broken at entry {}",
                    entry.sequence
                )));
            }
            prev = entry.entry_hash;
        }
        Ok(())
    }
}
