//! Payment verification against the ledger.
//!
//! The validator answers one question: does the transaction behind a claimed
//! signature pay at least the configured price to the configured recipient?
//! It never writes the audit log; it reports a [`PaymentVerdict`] and leaves
//! recording to the caller.

use crate::error::{Error, Result};
use crate::payment::amount::Lamports;
use crate::payment::cache::{CacheStats, RecordCache};
use crate::payment::oracle::{TransactionOracle, TransactionRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Decoded length of a ledger transaction signature.
pub const SIGNATURE_BYTES: usize = 64;

/// Decoded length of a ledger account address.
pub const ADDRESS_BYTES: usize = 32;

/// Longest base58 rendering of a 64-byte signature.
const MAX_SIGNATURE_CHARS: usize = 88;

/// Longest base58 rendering of a 32-byte address.
const MAX_ADDRESS_CHARS: usize = 44;

/// Check that `signature` is base58 and decodes to a 64-byte signature.
///
/// # Errors
///
/// Returns `MalformedInput` otherwise. No I/O is performed.
pub fn validate_signature(signature: &str) -> Result<()> {
    validate_base58(signature, SIGNATURE_BYTES, MAX_SIGNATURE_CHARS, "signature")
}

/// Check that `address` is base58 and decodes to a 32-byte account key.
///
/// # Errors
///
/// Returns `MalformedInput` otherwise.
pub fn validate_address(address: &str) -> Result<()> {
    validate_base58(address, ADDRESS_BYTES, MAX_ADDRESS_CHARS, "address")
}

fn validate_base58(input: &str, bytes: usize, max_chars: usize, what: &str) -> Result<()> {
    if input.is_empty() || input.len() > max_chars {
        return Err(Error::MalformedInput(format!(
            "{what} has invalid length {}",
            input.len()
        )));
    }
    let decoded = bs58::decode(input)
        .into_vec()
        .map_err(|e| Error::MalformedInput(format!("{what} is not base58: {e}")))?;
    if decoded.len() != bytes {
        return Err(Error::MalformedInput(format!(
            "{what} decodes to {} bytes, expected {bytes}",
            decoded.len()
        )));
    }
    Ok(())
}

/// Abbreviated signature for log lines.
#[must_use]
pub fn short_signature(signature: &str) -> String {
    if signature.len() <= 12 || !signature.is_ascii() {
        return signature.chars().take(12).collect();
    }
    format!("{}..{}", &signature[..6], &signature[signature.len() - 4..])
}

/// The price and payee every claim is checked against.
///
/// Comes from static configuration, never from the caller, so a client
/// cannot declare its own price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPolicy {
    /// Minimum transfer.
    pub required_amount: Lamports,
    /// Account that must receive the transfer.
    pub recipient_address: String,
}

/// A caller's claim that a transaction paid for a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentClaim {
    /// Ledger transaction signature presented by the caller.
    pub transaction_signature: String,
    /// Price from policy.
    pub expected_amount: Lamports,
    /// Payee from policy.
    pub expected_recipient: String,
    /// Content being unlocked.
    pub content_id: String,
    /// Account the caller says paid.
    pub sender_address: String,
}

impl PaymentClaim {
    /// Build a claim, taking price and payee from `policy`.
    #[must_use]
    pub fn new(
        policy: &PaymentPolicy,
        transaction_signature: impl Into<String>,
        content_id: impl Into<String>,
        sender_address: impl Into<String>,
    ) -> Self {
        Self {
            transaction_signature: transaction_signature.into(),
            expected_amount: policy.required_amount,
            expected_recipient: policy.recipient_address.clone(),
            content_id: content_id.into(),
            sender_address: sender_address.into(),
        }
    }
}

/// Why a claimed payment was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Signature failed the syntax check.
    MalformedSignature,
    /// Sender address failed the syntax check.
    MalformedAddress,
    /// The ledger does not know the transaction.
    TransactionNotFound,
    /// The transaction is not finalized or failed on chain.
    TransactionUnconfirmed,
    /// Funds went to a different account.
    RecipientMismatch,
    /// Transfer was smaller than the price.
    AmountTooLow,
    /// The transfer was not sent by the claimed sender.
    SenderMismatch,
    /// The transaction is older than the payment window, or has no block time.
    PaymentExpired,
    /// The ledger could not be queried in time.
    UpstreamUnavailable,
}

impl RejectionReason {
    /// Stable identifier used in logs and audit entries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedSignature => "malformed_signature",
            Self::MalformedAddress => "malformed_address",
            Self::TransactionNotFound => "transaction_not_found",
            Self::TransactionUnconfirmed => "transaction_unconfirmed",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::AmountTooLow => "amount_too_low",
            Self::SenderMismatch => "sender_mismatch",
            Self::PaymentExpired => "payment_expired",
            Self::UpstreamUnavailable => "upstream_unavailable",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RejectionReason> for Error {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::MalformedSignature | RejectionReason::MalformedAddress => {
                Self::MalformedInput(reason.to_string())
            }
            RejectionReason::UpstreamUnavailable => Self::UpstreamUnavailable(reason.to_string()),
            _ => Self::PaymentUnverified(reason),
        }
    }
}

/// Outcome of verifying a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVerdict {
    /// The payment satisfies the policy.
    Verified(TransactionRecord),
    /// The payment was not accepted.
    Rejected {
        /// Why the claim failed.
        reason: RejectionReason,
        /// The ledger record the claim was checked against, when one was found.
        observed: Option<TransactionRecord>,
    },
}

impl PaymentVerdict {
    /// Returns true only when every policy check passed.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    /// The rejection reason, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            Self::Verified(_) => None,
            Self::Rejected { reason, .. } => Some(*reason),
        }
    }

    /// The verified ledger record, if any.
    #[must_use]
    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            Self::Verified(record) => Some(record),
            Self::Rejected { .. } => None,
        }
    }

    /// Whatever the ledger reported for the signature, verified or not.
    #[must_use]
    pub fn observed_record(&self) -> Option<&TransactionRecord> {
        match self {
            Self::Verified(record) => Some(record),
            Self::Rejected { observed, .. } => observed.as_ref(),
        }
    }

    fn rejected(reason: RejectionReason) -> Self {
        Self::Rejected {
            reason,
            observed: None,
        }
    }
}

/// Configuration for the payment validator.
#[derive(Debug, Clone)]
pub struct PaymentValidatorConfig {
    /// Bound on each ledger query.
    pub query_timeout: Duration,
    /// Reject transactions older than this. `None` disables the check.
    pub max_payment_age: Option<Duration>,
    /// Extra attempts after an upstream failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
    /// Number of finalized records to cache.
    pub cache_capacity: usize,
}

impl Default for PaymentValidatorConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            max_payment_age: Some(Duration::from_secs(24 * 3600)),
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            cache_capacity: 10_000,
        }
    }
}

/// Verifies claimed payments against a [`TransactionOracle`].
pub struct PaymentValidator {
    oracle: Arc<dyn TransactionOracle>,
    cache: RecordCache,
    config: PaymentValidatorConfig,
}

impl PaymentValidator {
    /// Create a new validator.
    #[must_use]
    pub fn new(config: PaymentValidatorConfig, oracle: Arc<dyn TransactionOracle>) -> Self {
        info!(
            "Payment validator initialized (timeout={:?}, max_age={:?}, retries={})",
            config.query_timeout, config.max_payment_age, config.max_retries
        );
        Self {
            oracle,
            cache: RecordCache::with_capacity(config.cache_capacity),
            config,
        }
    }

    /// Verify a claim with a single ledger query.
    ///
    /// 1. Syntax-check signature and sender (no I/O)
    /// 2. Query the ledger (bounded by `query_timeout`)
    /// 3. Require a confirmed transaction
    /// 4. Require the configured recipient and at least the configured amount
    /// 5. Require the claimed sender and, if enabled, a fresh transaction
    pub async fn verify_payment(&self, claim: &PaymentClaim) -> PaymentVerdict {
        let signature = &claim.transaction_signature;

        if validate_signature(signature).is_err() {
            debug!("Rejecting malformed signature {}", short_signature(signature));
            return PaymentVerdict::rejected(RejectionReason::MalformedSignature);
        }
        if validate_address(&claim.sender_address).is_err() {
            return PaymentVerdict::rejected(RejectionReason::MalformedAddress);
        }

        let record = match self.fetch_record(signature).await {
            Ok(Some(record)) => record,
            Ok(None) => return PaymentVerdict::rejected(RejectionReason::TransactionNotFound),
            Err(e) => {
                warn!(
                    "Ledger lookup for {} failed: {e}",
                    short_signature(signature)
                );
                return PaymentVerdict::rejected(RejectionReason::UpstreamUnavailable);
            }
        };

        match self.check_record(claim, &record) {
            Some(reason) => {
                debug!(
                    "Payment {} rejected: {reason}",
                    short_signature(signature)
                );
                PaymentVerdict::Rejected {
                    reason,
                    observed: Some(record),
                }
            }
            None => {
                info!(
                    "Payment {} verified ({} lamports)",
                    short_signature(signature),
                    record.amount.get()
                );
                PaymentVerdict::Verified(record)
            }
        }
    }

    /// Verify a claim, retrying upstream failures with exponential backoff.
    ///
    /// Only `UpstreamUnavailable` is retried; every other verdict is final.
    pub async fn verify_with_retry(&self, claim: &PaymentClaim) -> PaymentVerdict {
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0;
        loop {
            let verdict = self.verify_payment(claim).await;
            if verdict.rejection() != Some(RejectionReason::UpstreamUnavailable)
                || attempt >= self.config.max_retries
            {
                return verdict;
            }
            attempt += 1;
            debug!(
                "Retrying ledger lookup (attempt {attempt}/{}) after {backoff:?}",
                self.config.max_retries
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    async fn fetch_record(&self, signature: &str) -> Result<Option<TransactionRecord>> {
        if let Some(record) = self.cache.get(signature) {
            return Ok(Some(record));
        }

        let record = tokio::time::timeout(self.config.query_timeout, self.oracle.lookup(signature))
            .await
            .map_err(|_| Error::UpstreamUnavailable("ledger query timed out".to_string()))??;

        if let Some(ref record) = record {
            self.cache.insert(signature, record);
        }
        Ok(record)
    }

    fn check_record(
        &self,
        claim: &PaymentClaim,
        record: &TransactionRecord,
    ) -> Option<RejectionReason> {
        if !record.confirmed {
            return Some(RejectionReason::TransactionUnconfirmed);
        }
        if record.recipient != claim.expected_recipient {
            return Some(RejectionReason::RecipientMismatch);
        }
        if record.amount < claim.expected_amount {
            return Some(RejectionReason::AmountTooLow);
        }
        if record.sender != claim.sender_address {
            return Some(RejectionReason::SenderMismatch);
        }
        if let Some(max_age) = self.config.max_payment_age {
            let Some(paid_at) = record.timestamp else {
                return Some(RejectionReason::PaymentExpired);
            };
            let age = Utc::now().signed_duration_since(paid_at);
            if chrono::Duration::from_std(max_age).is_ok_and(|max_age| age > max_age) {
                return Some(RejectionReason::PaymentExpired);
            }
        }
        None
    }

    /// Ledger record cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
