//! The content gate: publish, preview, and pay-to-unlock.

use crate::audit::{AuditLog, AuditOutcome, MemoryAuditLog, PaymentLogEntry};
use crate::cipher::ContentCipher;
use crate::config::GateConfig;
use crate::content::{validate_content_id, ContentStore, FileContentStore, StoredContent};
use crate::error::{Error, Result};
use crate::event::{create_event_channel, GateEvent, GateEventsChannel, GateEventsSender};
use crate::payment::{
    short_signature, validate_address, validate_signature, Lamports, PaymentClaim,
    PaymentPolicy, PaymentValidator, PaymentVerdict, RpcOracle, TransactionOracle,
};
use crate::preview::PreviewRedactor;
use crate::replay::{MemoryReplayStore, ReplayStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Longest signature text copied into an audit entry for malformed requests.
const MAX_AUDITED_INPUT: usize = 128;

/// Builder for constructing a content gate.
///
/// Any collaborator left unset gets its default: an RPC oracle from the
/// config, a file-backed content store under `content.store_dir`, and
/// in-memory replay and audit stores.
pub struct GateBuilder {
    config: GateConfig,
    oracle: Option<Arc<dyn TransactionOracle>>,
    replay: Option<Arc<dyn ReplayStore>>,
    audit: Option<Arc<dyn AuditLog>>,
    content: Option<Arc<dyn ContentStore>>,
}

impl GateBuilder {
    /// Create a new gate builder with the given configuration.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            oracle: None,
            replay: None,
            audit: None,
            content: None,
        }
    }

    /// Use `oracle` for ledger lookups.
    #[must_use]
    pub fn oracle(mut self, oracle: Arc<dyn TransactionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Use `replay` to track redeemed signatures.
    #[must_use]
    pub fn replay_store(mut self, replay: Arc<dyn ReplayStore>) -> Self {
        self.replay = Some(replay);
        self
    }

    /// Use `audit` as the audit log.
    #[must_use]
    pub fn audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Use `content` to hold sealed content.
    #[must_use]
    pub fn content_store(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    /// Validate the configuration and build the gate.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a default
    /// collaborator cannot be created.
    pub fn build(self) -> Result<ContentGate> {
        self.config.validate()?;
        let secret = self
            .config
            .server_secret
            .clone()
            .ok_or_else(|| Error::Config("server secret missing".to_string()))?;

        let oracle = match self.oracle {
            Some(oracle) => oracle,
            None => Arc::new(RpcOracle::new(self.config.rpc_oracle_config())?),
        };
        let content = match self.content {
            Some(content) => content,
            None => Arc::new(FileContentStore::open(&self.config.content.store_dir)?),
        };
        let replay = self
            .replay
            .unwrap_or_else(|| Arc::new(MemoryReplayStore::new()));
        let audit = self.audit.unwrap_or_else(|| Arc::new(MemoryAuditLog::new()));

        let policy = self.config.payment_policy();
        let (events_tx, _) = create_event_channel();

        info!(
            "Content gate ready (price={} lamports, recipient={})",
            policy.required_amount.get(),
            policy.recipient_address
        );

        Ok(ContentGate {
            validator: PaymentValidator::new(self.config.validator_config(), oracle),
            cipher: ContentCipher::new(secret),
            redactor: PreviewRedactor::new(policy.clone()),
            policy,
            replay,
            audit,
            content,
            locks: SignatureLocks::default(),
            preview_fraction: self.config.content.preview_fraction,
            retention_hours: self.config.audit.retention_hours,
            prune_interval: Duration::from_secs(
                self.config.audit.prune_interval_mins.max(1).saturating_mul(60),
            ),
            events_tx,
        })
    }
}

/// Per-signature async locks, so one signature is processed at a time.
#[derive(Default)]
struct SignatureLocks {
    inner: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SignatureLocks {
    async fn acquire(&self, signature: &str) -> SignatureLockGuard<'_> {
        let mutex = Arc::clone(self.inner.lock().entry(signature.to_string()).or_default());
        let guard = mutex.lock_owned().await;
        SignatureLockGuard {
            locks: self,
            signature: signature.to_string(),
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

struct SignatureLockGuard<'a> {
    locks: &'a SignatureLocks,
    signature: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SignatureLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock();
        // Only the map still holds the mutex: nobody is waiting on it.
        if map
            .get(&self.signature)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            map.remove(&self.signature);
        }
    }
}

/// Payment-bound content gate.
pub struct ContentGate {
    policy: PaymentPolicy,
    validator: PaymentValidator,
    cipher: ContentCipher,
    redactor: PreviewRedactor,
    replay: Arc<dyn ReplayStore>,
    audit: Arc<dyn AuditLog>,
    content: Arc<dyn ContentStore>,
    locks: SignatureLocks,
    preview_fraction: f64,
    retention_hours: u64,
    prune_interval: Duration,
    events_tx: GateEventsSender,
}

impl ContentGate {
    /// Start building a gate.
    #[must_use]
    pub fn builder(config: GateConfig) -> GateBuilder {
        GateBuilder::new(config)
    }

    /// Seal `plaintext` for the buyer whose payment will carry `signature`
    /// and store it, together with its preview, under `content_id`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` for a bad id or signature and
    /// `ContentExists` if the id is already taken.
    pub fn publish(&self, content_id: &str, plaintext: &str, signature: &str) -> Result<()> {
        validate_content_id(content_id)?;
        validate_signature(signature)?;

        let stored = StoredContent {
            encrypted: self.cipher.encrypt(plaintext.as_bytes(), signature)?,
            preview: self
                .redactor
                .create_preview(plaintext, self.preview_fraction),
        };
        self.content.put(content_id, stored)?;

        info!(
            "Published {content_id} for {}",
            short_signature(signature)
        );
        let _ = self.events_tx.send(GateEvent::ContentPublished {
            content_id: content_id.to_string(),
        });
        Ok(())
    }

    /// Teaser and payment instructions for `content_id`. No payment needed.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` for a bad id or `ContentNotFound`.
    pub fn preview(&self, content_id: &str) -> Result<String> {
        let stored = match self.load_preview(content_id) {
            Ok(stored) => stored,
            Err(e) => {
                debug!("Preview of {} refused: {e}", audited_input(content_id));
                self.record_audit(PaymentLogEntry::preview_attempt(
                    audited_input(content_id),
                    AuditOutcome::from(&e),
                ));
                return Err(e);
            }
        };

        self.record_audit(PaymentLogEntry::preview(content_id));
        let _ = self.events_tx.send(GateEvent::PreviewServed {
            content_id: content_id.to_string(),
        });
        Ok(stored.preview)
    }

    fn load_preview(&self, content_id: &str) -> Result<StoredContent> {
        validate_content_id(content_id)?;
        self.content
            .get(content_id)?
            .ok_or_else(|| Error::ContentNotFound(content_id.to_string()))
    }

    /// Check a payment without unlocking anything or consuming the signature.
    ///
    /// The verdict is recorded in the audit log.
    pub async fn verify_payment(
        &self,
        signature: &str,
        content_id: &str,
        sender_address: &str,
    ) -> PaymentVerdict {
        let claim = PaymentClaim::new(&self.policy, signature, content_id, sender_address);
        let verdict = self.validator.verify_with_retry(&claim).await;

        let amount = verdict.observed_record().map(|record| record.amount);
        let outcome = match verdict.rejection() {
            None => AuditOutcome::PaymentVerified,
            Some(reason) => AuditOutcome::PaymentRejected(reason),
        };
        self.record_audit(PaymentLogEntry::unlock_attempt(
            audited_input(signature),
            audited_input(content_id),
            audited_input(sender_address),
            amount,
            outcome,
        ));
        verdict
    }

    /// Release the plaintext of `content_id` to the payer of `signature`.
    ///
    /// Fails closed on every error. Each call leaves exactly one audit entry.
    /// Concurrent calls with the same signature are serialized, so at most
    /// one of them can succeed.
    ///
    /// # Errors
    ///
    /// * `MalformedInput` - bad signature, sender, or content id
    /// * `ReplayDetected` - signature already redeemed
    /// * `PaymentUnverified` - ledger record does not satisfy the policy
    /// * `UpstreamUnavailable` - ledger unreachable after retries
    /// * `ContentNotFound` / `DecryptionFailed` - signature does not open this content
    pub async fn unlock(
        &self,
        signature: &str,
        content_id: &str,
        sender_address: &str,
    ) -> Result<Vec<u8>> {
        let syntax = validate_signature(signature)
            .and_then(|()| validate_address(sender_address))
            .and_then(|()| validate_content_id(content_id));
        if let Err(e) = syntax {
            self.record_audit(PaymentLogEntry::unlock_attempt(
                audited_input(signature),
                audited_input(content_id),
                audited_input(sender_address),
                None,
                AuditOutcome::MalformedInput,
            ));
            self.emit_rejected(content_id, AuditOutcome::MalformedInput);
            return Err(e);
        }

        let _lock = self.locks.acquire(signature).await;
        let claim = PaymentClaim::new(&self.policy, signature, content_id, sender_address);
        let (amount, result) = self.unlock_serialized(&claim).await;

        let outcome = match &result {
            Ok(_) => AuditOutcome::Unlocked,
            Err(e) => AuditOutcome::from(e),
        };
        let entry =
            PaymentLogEntry::unlock_attempt(signature, content_id, sender_address, amount, outcome);

        match result {
            Ok(plaintext) => {
                // Content is only released once the redemption is on record.
                if let Err(e) = self.audit.record(entry) {
                    error!(
                        "Audit write failed for unlock of {content_id}, withholding content: {e}"
                    );
                    return Err(e);
                }
                info!(
                    "Unlocked {content_id} for {}",
                    short_signature(signature)
                );
                let _ = self.events_tx.send(GateEvent::ContentUnlocked {
                    content_id: content_id.to_string(),
                });
                Ok(plaintext)
            }
            Err(e) => {
                warn!(
                    "Unlock of {content_id} by {} rejected: {}",
                    short_signature(signature),
                    outcome.label()
                );
                self.record_audit(entry);
                self.emit_rejected(content_id, outcome);
                Err(e)
            }
        }
    }

    /// The pipeline that runs while the signature lock is held.
    ///
    /// Returns the ledger amount (when verification got that far) alongside
    /// the result, for the audit entry.
    async fn unlock_serialized(&self, claim: &PaymentClaim) -> (Option<Lamports>, Result<Vec<u8>>) {
        let signature = claim.transaction_signature.as_str();

        if self.replay.is_used(signature) {
            return (None, Err(Error::ReplayDetected));
        }

        let record = match self.validator.verify_with_retry(claim).await {
            PaymentVerdict::Verified(record) => record,
            PaymentVerdict::Rejected { reason, observed } => {
                return (observed.map(|record| record.amount), Err(reason.into()));
            }
        };
        let amount = Some(record.amount);

        let stored = match self.content.get(&claim.content_id) {
            Ok(Some(stored)) => stored,
            Ok(None) => return (amount, Err(Error::ContentNotFound(claim.content_id.clone()))),
            Err(e) => return (amount, Err(e)),
        };

        // Reject a signature sealed for other content before consuming it.
        if !self.cipher.matches_signature(&stored.encrypted, signature) {
            debug!("Key hash mismatch for {}", claim.content_id);
            return (amount, Err(Error::DecryptionFailed));
        }

        if !self.replay.mark_used(signature, claim) {
            return (amount, Err(Error::ReplayDetected));
        }

        (amount, self.cipher.decrypt(&stored.encrypted, signature))
    }

    /// Prune audit entries and redemption details past the retention window.
    ///
    /// Returns `(audit entries removed, redemption records removed)`.
    pub fn prune(&self) -> (usize, usize) {
        let audit_entries = self.audit.prune_older_than(self.retention_hours);
        let redemptions = self
            .replay
            .clear_older_than(Duration::from_secs(self.retention_hours.saturating_mul(3600)));

        if audit_entries > 0 || redemptions > 0 {
            let _ = self.events_tx.send(GateEvent::AuditPruned {
                audit_entries,
                redemptions,
            });
        }
        (audit_entries, redemptions)
    }

    /// Run [`Self::prune`] on the configured interval until `shutdown` flips to true.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Maintenance task stopping");
                            break;
                        }
                    }
                    () = tokio::time::sleep(gate.prune_interval) => {
                        let (audit_entries, redemptions) = gate.prune();
                        debug!(
                            "Maintenance pruned {audit_entries} audit entries, \
                             {redemptions} redemptions"
                        );
                    }
                }
            }
        })
    }

    /// Returns true if `signature` has been redeemed.
    #[must_use]
    pub fn is_used(&self, signature: &str) -> bool {
        self.replay.is_used(signature)
    }

    /// The audit log.
    #[must_use]
    pub fn audit_log(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// The price and payee in force.
    #[must_use]
    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    /// The preview renderer.
    #[must_use]
    pub fn redactor(&self) -> &PreviewRedactor {
        &self.redactor
    }

    /// The payment validator.
    #[must_use]
    pub fn validator(&self) -> &PaymentValidator {
        &self.validator
    }

    /// Subscribe to gate events.
    #[must_use]
    pub fn subscribe_events(&self) -> GateEventsChannel {
        self.events_tx.subscribe()
    }

    /// Number of signatures currently being processed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }

    fn record_audit(&self, entry: PaymentLogEntry) {
        if let Err(e) = self.audit.record(entry) {
            error!("Failed to write audit entry: {e}");
        }
    }

    fn emit_rejected(&self, content_id: &str, outcome: AuditOutcome) {
        let _ = self.events_tx.send(GateEvent::UnlockRejected {
            content_id: content_id.to_string(),
            reason: outcome.label().to_string(),
        });
    }
}

fn audited_input(input: &str) -> String {
    input.chars().take(MAX_AUDITED_INPUT).collect()
}
