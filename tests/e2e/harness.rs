//! Test harness wiring a content gate to in-memory collaborators.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tollgate::{
    AuditLog, ContentGate, ContentStore, GateConfig, Lamports, MemoryAuditLog,
    MemoryContentStore, MemoryOracle, MemoryReplayStore, ReplayStore, ServerSecret,
    TransactionOracle, TransactionRecord,
};

/// Price used by every harness gate: 0.001 SOL.
pub const PRICE: Lamports = Lamports::new(1_000_000);

/// Knobs for [`TestHarness::with_options`].
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Per-query ledger timeout in seconds.
    pub query_timeout_secs: u64,
    /// Retries after an upstream failure.
    pub max_retries: u32,
    /// Share of lines shown in previews.
    pub preview_fraction: f64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            query_timeout_secs: 5,
            max_retries: 1,
            preview_fraction: 0.5,
        }
    }
}

/// A gate plus handles on the in-memory stores behind it.
pub struct TestHarness {
    /// The gate under test.
    pub gate: Arc<ContentGate>,
    /// Scriptable ledger.
    pub oracle: Arc<MemoryOracle>,
    /// Audit log behind the gate.
    pub audit: Arc<MemoryAuditLog>,
    /// Replay store behind the gate.
    pub replay: Arc<MemoryReplayStore>,
    /// Content store behind the gate.
    pub content: Arc<MemoryContentStore>,
}

impl TestHarness {
    /// Harness with default options.
    pub fn setup() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    /// Harness with custom options.
    pub fn with_options(options: HarnessOptions) -> Self {
        let mut config = GateConfig::new(PRICE, Self::recipient());
        config.server_secret = Some(ServerSecret::from_bytes(vec![0x42; 32]).unwrap());
        config.oracle.query_timeout_secs = options.query_timeout_secs;
        config.oracle.max_retries = options.max_retries;
        config.oracle.retry_backoff_ms = 10;
        config.content.preview_fraction = options.preview_fraction;

        let oracle = Arc::new(MemoryOracle::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let replay = Arc::new(MemoryReplayStore::new());
        let content = Arc::new(MemoryContentStore::new());

        let gate = ContentGate::builder(config)
            .oracle(Arc::clone(&oracle) as Arc<dyn TransactionOracle>)
            .audit_log(Arc::clone(&audit) as Arc<dyn AuditLog>)
            .replay_store(Arc::clone(&replay) as Arc<dyn ReplayStore>)
            .content_store(Arc::clone(&content) as Arc<dyn ContentStore>)
            .build()
            .expect("harness gate should build");

        Self {
            gate: Arc::new(gate),
            oracle,
            audit,
            replay,
            content,
        }
    }

    /// A well-formed 64-byte transaction signature.
    pub fn signature(seed: u8) -> String {
        let mut bytes = [0xA5u8; 64];
        bytes[0] = seed;
        bytes[63] = seed;
        bs58::encode(bytes).into_string()
    }

    /// A well-formed 32-byte account address.
    pub fn address(seed: u8) -> String {
        let mut bytes = [0x3Cu8; 32];
        bytes[0] = seed;
        bs58::encode(bytes).into_string()
    }

    /// The configured payee.
    pub fn recipient() -> String {
        Self::address(200)
    }

    /// The account tests pay from.
    pub fn buyer() -> String {
        Self::address(1)
    }

    /// Record a confirmed transfer of `amount` from the buyer to the payee.
    pub fn pay(&self, signature: &str, amount: Lamports) {
        self.pay_with(signature, Self::transfer(amount));
    }

    /// Record an arbitrary transaction.
    pub fn pay_with(&self, signature: &str, record: TransactionRecord) {
        self.oracle.insert(signature, record);
    }

    /// A confirmed transfer from the buyer to the payee, stamped now.
    pub fn transfer(amount: Lamports) -> TransactionRecord {
        TransactionRecord {
            sender: Self::buyer(),
            recipient: Self::recipient(),
            amount,
            confirmed: true,
            timestamp: Some(Utc::now()),
        }
    }

    /// Publish `text` under `content_id` for `signature`.
    pub fn publish(&self, content_id: &str, text: &str, signature: &str) {
        self.gate
            .publish(content_id, text, signature)
            .expect("publish should succeed");
    }

    /// Publish and pay in one step.
    pub fn publish_paid(&self, content_id: &str, text: &str, signature: &str) {
        self.publish(content_id, text, signature);
        self.pay(signature, PRICE);
    }

    /// Drop audit entries and redemption details recorded before `cutoff`.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> (usize, usize) {
        (
            self.audit.prune_before(cutoff),
            self.replay.prune_before(cutoff),
        )
    }
}
