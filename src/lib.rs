//! # tollgate
//!
//! Payment-bound content gate. Premium text is sealed with a key derived from
//! the ledger transaction signature that pays for it, and is only released
//! after that payment has been verified against the ledger.
//!
//! ## Unlock pipeline
//!
//! ```text
//! unlock(signature, content_id, sender)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Syntax checks       │──── malformed ──▶ MalformedInput
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ Per-signature lock  │
//! │ + replay check      │──── used ───────▶ ReplayDetected
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ Verify payment      │──── rejected ───▶ PaymentUnverified
//! │ (ledger lookup)     │──── timeout ────▶ UpstreamUnavailable
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ Load content        │──── missing ────▶ ContentNotFound
//! │ + key hash check    │──── mismatch ───▶ DecryptionFailed
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ Mark used, decrypt  │
//! └─────────┬───────────┘
//!           ▼
//!       plaintext
//! ```
//!
//! Every attempt, whichever branch it takes, leaves exactly one entry in the
//! audit log.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod audit;
pub mod cipher;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod gate;
pub mod payment;
pub mod preview;
pub mod replay;

pub use audit::{AuditLog, AuditOutcome, AuditStats, MemoryAuditLog, PaymentLogEntry};
pub use cipher::{ContentCipher, EncryptedContent, ServerSecret};
pub use config::GateConfig;
pub use content::{ContentStore, FileContentStore, MemoryContentStore, StoredContent};
pub use error::{Error, PaymentRequiredBody, Result};
pub use event::{GateEvent, GateEventsChannel, GateEventsSender};
pub use gate::{ContentGate, GateBuilder};
pub use payment::{
    Lamports, MemoryOracle, PaymentClaim, PaymentValidator, PaymentVerdict, RejectionReason,
    RpcOracle, TransactionOracle, TransactionRecord,
};
pub use preview::PreviewRedactor;
pub use replay::{MemoryReplayStore, ReplayStore};
