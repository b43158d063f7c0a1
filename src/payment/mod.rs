//! Payment verification for tollgate.
//!
//! A claimed payment is checked against the ledger before any content is
//! released:
//!
//! ```text
//! claim(signature, content_id, sender)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Syntax check        │── malformed ──▶ reject, no I/O
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ Record cache        │── hit ───┐
//! └─────────┬───────────┘          │
//!          MISS                    │
//!           ▼                      │
//! ┌─────────────────────┐          │
//! │ Ledger lookup       │          │
//! │ (bounded timeout)   │          │
//! └─────────┬───────────┘          │
//!           ▼                      ▼
//! ┌─────────────────────────────────┐
//! │ confirmed? recipient? amount?   │
//! │ sender? fresh?                  │
//! └─────────────────────────────────┘
//! ```

mod amount;
mod cache;
mod oracle;
mod rpc_oracle;
mod validator;

pub use amount::{Lamports, CURRENCY_UNIT, LAMPORTS_PER_SOL};
pub use cache::{CacheStats, RecordCache};
pub use oracle::{MemoryOracle, TransactionOracle, TransactionRecord};
pub use rpc_oracle::{RpcOracle, RpcOracleConfig};
pub use validator::{
    short_signature, validate_address, validate_signature, PaymentClaim, PaymentPolicy,
    PaymentValidator, PaymentValidatorConfig, PaymentVerdict, RejectionReason, ADDRESS_BYTES,
    SIGNATURE_BYTES,
};
