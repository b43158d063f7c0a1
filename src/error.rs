//! Error types for tollgate.

use crate::payment::RejectionReason;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the content gate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad signature, address, amount or content id format. Rejected before any I/O.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The claimed payment did not satisfy the payment policy.
    #[error("payment unverified: {0}")]
    PaymentUnverified(RejectionReason),

    /// The transaction signature has already been redeemed.
    #[error("transaction signature already redeemed")]
    ReplayDetected,

    /// Content could not be decrypted with the supplied signature.
    ///
    /// Deliberately carries no detail: wrong key, tampered ciphertext and
    /// unknown algorithm tags are indistinguishable.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The ledger could not be reached or did not answer in time.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// No sealed content is stored under this id.
    #[error("content not found: {0}")]
    ContentNotFound(String),

    /// Content ids are write-once.
    #[error("content already published: {0}")]
    ContentExists(String),

    /// Key derivation or encryption failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Persistent store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Message safe to hand back to an unauthenticated caller.
    ///
    /// Payment rejections collapse to one message, and every way an unlock
    /// can fail after payment collapses to another, so a caller cannot learn
    /// whether a signature is unknown, wrong, or bound to other content.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed request",
            Self::PaymentUnverified(_) => "payment could not be verified",
            Self::ReplayDetected => "transaction signature already redeemed",
            Self::DecryptionFailed | Self::ContentNotFound(_) => "content could not be unlocked",
            Self::UpstreamUnavailable(_) => "payment network unavailable, try again later",
            Self::Config(_)
            | Self::Io(_)
            | Self::ContentExists(_)
            | Self::Crypto(_)
            | Self::Storage(_)
            | Self::Serialization(_) => "internal error",
        }
    }

    /// HTTP status an outer transport layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedInput(_) => 400,
            Self::PaymentUnverified(_) => 402,
            Self::DecryptionFailed | Self::ContentNotFound(_) => 403,
            Self::ReplayDetected => 409,
            Self::UpstreamUnavailable(_) => 503,
            Self::Config(_)
            | Self::Io(_)
            | Self::ContentExists(_)
            | Self::Crypto(_)
            | Self::Storage(_)
            | Self::Serialization(_) => 500,
        }
    }

    /// Returns true for errors a caller may retry with the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

/// JSON body for a `402 Payment Required` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    /// Short error title.
    pub error: &'static str,
    /// Human readable explanation.
    pub message: String,
    /// Always true; lets clients branch without parsing the status line.
    pub payment_required: bool,
}

impl PaymentRequiredBody {
    /// Body carrying the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: "Payment Required",
            message: message.into(),
            payment_required: true,
        }
    }
}

impl Default for PaymentRequiredBody {
    fn default() -> Self {
        Self::new("This endpoint requires payment to access premium content")
    }
}
