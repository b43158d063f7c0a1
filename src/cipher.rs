//! Signature-bound content encryption.
//!
//! Each piece of premium content is sealed under a key derived from the
//! ledger transaction signature that pays for it:
//!
//! ```text
//! key      = HKDF-SHA256(salt = server secret, ikm = signature, info = KDF_INFO)
//! key_hash = SHA-256(KEY_HASH_DOMAIN || key)
//! sealed   = AES-256-GCM-SIV(key, random 96-bit nonce, plaintext, aad = algorithm tag)
//! ```
//!
//! The same signature always yields the same key, but the key cannot be
//! computed from the signature without the server secret.

use crate::error::{Error, Result};
use aes_gcm_siv::aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Algorithm tag stored with every sealed item.
pub const ALGORITHM: &str = "aes-256-gcm-siv";

/// HKDF info string for content keys.
const KDF_INFO: &[u8] = b"tollgate-content-key-v1";

/// Domain separator for the key fingerprint.
const KEY_HASH_DOMAIN: &[u8] = b"tollgate-key-hash-v1";

/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Derived key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Shortest accepted server secret.
pub const MIN_SECRET_BYTES: usize = 16;

/// Process-wide secret mixed into every content key.
///
/// Loaded once at startup. Never serialized; `Debug` output is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ServerSecret(Vec<u8>);

impl ServerSecret {
    /// Wrap raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is shorter than
    /// [`MIN_SECRET_BYTES`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(Error::Config(format!(
                "server secret must be at least {MIN_SECRET_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid hex or a short secret.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| Error::Config(format!("server secret is not valid hex: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Generate a random 32-byte secret.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Hex rendering, for writing a freshly generated secret out once.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Secret length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed secret.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerSecret(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for ServerSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(KEY_HASH_DOMAIN);
        hasher.update(self.0);
        hasher.finalize().into()
    }
}

/// Premium content sealed under a signature-derived key.
///
/// Immutable once created. Binary fields are hex encoded when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContent {
    /// Ciphertext followed by the authentication tag.
    #[serde(with = "hex")]
    pub ciphertext: Vec<u8>,
    /// Per-encryption random nonce.
    #[serde(with = "hex")]
    pub iv: [u8; NONCE_SIZE],
    /// Non-secret fingerprint of the derived key.
    #[serde(with = "hex")]
    pub key_hash: [u8; 32],
    /// Algorithm tag.
    pub algorithm: String,
}

/// Encrypts and decrypts content under signature-derived keys.
#[derive(Debug, Clone)]
pub struct ContentCipher {
    secret: ServerSecret,
}

impl ContentCipher {
    /// Create a cipher bound to the process-wide secret.
    #[must_use]
    pub fn new(secret: ServerSecret) -> Self {
        Self { secret }
    }

    fn derive_key(&self, signature: &str) -> Result<ContentKey> {
        if signature.is_empty() {
            return Err(Error::MalformedInput("empty signature".to_string()));
        }
        let hk = Hkdf::<Sha256>::new(Some(self.secret.as_bytes()), signature.as_bytes());
        let mut key = ContentKey([0u8; KEY_SIZE]);
        hk.expand(KDF_INFO, &mut key.0)
            .map_err(|e| Error::Crypto(format!("key derivation failed: {e}")))?;
        Ok(key)
    }

    /// Fingerprint of the key `signature` derives.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` for an empty signature.
    pub fn key_hash(&self, signature: &str) -> Result<[u8; 32]> {
        Ok(self.derive_key(signature)?.fingerprint())
    }

    /// Seal `plaintext` so only `signature` can open it.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` for an empty signature, or `Crypto` if the
    /// AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8], signature: &str) -> Result<EncryptedContent> {
        let key = self.derive_key(signature)?;
        let cipher = Aes256GcmSiv::new_from_slice(&key.0)
            .map_err(|e| Error::Crypto(format!("invalid key length: {e}")))?;

        let mut iv = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext,
                    aad: ALGORITHM.as_bytes(),
                },
            )
            .map_err(|_| Error::Crypto("encryption failed".to_string()))?;

        debug!("Sealed {} bytes of content", plaintext.len());
        Ok(EncryptedContent {
            ciphertext,
            iv,
            key_hash: key.fingerprint(),
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Cheap pre-check: does `signature` derive the key `content` was sealed with?
    ///
    /// Compares key fingerprints in constant time. A `true` answer is not a
    /// guarantee that decryption will succeed; [`Self::decrypt`] still
    /// authenticates the ciphertext.
    #[must_use]
    pub fn matches_signature(&self, content: &EncryptedContent, signature: &str) -> bool {
        self.key_hash(signature)
            .map(|hash| bool::from(hash[..].ct_eq(&content.key_hash[..])))
            .unwrap_or(false)
    }

    /// Open content sealed by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` for every failure: wrong signature,
    /// tampered ciphertext or nonce, or an unknown algorithm tag. No partial
    /// plaintext is ever returned.
    pub fn decrypt(&self, content: &EncryptedContent, signature: &str) -> Result<Vec<u8>> {
        if content.algorithm != ALGORITHM {
            return Err(Error::DecryptionFailed);
        }
        let key = self
            .derive_key(signature)
            .map_err(|_| Error::DecryptionFailed)?;
        let cipher = Aes256GcmSiv::new_from_slice(&key.0).map_err(|_| Error::DecryptionFailed)?;

        cipher
            .decrypt(
                Nonce::from_slice(&content.iv),
                Payload {
                    msg: &content.ciphertext,
                    aad: content.algorithm.as_bytes(),
                },
            )
            .map_err(|_| Error::DecryptionFailed)
    }
}
