//! Configuration for tollgate.

use crate::cipher::ServerSecret;
use crate::error::{Error, Result};
use crate::payment::{
    validate_address, Lamports, PaymentPolicy, PaymentValidatorConfig, RpcOracleConfig,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable the server secret may be read from.
pub const SERVER_SECRET_ENV: &str = "TOLLGATE_SERVER_SECRET";

/// Gate configuration.
///
/// Loaded once at startup and validated with [`GateConfig::validate`];
/// treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Price and payee.
    pub payment: PaymentConfig,

    /// Ledger access.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Content storage and previews.
    #[serde(default)]
    pub content: ContentConfig,

    /// Audit retention.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Secret mixed into every content key. Never written back out.
    #[serde(default, skip_serializing)]
    pub server_secret: Option<ServerSecret>,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Payment policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Price as a decimal SOL string, e.g. `"0.001"`.
    pub required_amount: Lamports,

    /// Account that must receive payment (base58).
    pub recipient_address: String,

    /// Reject transactions older than this many seconds (0 disables).
    #[serde(default = "default_max_payment_age")]
    pub max_payment_age_secs: u64,
}

/// Ledger oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Timeout for each ledger query in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Retries after an upstream failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Finalized transactions kept in the lookup cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Content configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Directory for sealed content files.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Share of lines shown in previews, between 0 and 1.
    #[serde(default = "default_preview_fraction")]
    pub preview_fraction: f64,
}

/// Audit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Hours audit entries and redemption details are kept.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Minutes between background pruning runs.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_mins: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            query_timeout_secs: default_query_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            preview_fraction: default_preview_fraction(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            prune_interval_mins: default_prune_interval(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tollgate")
        .map(|dirs| dirs.data_dir().join("content"))
        .unwrap_or_else(|| PathBuf::from(".tollgate/content"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_url() -> String {
    RpcOracleConfig::default().rpc_url
}

const fn default_max_payment_age() -> u64 {
    24 * 3600
}

const fn default_query_timeout() -> u64 {
    10
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_retry_backoff() -> u64 {
    250
}

const fn default_cache_capacity() -> usize {
    10_000
}

const fn default_preview_fraction() -> f64 {
    0.3
}

const fn default_retention_hours() -> u64 {
    24 * 7
}

const fn default_prune_interval() -> u64 {
    60
}

impl GateConfig {
    /// Config with the given price and payee and defaults elsewhere.
    #[must_use]
    pub fn new(required_amount: Lamports, recipient_address: impl Into<String>) -> Self {
        Self {
            payment: PaymentConfig {
                required_amount,
                recipient_address: recipient_address.into(),
                max_payment_age_secs: default_max_payment_age(),
            },
            oracle: OracleConfig::default(),
            content: ContentConfig::default(),
            audit: AuditConfig::default(),
            server_secret: None,
            log_level: default_log_level(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file. The server secret is omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill in the server secret from [`SERVER_SECRET_ENV`] if none is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but not a valid secret.
    pub fn load_secret_from_env(&mut self) -> Result<()> {
        if self.server_secret.is_none() {
            if let Ok(encoded) = std::env::var(SERVER_SECRET_ENV) {
                self.server_secret = Some(ServerSecret::from_hex(&encoded)?);
            }
        }
        Ok(())
    }

    /// Check every startup invariant.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.payment.required_amount.is_zero() {
            return Err(Error::Config(
                "payment.required_amount must be greater than zero".to_string(),
            ));
        }
        validate_address(&self.payment.recipient_address).map_err(|e| {
            Error::Config(format!("payment.recipient_address is invalid: {e}"))
        })?;
        if self.server_secret.is_none() {
            return Err(Error::Config(format!(
                "server secret missing; set server_secret or {SERVER_SECRET_ENV}"
            )));
        }
        if !(0.0..=1.0).contains(&self.content.preview_fraction) {
            return Err(Error::Config(
                "content.preview_fraction must be between 0 and 1".to_string(),
            ));
        }
        if self.oracle.query_timeout_secs == 0 {
            return Err(Error::Config(
                "oracle.query_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Price and payee every claim is checked against.
    #[must_use]
    pub fn payment_policy(&self) -> PaymentPolicy {
        PaymentPolicy {
            required_amount: self.payment.required_amount,
            recipient_address: self.payment.recipient_address.clone(),
        }
    }

    /// Validator settings derived from this config.
    #[must_use]
    pub fn validator_config(&self) -> PaymentValidatorConfig {
        PaymentValidatorConfig {
            query_timeout: Duration::from_secs(self.oracle.query_timeout_secs),
            max_payment_age: (self.payment.max_payment_age_secs > 0)
                .then(|| Duration::from_secs(self.payment.max_payment_age_secs)),
            max_retries: self.oracle.max_retries,
            retry_backoff: Duration::from_millis(self.oracle.retry_backoff_ms),
            cache_capacity: self.oracle.cache_capacity,
        }
    }

    /// RPC oracle settings derived from this config.
    #[must_use]
    pub fn rpc_oracle_config(&self) -> RpcOracleConfig {
        RpcOracleConfig {
            rpc_url: self.oracle.rpc_url.clone(),
            request_timeout: Duration::from_secs(self.oracle.query_timeout_secs),
            recipient_address: Some(self.payment.recipient_address.clone()),
        }
    }
}
