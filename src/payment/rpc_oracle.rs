//! Solana JSON-RPC transaction oracle.
//!
//! Resolves a signature with `getTransaction` at `finalized` commitment and
//! reads the system-program transfer to the gate's recipient out of the
//! parsed instructions.

use crate::error::{Error, Result};
use crate::payment::amount::Lamports;
use crate::payment::oracle::{TransactionOracle, TransactionRecord};
use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the RPC oracle.
#[derive(Debug, Clone)]
pub struct RpcOracleConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// HTTP request timeout. The validator applies its own outer timeout too.
    pub request_timeout: Duration,
    /// Address whose incoming transfers count as payment. With `None` the
    /// first system transfer is reported.
    pub recipient_address: Option<String>,
}

impl Default for RpcOracleConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            request_timeout: Duration::from_secs(10),
            recipient_address: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmedTransaction {
    block_time: Option<i64>,
    meta: Option<TransactionMeta>,
    transaction: EncodedTransaction,
}

#[derive(Debug, Deserialize)]
struct TransactionMeta {
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EncodedTransaction {
    message: ParsedMessage,
}

#[derive(Debug, Deserialize)]
struct ParsedMessage {
    #[serde(default)]
    instructions: Vec<Value>,
}

/// Transaction oracle speaking Solana JSON-RPC over HTTP.
pub struct RpcOracle {
    http_client: reqwest::Client,
    config: RpcOracleConfig,
    request_id: AtomicU64,
}

impl RpcOracle {
    /// Create a new RPC oracle.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: RpcOracleConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config,
            request_id: AtomicU64::new(1),
        })
    }

    /// Endpoint this oracle queries.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.config.rpc_url
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<ConfirmedTransaction>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::SeqCst),
            method: "getTransaction",
            params: json!([
                signature,
                {
                    "encoding": "jsonParsed",
                    "commitment": "finalized",
                    "maxSupportedTransactionVersion": 0
                }
            ]),
        };

        let response = self
            .http_client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("RPC request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "RPC endpoint answered {}",
                response.status()
            )));
        }

        let body: JsonRpcResponse<ConfirmedTransaction> = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("Failed to parse RPC response: {e}")))?;

        if let Some(error) = body.error {
            return Err(Error::UpstreamUnavailable(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        Ok(body.result)
    }
}

#[async_trait]
impl TransactionOracle for RpcOracle {
    async fn lookup(&self, signature: &str) -> Result<Option<TransactionRecord>> {
        match self.get_transaction(signature).await {
            Ok(Some(tx)) => Ok(Some(record_from_transaction(
                &tx,
                self.config.recipient_address.as_deref(),
            ))),
            Ok(None) => {
                debug!("Transaction not found at finalized commitment");
                Ok(None)
            }
            Err(e) => {
                warn!("Ledger lookup failed: {e}");
                Err(e)
            }
        }
    }
}

/// Build a record from the system transfers in `tx`.
///
/// The first transfer into `recipient` picks the sender, and every transfer
/// from that sender into `recipient` adds to the amount. Without a matching
/// transfer the first system transfer is reported as is, and a transaction
/// with none yields an empty recipient and a zero amount. Either way the
/// validator rejects it as a recipient mismatch.
fn record_from_transaction(
    tx: &ConfirmedTransaction,
    recipient: Option<&str>,
) -> TransactionRecord {
    let confirmed = tx.meta.as_ref().is_some_and(|meta| meta.err.is_none());
    let timestamp = tx
        .block_time
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    let transfers: Vec<Transfer> = tx
        .transaction
        .message
        .instructions
        .iter()
        .filter_map(system_transfer)
        .collect();

    let payment = recipient.and_then(|recipient| {
        let first = transfers.iter().find(|t| t.destination == recipient)?;
        let total = transfers
            .iter()
            .filter(|t| t.source == first.source && t.destination == recipient)
            .fold(0u64, |sum, t| sum.saturating_add(t.lamports.get()));
        Some(Transfer {
            source: first.source.clone(),
            destination: first.destination.clone(),
            lamports: Lamports::new(total),
        })
    });

    let Transfer {
        source: sender,
        destination: recipient,
        lamports: amount,
    } = payment
        .or_else(|| transfers.into_iter().next())
        .unwrap_or_default();
    TransactionRecord {
        sender,
        recipient,
        amount,
        confirmed,
        timestamp,
    }
}

#[derive(Debug, Default)]
struct Transfer {
    source: String,
    destination: String,
    lamports: Lamports,
}

fn system_transfer(instruction: &Value) -> Option<Transfer> {
    if instruction.get("program")?.as_str()? != "system" {
        return None;
    }
    let parsed = instruction.get("parsed")?;
    match parsed.get("type")?.as_str()? {
        "transfer" | "transferWithSeed" => {}
        _ => return None,
    }
    let info = parsed.get("info")?;
    Some(Transfer {
        source: info.get("source")?.as_str()?.to_string(),
        destination: info.get("destination")?.as_str()?.to_string(),
        lamports: Lamports::new(info.get("lamports")?.as_u64()?),
    })
}
