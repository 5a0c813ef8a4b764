//! Ethereum-style JSON-RPC ledger.
//!
//! Calls `storeDecision(string,string,string,uint256)` on a registry contract
//! through `eth_sendTransaction` from an unlocked node account, then polls
//! `eth_getTransactionReceipt` until the transaction is mined.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{LedgerAnchor, LedgerClient, LedgerError, TxId};

/// Connection settings for a JSON-RPC node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcLedgerConfig {
    /// Node RPC endpoint
    pub url: String,
    /// Sending account
    pub from: String,
    /// Registry contract address
    pub contract: String,
    /// 4-byte selector of `storeDecision(string,string,string,uint256)`, hex
    pub selector: String,
    /// Receipt polling interval (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Time to wait for a receipt (ms)
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_confirmation_timeout_ms() -> u64 {
    30_000
}

impl Default for JsonRpcLedgerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            from: String::new(),
            contract: String::new(),
            selector: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
        }
    }
}

/// Parse a hex function selector such as `0x1a2b3c4d`.
pub fn parse_selector(raw: &str) -> Result<[u8; 4], String> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    <[u8; 4]>::try_from(bytes.as_slice())
        .map_err(|_| format!("selector must be 4 bytes, got {}", bytes.len()))
}

fn word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// ABI-encode a `storeDecision` call.
pub fn encode_store_decision(selector: &[u8; 4], anchor: &LedgerAnchor) -> Vec<u8> {
    let strings = [
        anchor.previous_database_cid.as_str(),
        anchor.explanation_cid.as_str(),
        anchor.decision_label.as_str(),
    ];
    let head_len = 32 * (strings.len() as u64 + 1);

    let mut head = Vec::with_capacity(head_len as usize);
    let mut tail = Vec::new();
    for s in strings {
        head.extend_from_slice(&word(head_len + tail.len() as u64));
        tail.extend_from_slice(&word(s.len() as u64));
        tail.extend_from_slice(s.as_bytes());
        let padding = (32 - s.len() % 32) % 32;
        tail.resize(tail.len() + padding, 0);
    }
    head.extend_from_slice(&word(anchor.participant_ref));

    let mut calldata = Vec::with_capacity(4 + head.len() + tail.len());
    calldata.extend_from_slice(selector);
    calldata.extend_from_slice(&head);
    calldata.extend_from_slice(&tail);
    calldata
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Ledger client for an Ethereum-compatible node.
pub struct JsonRpcLedger {
    config: JsonRpcLedgerConfig,
    selector: [u8; 4],
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(
        config: JsonRpcLedgerConfig,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let selector = parse_selector(&config.selector)
            .map_err(|e| LedgerError::Unreachable(format!("invalid selector: {}", e)))?;
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Unreachable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            selector,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Unreachable(format!(
                "node returned HTTP {}",
                response.status()
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unreachable(format!("invalid RPC response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(LedgerError::AnchorRejected(format!(
                "{} ({})",
                error.message, error.code
            )));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn wait_for_receipt(&self, tx: &TxId) -> Result<Value, LedgerError> {
        let timeout = Duration::from_millis(self.config.confirmation_timeout_ms);
        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            let receipt = self
                .call("eth_getTransactionReceipt", json!([tx.as_str()]))
                .await?;
            if !receipt.is_null() {
                return Ok(receipt);
            }
            if Instant::now() + poll_interval > deadline {
                return Err(LedgerError::Timeout(timeout));
            }
            debug!(tx = %tx, "Waiting for receipt");
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    fn name(&self) -> &str {
        "json-rpc"
    }

    async fn anchor(&self, anchor: &LedgerAnchor) -> Result<TxId, LedgerError> {
        let calldata = encode_store_decision(&self.selector, anchor);
        let params = json!([{
            "from": self.config.from,
            "to": self.config.contract,
            "data": format!("0x{}", hex::encode(calldata)),
        }]);

        let tx = match self.call("eth_sendTransaction", params).await? {
            Value::String(hash) => TxId::new(hash),
            other => {
                return Err(LedgerError::AnchorRejected(format!(
                    "unexpected transaction hash: {}",
                    other
                )))
            }
        };

        let receipt = self.wait_for_receipt(&tx).await?;
        match receipt.get("status").and_then(Value::as_str) {
            Some("0x0") => {
                warn!(tx = %tx, "Anchor transaction reverted");
                Err(LedgerError::AnchorRejected(format!("transaction {} reverted", tx)))
            }
            _ => {
                info!(tx = %tx, participant_ref = anchor.participant_ref, "Anchored decision");
                Ok(tx)
            }
        }
    }
}
