//! In-memory ledger.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use super::{LedgerAnchor, LedgerClient, LedgerError, TxId};

/// Ordered, append-only anchor log held in memory.
///
/// Supports rejection, latency injection and call counting for tests.
pub struct InMemoryLedger {
    records: Mutex<Vec<(TxId, LedgerAnchor)>>,
    reject: AtomicBool,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay confirmation of every anchor.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject anchors while set.
    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Number of anchor calls, including rejected ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Confirmed anchors in ledger order.
    pub fn anchors(&self) -> Vec<LedgerAnchor> {
        self.records
            .lock()
            .map(|records| records.iter().map(|(_, a)| a.clone()).collect())
            .unwrap_or_default()
    }

    /// Anchor confirmed at position `index`.
    pub fn record(&self, index: usize) -> Option<(TxId, LedgerAnchor)> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(index).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn transaction_hash(index: usize, anchor: &LedgerAnchor) -> TxId {
    let mut hasher = Sha256::new();
    hasher.update(index.to_be_bytes());
    hasher.update(anchor.previous_database_cid.as_str());
    hasher.update(anchor.explanation_cid.as_str());
    hasher.update(&anchor.decision_label);
    hasher.update(anchor.participant_ref.to_be_bytes());
    TxId::new(format!("0x{}", hex::encode(hasher.finalize())))
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn name(&self) -> &str {
        "memory"
    }

    async fn anchor(&self, anchor: &LedgerAnchor) -> Result<TxId, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.reject.load(Ordering::SeqCst) {
            return Err(LedgerError::AnchorRejected(
                "transaction reverted".to_string(),
            ));
        }

        let mut records = self
            .records
            .lock()
            .map_err(|_| LedgerError::Unreachable("ledger state poisoned".to_string()))?;
        let tx = transaction_hash(records.len(), anchor);
        records.push((tx.clone(), anchor.clone()));

        info!(tx = %tx, participant_ref = anchor.participant_ref, "Anchored decision");
        Ok(tx)
    }
}
