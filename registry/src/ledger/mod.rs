//! Ledger anchoring.
//!
//! An anchor records one decision on an ordered, immutable log: the database
//! CID the decision was taken against, the explanation CID, the decision label
//! and a short participant reference.

pub mod memory;
pub mod rpc;

pub use memory::InMemoryLedger;
pub use rpc::{JsonRpcLedger, JsonRpcLedgerConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use eligibility::{Applicant, Decision};

use crate::content_id::ContentId;

/// Participant references keep only the low six digits of the national ID.
pub const PARTICIPANT_REF_MODULUS: u64 = 1_000_000;

/// Payload of one anchoring transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAnchor {
    pub previous_database_cid: ContentId,
    pub explanation_cid: ContentId,
    pub decision_label: String,
    pub participant_ref: u64,
}

impl LedgerAnchor {
    pub fn for_decision(
        previous_database_cid: &ContentId,
        explanation_cid: &ContentId,
        decision: &Decision,
        applicant: &Applicant,
    ) -> Self {
        Self {
            previous_database_cid: previous_database_cid.clone(),
            explanation_cid: explanation_cid.clone(),
            decision_label: decision.label().to_string(),
            participant_ref: applicant.national_id % PARTICIPANT_REF_MODULUS,
        }
    }
}

/// Identifier of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// The ledger refused or reverted the transaction
    #[error("Anchor rejected: {0}")]
    AnchorRejected(String),

    /// Confirmation did not arrive in time
    #[error("Anchor not confirmed within {0:?}")]
    Timeout(Duration),

    /// The ledger node could not be reached
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),
}

/// Core trait for ledger clients.
///
/// `anchor` returns only after the ledger confirmed inclusion. Clients do not
/// deduplicate; submitting the same anchor twice records it twice.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Submit an anchor and wait for confirmation.
    async fn anchor(&self, anchor: &LedgerAnchor) -> Result<TxId, LedgerError>;
}

/// Anchor, bounded by `timeout`.
pub async fn anchor_with_timeout(
    ledger: &dyn LedgerClient,
    anchor: &LedgerAnchor,
    timeout: Duration,
) -> Result<TxId, LedgerError> {
    tokio::time::timeout(timeout, ledger.anchor(anchor))
        .await
        .map_err(|_| LedgerError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_for_decision() {
        let applicant = Applicant {
            national_id: 987_654_321_098,
            name: "Sunita".to_string(),
            age: 35,
            group: "SC".to_string(),
            income: 20_000.0,
            land_ownership: false,
            housing: "kutcha".to_string(),
        };
        let decision = Decision {
            eligible: false,
            confidence: 0.55,
        };

        let anchor = LedgerAnchor::for_decision(
            &ContentId::from("QmPrevious"),
            &ContentId::from("bafyexplanation"),
            &decision,
            &applicant,
        );

        assert_eq!(anchor.participant_ref, 321_098);
        assert_eq!(anchor.decision_label, "Not Eligible");
        assert_eq!(anchor.previous_database_cid.as_str(), "QmPrevious");
    }

    #[tokio::test]
    async fn test_anchor_timeout() {
        let ledger = InMemoryLedger::new().with_latency(Duration::from_millis(200));
        let anchor = LedgerAnchor {
            previous_database_cid: ContentId::from("a"),
            explanation_cid: ContentId::from("b"),
            decision_label: "Eligible".to_string(),
            participant_ref: 1,
        };

        let result = anchor_with_timeout(&ledger, &anchor, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(LedgerError::Timeout(_))));
    }
}
