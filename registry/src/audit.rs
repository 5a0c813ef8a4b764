//! Audit trail for pipeline runs.
//!
//! Every run, committed or failed, leaves one entry. Failed runs that already
//! published an explanation (or anchored one) are listed for manual
//! reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::content_id::ContentId;
use crate::error::{FailureKind, Stage};
use crate::ledger::TxId;

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Recovered degradation observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedMarker {
    /// Narrative replaced by the fallback sentence
    NarrativeFallback { reason: String },
    /// Snapshot could not be read; an empty one was extended instead
    SnapshotUnreachable { cid: ContentId },
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Committed {
        participant_id: u64,
        commit_attempts: u32,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Run ID
    pub run_id: Uuid,
    /// National ID of the applicant
    pub applicant_id: u64,
    /// Pointer value read at the start of the run
    pub initial_database_cid: ContentId,
    /// Last stage reached
    pub stage: Stage,
    /// Outcome, `None` while the run is in flight
    pub outcome: Option<RunOutcome>,
    /// Published explanation, if any
    pub explanation_cid: Option<ContentId>,
    /// Confirmed anchor, if any
    pub anchor_tx: Option<TxId>,
    /// Committed snapshot, if any
    pub database_cid: Option<ContentId>,
    /// Recovered degradations
    pub degraded: Vec<DegradedMarker>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: Option<DateTime<Utc>>,
    /// Processing duration in ms
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    /// Start an entry for a new run.
    pub fn begin(run_id: Uuid, applicant_id: u64, initial_database_cid: ContentId) -> Self {
        Self {
            run_id,
            applicant_id,
            initial_database_cid,
            stage: Stage::Encoding,
            outcome: None,
            explanation_cid: None,
            anchor_tx: None,
            database_cid: None,
            degraded: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    /// Close the entry with its outcome.
    pub fn finish(mut self, outcome: RunOutcome) -> Self {
        let finished_at = Utc::now();
        self.duration_ms = Some(
            (finished_at - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.finished_at = Some(finished_at);
        self.outcome = Some(outcome);
        self
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, Some(RunOutcome::Committed { .. }))
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Published explanation that no committed snapshot references.
    pub fn orphaned_explanation(&self) -> Option<OrphanedExplanation> {
        let kind = match &self.outcome {
            Some(RunOutcome::Failed { kind, .. }) => *kind,
            _ => return None,
        };
        self.explanation_cid.as_ref().map(|cid| OrphanedExplanation {
            run_id: self.run_id,
            explanation_cid: cid.clone(),
            anchor_tx: self.anchor_tx.clone(),
            kind,
        })
    }
}

/// Explanation needing manual reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedExplanation {
    pub run_id: Uuid,
    pub explanation_cid: ContentId,
    /// Set when the ledger references the explanation but no snapshot does
    pub anchor_tx: Option<TxId>,
    pub kind: FailureKind,
}

/// Audit log for tracking all pipeline runs.
pub struct AuditLog {
    /// Log entries (newest first)
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    /// Maximum entries to retain
    max_entries: usize,
}

impl AuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Record a finished run.
    pub async fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        // Prune if over limit
        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Get entry by run ID.
    pub async fn get_by_run(&self, run_id: Uuid) -> Option<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.run_id == run_id).cloned()
    }

    /// Get entries for an applicant.
    pub async fn get_by_applicant(&self, applicant_id: u64, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.applicant_id == applicant_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Explanations published by runs that never committed, newest first.
    pub async fn orphaned_explanations(&self) -> Vec<OrphanedExplanation> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter_map(AuditEntry::orphaned_explanation)
            .collect()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let total = entries.len();
        let committed = entries.iter().filter(|e| e.is_committed()).count();
        let degraded = entries.iter().filter(|e| e.is_degraded()).count();
        let orphaned = entries
            .iter()
            .filter(|e| e.orphaned_explanation().is_some())
            .count();

        let avg_duration_ms = if total > 0 {
            entries
                .iter()
                .filter_map(|e| e.duration_ms)
                .sum::<u64>()
                / total as u64
        } else {
            0
        };

        AuditStats {
            total_runs: total,
            committed,
            failed: total - committed,
            degraded,
            orphaned,
            avg_duration_ms,
        }
    }

    /// Clear the log.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Total runs logged
    pub total_runs: usize,
    /// Runs that moved the pointer
    pub committed: usize,
    /// Runs that ended in a failure
    pub failed: usize,
    /// Runs with at least one recovered degradation
    pub degraded: usize,
    /// Failed runs that left a published explanation behind
    pub orphaned: usize,
    /// Average processing duration
    pub avg_duration_ms: u64,
}
