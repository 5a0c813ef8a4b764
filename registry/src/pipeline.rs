//! The decision pipeline.
//!
//! One [`DecisionPipeline::submit`] call takes an applicant through
//!
//! ```text
//! Encoding → Classifying → Attributing → Narrating → PublishingExplanation
//!   → Anchoring → FetchingSnapshot → AppendingParticipant → PublishingSnapshot
//!   → UpdatingPointer → Done
//! ```
//!
//! and returns either the full [`DecisionOutcome`] or a [`PipelineError`]
//! naming the failed stage. Narrative failures and an unreachable snapshot are
//! recovered in place and marked as degraded; everything else is fatal.
//!
//! The anchor is written before the snapshot and carries the pointer value read
//! when the run started. If the snapshot publish then fails, the ledger holds
//! an anchor whose participant never reaches a snapshot; the audit log lists
//! such runs for reconciliation.
//!
//! Concurrent runs commit optimistically: the snapshot is extended from the
//! pointer value last seen and committed by compare-and-swap. On conflict the
//! fetch-append-publish-commit tail is retried against the new pointer, up to
//! the configured attempt limit.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use eligibility::{Applicant, AttributionEngine, EligibilityClassifier, FeatureEncoder};
use narrator::{NarrativeGenerator, NarrativeSource};

use crate::audit::{AuditEntry, AuditLog, DegradedMarker, RunOutcome};
use crate::config::TimeoutConfig;
use crate::content_id::ContentId;
use crate::document::{DatabaseSnapshot, ExplanationRecord};
use crate::error::{PipelineError, Stage};
use crate::ledger::{anchor_with_timeout, LedgerAnchor, LedgerClient, TxId};
use crate::pointer::CurrentPointer;
use crate::store::{fetch_document, publish_document, ContentStore, StoreError};

/// Default number of commit attempts under pointer contention.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 8;

/// Success payload of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub run_id: Uuid,
    pub eligible: bool,
    pub confidence: f64,
    /// Plain-language explanation
    #[serde(rename = "explanation")]
    pub narrative: String,
    pub narrative_source: NarrativeSource,
    pub feature_contributions: BTreeMap<String, f64>,
    pub participant_id: u64,
    pub database_cid: ContentId,
    pub explanation_cid: ContentId,
    pub total_participants: u64,
    pub anchor_tx: TxId,
    /// A narrative fallback or an unreachable snapshot was recovered from
    pub degraded: bool,
    pub commit_attempts: u32,
}

/// Collaborators a pipeline is assembled from.
pub struct PipelineParts {
    pub encoder: FeatureEncoder,
    pub classifier: Arc<dyn EligibilityClassifier>,
    pub attribution: AttributionEngine,
    pub narrator: NarrativeGenerator,
    pub store: Arc<dyn ContentStore>,
    pub ledger: Arc<dyn LedgerClient>,
    pub pointer: Arc<CurrentPointer>,
}

/// Orchestrates one applicant submission at a time; share it behind an `Arc`
/// to run submissions concurrently.
pub struct DecisionPipeline {
    encoder: FeatureEncoder,
    classifier: Arc<dyn EligibilityClassifier>,
    attribution: Arc<AttributionEngine>,
    narrator: NarrativeGenerator,
    store: Arc<dyn ContentStore>,
    ledger: Arc<dyn LedgerClient>,
    pointer: Arc<CurrentPointer>,
    audit: Arc<AuditLog>,
    timeouts: TimeoutConfig,
    max_commit_attempts: u32,
}

impl DecisionPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            encoder: parts.encoder,
            classifier: parts.classifier,
            attribution: Arc::new(parts.attribution),
            narrator: parts.narrator,
            store: parts.store,
            ledger: parts.ledger,
            pointer: parts.pointer,
            audit: Arc::new(AuditLog::new()),
            timeouts: TimeoutConfig::default(),
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn pointer(&self) -> &Arc<CurrentPointer> {
        &self.pointer
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Decide, explain, publish, anchor and register one applicant.
    pub async fn submit(&self, applicant: Applicant) -> Result<DecisionOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let initial = self.pointer.get();
        let mut entry = AuditEntry::begin(run_id, applicant.national_id, initial.clone());

        info!(%run_id, database_cid = %initial, "Pipeline run started");

        let result = self.run(run_id, &applicant, &initial, &mut entry).await;

        let outcome = match &result {
            Ok(outcome) => {
                entry.stage = Stage::Done;
                info!(
                    %run_id,
                    participant_id = outcome.participant_id,
                    database_cid = %outcome.database_cid,
                    degraded = outcome.degraded,
                    "Pipeline run committed"
                );
                RunOutcome::Committed {
                    participant_id: outcome.participant_id,
                    commit_attempts: outcome.commit_attempts,
                }
            }
            Err(e) => {
                entry.stage = e.stage();
                warn!(
                    %run_id,
                    stage = %e.stage(),
                    kind = ?e.kind(),
                    error = %e,
                    "Pipeline run failed"
                );
                RunOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        self.audit.record(entry.finish(outcome)).await;

        result
    }

    async fn run(
        &self,
        run_id: Uuid,
        applicant: &Applicant,
        initial: &ContentId,
        entry: &mut AuditEntry,
    ) -> Result<DecisionOutcome, PipelineError> {
        entry.stage = Stage::Encoding;
        let features = self.encoder.encode(applicant)?;

        entry.stage = Stage::Classifying;
        let classifier = Arc::clone(&self.classifier);
        let decision = off_executor(Stage::Classifying, self.timeouts.classifier(), move || {
            classifier.classify(&features)
        })
        .await?;
        debug!(
            %run_id,
            eligible = decision.eligible,
            confidence = decision.confidence,
            "Classified"
        );

        entry.stage = Stage::Attributing;
        let engine = Arc::clone(&self.attribution);
        let classifier = Arc::clone(&self.classifier);
        let attribution = off_executor(Stage::Attributing, self.timeouts.attribution(), move || {
            engine.attribute(&features, classifier.as_ref())
        })
        .await?;

        entry.stage = Stage::Narrating;
        let narration = self.narrator.narrate(applicant, &decision, &attribution).await;
        if let Some(failure) = &narration.failure {
            debug!(%run_id, error = %failure, "Narrative replaced by fallback");
            entry.degraded.push(DegradedMarker::NarrativeFallback {
                reason: failure.to_string(),
            });
        }
        let narrative = narration.narrative;

        entry.stage = Stage::PublishingExplanation;
        let record =
            ExplanationRecord::new(applicant, &decision, &attribution, &narrative, Utc::now());
        let explanation_cid =
            publish_document(self.store.as_ref(), &record, self.timeouts.store_publish())
                .await
                .map_err(PipelineError::ExplanationPublish)?;
        entry.explanation_cid = Some(explanation_cid.clone());

        entry.stage = Stage::Anchoring;
        let anchor = LedgerAnchor::for_decision(initial, &explanation_cid, &decision, applicant);
        let anchor_tx = anchor_with_timeout(self.ledger.as_ref(), &anchor, self.timeouts.ledger())
            .await
            .map_err(|source| {
                error!(
                    %run_id,
                    explanation_cid = %explanation_cid,
                    error = %source,
                    "Anchor failed, explanation left unreferenced"
                );
                PipelineError::Anchor {
                    explanation_cid: explanation_cid.clone(),
                    source,
                }
            })?;
        entry.anchor_tx = Some(anchor_tx.clone());

        let mut expected = initial.clone();
        let mut attempt = 0;
        loop {
            attempt += 1;

            entry.stage = Stage::FetchingSnapshot;
            let mut snapshot = self.load_snapshot(run_id, &expected, entry).await?;

            entry.stage = Stage::AppendingParticipant;
            let participant_id = snapshot
                .append(applicant, &decision, &explanation_cid, Utc::now())
                .participant_id;

            entry.stage = Stage::PublishingSnapshot;
            let database_cid =
                publish_document(self.store.as_ref(), &snapshot, self.timeouts.store_publish())
                    .await
                    .map_err(|source| {
                        error!(
                            %run_id,
                            anchor_tx = %anchor_tx,
                            explanation_cid = %explanation_cid,
                            error = %source,
                            "Snapshot publish failed after anchoring"
                        );
                        PipelineError::SnapshotPublish {
                            anchor_tx: anchor_tx.clone(),
                            source,
                        }
                    })?;

            entry.stage = Stage::UpdatingPointer;
            match self.pointer.compare_and_swap(&expected, database_cid.clone()) {
                Ok(()) => {
                    entry.database_cid = Some(database_cid.clone());
                    let degraded = snapshot.metadata.rebuilt_after_unreachable.is_some()
                        || entry
                            .degraded
                            .iter()
                            .any(|m| matches!(m, DegradedMarker::NarrativeFallback { .. }));
                    return Ok(DecisionOutcome {
                        run_id,
                        eligible: decision.eligible,
                        confidence: decision.confidence,
                        narrative: narrative.text,
                        narrative_source: narrative.source,
                        feature_contributions: attribution.by_feature(),
                        participant_id,
                        database_cid,
                        explanation_cid,
                        total_participants: snapshot.metadata.total_participants,
                        anchor_tx,
                        degraded,
                        commit_attempts: attempt,
                    });
                }
                Err(conflict) if attempt < self.max_commit_attempts => {
                    debug!(
                        %run_id,
                        attempt,
                        actual = %conflict.actual,
                        "Pointer moved, retrying commit"
                    );
                    expected = conflict.actual;
                }
                Err(conflict) => {
                    return Err(PipelineError::PointerConflict {
                        attempts: attempt,
                        last: conflict,
                    });
                }
            }
        }
    }

    async fn load_snapshot(
        &self,
        run_id: Uuid,
        cid: &ContentId,
        entry: &mut AuditEntry,
    ) -> Result<DatabaseSnapshot, PipelineError> {
        let fetched = fetch_document::<DatabaseSnapshot>(
            self.store.as_ref(),
            cid,
            self.timeouts.store_fetch(),
        )
        .await;
        match fetched {
            Ok(snapshot) => {
                snapshot
                    .validate()
                    .map_err(|reason| PipelineError::SnapshotCorrupt {
                        cid: cid.clone(),
                        reason,
                    })?;
                Ok(snapshot)
            }
            Err(StoreError::NotFound(_)) => Err(PipelineError::SnapshotMissing(cid.clone())),
            Err(StoreError::Unreachable(reason)) => {
                warn!(
                    %run_id,
                    cid = %cid,
                    reason = %reason,
                    degraded = true,
                    "Snapshot unreachable, continuing from an empty snapshot"
                );
                let marker = DegradedMarker::SnapshotUnreachable { cid: cid.clone() };
                if !entry.degraded.contains(&marker) {
                    entry.degraded.push(marker);
                }
                Ok(DatabaseSnapshot::rebuilt_after(cid, Utc::now()))
            }
            Err(StoreError::Corrupt { reason, .. }) | Err(StoreError::PublishFailed(reason)) => {
                Err(PipelineError::SnapshotCorrupt {
                    cid: cid.clone(),
                    reason,
                })
            }
        }
    }
}

/// Run CPU-bound model work on the blocking pool, bounded by `timeout`.
async fn off_executor<T, E, F>(stage: Stage, timeout: Duration, task: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<PipelineError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(task)).await {
        Err(_) => Err(PipelineError::ModelTimeout {
            stage,
            after: timeout,
        }),
        Ok(Err(join)) => Err(PipelineError::ModelTaskFailed {
            stage,
            reason: join.to_string(),
        }),
        Ok(Ok(result)) => result.map_err(Into::into),
    }
}
