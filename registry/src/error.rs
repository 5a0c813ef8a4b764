//! Pipeline failure taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use eligibility::{AttributionError, ClassifierError, EncodeError};

use crate::content_id::ContentId;
use crate::ledger::{LedgerError, TxId};
use crate::pointer::PointerConflict;
use crate::store::StoreError;

/// Stages of one pipeline run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Encoding,
    Classifying,
    Attributing,
    Narrating,
    PublishingExplanation,
    Anchoring,
    FetchingSnapshot,
    AppendingParticipant,
    PublishingSnapshot,
    UpdatingPointer,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Encoding => "encoding",
            Stage::Classifying => "classifying",
            Stage::Attributing => "attributing",
            Stage::Narrating => "narrating",
            Stage::PublishingExplanation => "publishing_explanation",
            Stage::Anchoring => "anchoring",
            Stage::FetchingSnapshot => "fetching_snapshot",
            Stage::AppendingParticipant => "appending_participant",
            Stage::PublishingSnapshot => "publishing_snapshot",
            Stage::UpdatingPointer => "updating_pointer",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of fatal run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    UnknownCategory,
    InvalidApplicant,
    ClassifierError,
    PublishFailed,
    AnchorRejected,
    AnchorTimeout,
    SnapshotMissing,
    SnapshotCorrupt,
    PointerConflict,
}

/// A run that ended in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Applicant could not be encoded: {0}")]
    Encode(#[from] EncodeError),

    #[error("Classifier failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Attribution failed: {0}")]
    Attribution(#[from] AttributionError),

    #[error("{stage} did not finish within {after:?}")]
    ModelTimeout { stage: Stage, after: Duration },

    #[error("{stage} task aborted: {reason}")]
    ModelTaskFailed { stage: Stage, reason: String },

    #[error("Failed to publish explanation: {0}")]
    ExplanationPublish(#[source] StoreError),

    #[error("Anchoring explanation {explanation_cid} failed: {source}")]
    Anchor {
        explanation_cid: ContentId,
        #[source]
        source: LedgerError,
    },

    #[error("Snapshot {0} not found")]
    SnapshotMissing(ContentId),

    #[error("Snapshot {cid} is corrupt: {reason}")]
    SnapshotCorrupt { cid: ContentId, reason: String },

    #[error("Failed to publish snapshot (anchored in {anchor_tx}): {source}")]
    SnapshotPublish {
        anchor_tx: TxId,
        #[source]
        source: StoreError,
    },

    #[error("Pointer still contended after {attempts} attempts: {last}")]
    PointerConflict {
        attempts: u32,
        last: PointerConflict,
    },
}

impl PipelineError {
    /// Stage the run failed in.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Encode(_) => Stage::Encoding,
            PipelineError::Classifier(_) => Stage::Classifying,
            PipelineError::Attribution(_) => Stage::Attributing,
            PipelineError::ModelTimeout { stage, .. } => *stage,
            PipelineError::ModelTaskFailed { stage, .. } => *stage,
            PipelineError::ExplanationPublish(_) => Stage::PublishingExplanation,
            PipelineError::Anchor { .. } => Stage::Anchoring,
            PipelineError::SnapshotMissing(_) => Stage::FetchingSnapshot,
            PipelineError::SnapshotCorrupt { .. } => Stage::FetchingSnapshot,
            PipelineError::SnapshotPublish { .. } => Stage::PublishingSnapshot,
            PipelineError::PointerConflict { .. } => Stage::UpdatingPointer,
        }
    }

    /// Failure kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Encode(EncodeError::UnknownCategory { .. }) => {
                FailureKind::UnknownCategory
            }
            PipelineError::Encode(_) => FailureKind::InvalidApplicant,
            PipelineError::Classifier(_)
            | PipelineError::Attribution(_)
            | PipelineError::ModelTimeout { .. }
            | PipelineError::ModelTaskFailed { .. } => FailureKind::ClassifierError,
            PipelineError::ExplanationPublish(_) | PipelineError::SnapshotPublish { .. } => {
                FailureKind::PublishFailed
            }
            PipelineError::Anchor {
                source: LedgerError::Timeout(_),
                ..
            } => FailureKind::AnchorTimeout,
            PipelineError::Anchor { .. } => FailureKind::AnchorRejected,
            PipelineError::SnapshotMissing(_) => FailureKind::SnapshotMissing,
            PipelineError::SnapshotCorrupt { .. } => FailureKind::SnapshotCorrupt,
            PipelineError::PointerConflict { .. } => FailureKind::PointerConflict,
        }
    }

    /// Explanation left published without a committed snapshot, if any.
    pub fn orphaned_explanation(&self) -> Option<&ContentId> {
        match self {
            PipelineError::Anchor {
                explanation_cid, ..
            } => Some(explanation_cid),
            _ => None,
        }
    }
}
