//! Read-only views over published snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::content_id::ContentId;
use crate::document::{DatabaseSnapshot, ParticipantEntry};
use crate::pointer::CurrentPointer;
use crate::store::{fetch_document, ContentStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Participant {0} not found")]
    ParticipantNotFound(u64),
}

/// A snapshot with where it lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotView {
    pub cid: ContentId,
    pub snapshot: DatabaseSnapshot,
    /// Gateway link to the published document
    pub link: String,
}

/// Aggregate counts for the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_participants: usize,
    pub eligible_count: usize,
    pub not_eligible_count: usize,
    pub current_database_cid: ContentId,
    pub last_updated: DateTime<Utc>,
}

/// Queries never move the pointer and never publish.
#[derive(Clone)]
pub struct RegistryQueries {
    store: Arc<dyn ContentStore>,
    pointer: Arc<CurrentPointer>,
    fetch_timeout: Duration,
}

impl RegistryQueries {
    pub fn new(
        store: Arc<dyn ContentStore>,
        pointer: Arc<CurrentPointer>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            pointer,
            fetch_timeout,
        }
    }

    /// Fetch any snapshot by id.
    pub async fn snapshot(&self, cid: &ContentId) -> Result<SnapshotView, QueryError> {
        let snapshot: DatabaseSnapshot =
            fetch_document(self.store.as_ref(), cid, self.fetch_timeout).await?;
        snapshot.validate().map_err(|reason| StoreError::Corrupt {
            cid: cid.clone(),
            reason,
        })?;
        Ok(SnapshotView {
            cid: cid.clone(),
            link: self.store.gateway_link(cid),
            snapshot,
        })
    }

    /// The snapshot the pointer names right now.
    pub async fn current(&self) -> Result<SnapshotView, QueryError> {
        self.snapshot(&self.pointer.get()).await
    }

    pub async fn stats(&self) -> Result<RegistryStats, QueryError> {
        let view = self.current().await?;
        let total = view.snapshot.len();
        let eligible = view.snapshot.eligible_count();
        Ok(RegistryStats {
            total_participants: total,
            eligible_count: eligible,
            not_eligible_count: total - eligible,
            current_database_cid: view.cid,
            last_updated: view.snapshot.metadata.last_updated,
        })
    }

    /// Look up a participant in the current snapshot.
    pub async fn participant(&self, participant_id: u64) -> Result<ParticipantEntry, QueryError> {
        let view = self.current().await?;
        view.snapshot
            .participant(participant_id)
            .cloned()
            .ok_or(QueryError::ParticipantNotFound(participant_id))
    }
}
