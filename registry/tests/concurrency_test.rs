//! Concurrent submissions against one pointer.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{applicant, fast_timeouts, stump_forest, HarnessBuilder};
use eligibility::{AttributionEngine, FeatureEncoder, ShapleyExplainer};
use narrator::NarrativeGenerator;
use registry::store::{encode_document, fetch_document};
use registry::{
    ContentId, ContentStore, CurrentPointer, DatabaseSnapshot, DecisionPipeline, FailureKind,
    InMemoryContentStore, InMemoryLedger, PipelineError, PipelineParts, StoreError,
};

const WAIT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_racing_runs_get_distinct_ids() {
    let h = HarnessBuilder::new()
        .store(InMemoryContentStore::new().with_fetch_delay(Duration::from_millis(50)))
        .build()
        .await;

    let (a, b) = futures::join!(
        h.pipeline.submit(applicant(1)),
        h.pipeline.submit(applicant(2))
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let ids: BTreeSet<u64> = [a.participant_id, b.participant_id].into();
    assert_eq!(ids, BTreeSet::from([1, 2]));
    assert_eq!(a.commit_attempts + b.commit_attempts, 3);

    let last = if a.participant_id == 2 { &a } else { &b };
    assert_eq!(h.pointer.get(), last.database_cid);
    assert_eq!(last.total_participants, 2);

    let snapshot: DatabaseSnapshot = fetch_document(h.store.as_ref(), &h.pointer.get(), WAIT)
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.validate().is_ok());
    let national_ids: BTreeSet<u64> = snapshot.participants.iter().map(|p| p.national_id).collect();
    assert_eq!(
        national_ids,
        BTreeSet::from([applicant(1).national_id, applicant(2).national_id])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_spawned_runs_all_commit() {
    let h = HarnessBuilder::new()
        .store(InMemoryContentStore::new().with_fetch_delay(Duration::from_millis(5)))
        .max_commit_attempts(32)
        .build()
        .await;

    let handles: Vec<_> = (1..=10)
        .map(|n| {
            let pipeline = Arc::clone(&h.pipeline);
            tokio::spawn(async move { pipeline.submit(applicant(n)).await })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        ids.insert(outcome.participant_id);
    }
    assert_eq!(ids, (1..=10).collect::<BTreeSet<u64>>());

    let snapshot: DatabaseSnapshot = fetch_document(h.store.as_ref(), &h.pointer.get(), WAIT)
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 10);
    assert!(snapshot.validate().is_ok());
    assert_eq!(h.pointer.commit_count(), 10);
    assert_eq!(h.ledger.len(), 10);
}

/// Store that lets a rival writer commit every time a snapshot is read.
struct ContendedStore {
    inner: InMemoryContentStore,
    pointer: Arc<CurrentPointer>,
    rival_commits: AtomicUsize,
}

#[async_trait]
impl ContentStore for ContendedStore {
    fn name(&self) -> &str {
        "contended"
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StoreError> {
        let bytes = self.inner.fetch(cid).await?;

        let n = self.rival_commits.fetch_add(1, Ordering::SeqCst) + 1;
        let rival = DatabaseSnapshot::empty(Utc::now()).with_description(format!("rival {}", n));
        let rival_cid = self.inner.insert(encode_document(&rival)?);
        let current = self.pointer.get();
        self.pointer
            .compare_and_swap(&current, rival_cid)
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        Ok(bytes)
    }

    async fn publish(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError> {
        self.inner.publish(bytes).await
    }

    fn gateway_link(&self, cid: &ContentId) -> String {
        self.inner.gateway_link(cid)
    }
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let inner = InMemoryContentStore::new();
    let genesis = inner.insert(encode_document(&DatabaseSnapshot::empty(Utc::now())).unwrap());
    let pointer = Arc::new(CurrentPointer::new(genesis.clone()));
    let store = Arc::new(ContendedStore {
        inner,
        pointer: Arc::clone(&pointer),
        rival_commits: AtomicUsize::new(0),
    });
    let ledger = Arc::new(InMemoryLedger::new());

    let pipeline = DecisionPipeline::new(PipelineParts {
        encoder: FeatureEncoder::default(),
        classifier: Arc::new(stump_forest()),
        attribution: AttributionEngine::new(Arc::new(ShapleyExplainer::new())),
        narrator: NarrativeGenerator::disabled(),
        store: store.clone(),
        ledger: ledger.clone(),
        pointer: Arc::clone(&pointer),
    })
    .with_timeouts(fast_timeouts())
    .with_max_commit_attempts(3);

    let err = pipeline.submit(applicant(1)).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::PointerConflict);
    assert!(matches!(err, PipelineError::PointerConflict { attempts: 3, .. }));
    assert_eq!(store.rival_commits.load(Ordering::SeqCst), 3);
    assert_eq!(ledger.len(), 1);
    assert_ne!(pointer.get(), genesis);

    let recent = pipeline.audit().recent(1).await;
    let entry = &recent[0];
    assert!(!entry.is_committed());
    assert!(entry.database_cid.is_none());
    assert!(entry.anchor_tx.is_some());
}
