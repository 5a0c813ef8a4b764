//! Read-side queries over committed snapshots.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{harness, meena, ravi};
use registry::{
    ContentId, ContentStore, QueryError, RegistryQueries, StoreError,
};

fn queries(h: &common::Harness) -> RegistryQueries {
    RegistryQueries::new(
        h.store.clone() as Arc<dyn ContentStore>,
        Arc::clone(&h.pointer),
        Duration::from_secs(1),
    )
}

#[tokio::test]
async fn test_stats_follow_current_pointer() {
    let h = harness().await;
    let q = queries(&h);

    let empty = q.stats().await.unwrap();
    assert_eq!(empty.total_participants, 0);
    assert_eq!(empty.current_database_cid, h.genesis);

    h.pipeline.submit(ravi()).await.unwrap();
    let last = h.pipeline.submit(meena()).await.unwrap();

    let stats = q.stats().await.unwrap();
    assert_eq!(stats.total_participants, 2);
    assert_eq!(stats.eligible_count, 1);
    assert_eq!(stats.not_eligible_count, 1);
    assert_eq!(stats.current_database_cid, last.database_cid);
}

#[tokio::test]
async fn test_participant_lookup() {
    let h = harness().await;
    let q = queries(&h);
    h.pipeline.submit(ravi()).await.unwrap();
    h.pipeline.submit(meena()).await.unwrap();

    let entry = q.participant(2).await.unwrap();
    assert_eq!(entry.applicant(), meena());

    let err = q.participant(99).await.unwrap_err();
    assert!(matches!(err, QueryError::ParticipantNotFound(99)));
}

#[tokio::test]
async fn test_snapshot_reads_are_idempotent() {
    let h = harness().await;
    let q = queries(&h);
    let outcome = h.pipeline.submit(ravi()).await.unwrap();

    let first = q.snapshot(&outcome.database_cid).await.unwrap();
    let second = q.snapshot(&outcome.database_cid).await.unwrap();

    assert_eq!(first.snapshot, second.snapshot);
    assert_eq!(first.link, format!("memory://{}", outcome.database_cid));
    assert_eq!(h.pointer.get(), outcome.database_cid);
}

#[tokio::test]
async fn test_historical_snapshots_stay_readable() {
    let h = harness().await;
    let q = queries(&h);
    let first = h.pipeline.submit(ravi()).await.unwrap();
    h.pipeline.submit(meena()).await.unwrap();

    let old = q.snapshot(&first.database_cid).await.unwrap();
    assert_eq!(old.snapshot.len(), 1);
    assert_eq!(q.current().await.unwrap().snapshot.len(), 2);
}

#[tokio::test]
async fn test_legacy_snapshot_document() {
    let h = harness().await;
    let q = queries(&h);
    let legacy = br#"{
  "metadata": {
    "total_participants": 1,
    "last_updated": "2024-03-01T10:15:30.123456",
    "version": "1.0",
    "description": "Initial participant database"
  },
  "participants": [
    {
      "participant_id": 1,
      "aadhaar": 234567890123,
      "name": "Lakshmi Devi",
      "age": 38,
      "caste": "ST",
      "income": 36000.0,
      "land_ownership": true,
      "housing_status": "semi-pucca",
      "eligible": true,
      "decision_date": "2024-03-01T10:15:30.123456",
      "explanation_cid": null
    }
  ]
}"#;
    let cid = ContentId::new("QmVYS13RPiaxHiRjvXLAjxBBN2yhvNWkMLzj4x8pCL7rmU");
    h.store.insert_at(cid.clone(), legacy.to_vec());

    let view = q.snapshot(&cid).await.unwrap();
    let entry = view.snapshot.participant(1).unwrap();
    assert_eq!(entry.name, "Lakshmi Devi");
    assert!(entry.explanation_cid.is_none());
    assert!(entry.confidence.is_none());
}

#[tokio::test]
async fn test_store_errors_surface() {
    let h = harness().await;
    let q = queries(&h);

    let err = q.snapshot(&ContentId::for_bytes(b"absent")).await.unwrap_err();
    assert!(matches!(err, QueryError::Store(StoreError::NotFound(_))));

    h.store.set_unreachable(true);
    let err = q.current().await.unwrap_err();
    assert!(matches!(err, QueryError::Store(StoreError::Unreachable(_))));
}
