//! In-memory content store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{ContentStore, StoreError};
use crate::content_id::ContentId;

/// Content store held in process memory.
///
/// Supports failure injection and call counting for tests.
pub struct InMemoryContentStore {
    objects: DashMap<ContentId, Vec<u8>>,
    unreachable: AtomicBool,
    publish_limit: AtomicUsize,
    fetch_delay: Option<Duration>,
    fetch_calls: AtomicUsize,
    publish_calls: AtomicUsize,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            unreachable: AtomicBool::new(false),
            publish_limit: AtomicUsize::new(usize::MAX),
            fetch_delay: None,
            fetch_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering each fetch.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Make fetches fail as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Reject every publish from now on.
    pub fn reject_publishes(&self) {
        self.reject_publishes_after(self.publish_count());
    }

    /// Accept `limit` publishes in total, then reject.
    pub fn reject_publishes_after(&self, limit: usize) {
        self.publish_limit.store(limit, Ordering::SeqCst);
    }

    /// Store bytes directly, bypassing counters and failure injection.
    pub fn insert(&self, bytes: Vec<u8>) -> ContentId {
        let cid = ContentId::for_bytes(&bytes);
        self.objects.insert(cid.clone(), bytes);
        cid
    }

    /// Store bytes under an externally minted identifier.
    pub fn insert_at(&self, cid: ContentId, bytes: Vec<u8>) {
        self.objects.insert(cid, bytes);
    }

    pub fn contains(&self, cid: &ContentId) -> bool {
        self.objects.contains_key(cid)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("memory store disabled".to_string()));
        }

        self.objects
            .get(cid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(cid.clone()))
    }

    async fn publish(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError> {
        let index = self.publish_calls.fetch_add(1, Ordering::SeqCst);

        if index >= self.publish_limit.load(Ordering::SeqCst) {
            return Err(StoreError::PublishFailed("memory store rejected write".to_string()));
        }

        let cid = ContentId::for_bytes(&bytes);
        debug!(cid = %cid, size = bytes.len(), "Stored document");
        self.objects.insert(cid.clone(), bytes);
        Ok(cid)
    }

    fn gateway_link(&self, cid: &ContentId) -> String {
        format!("memory://{}", cid)
    }
}
