//! Content-addressed document storage.
//!
//! Provides a trait-based interface over stores that address documents by
//! the hash of their bytes:
//! - In-memory (tests and single-process deployments)
//! - Local directory
//! - IPFS pinning service plus read gateway

pub mod local;
pub mod memory;
pub mod pinning;

pub use local::LocalContentStore;
pub use memory::InMemoryContentStore;
pub use pinning::{PinningGatewayConfig, PinningGatewayStore};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::content_id::ContentId;

/// Content store errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No document at this identifier
    #[error("Content not found: {0}")]
    NotFound(ContentId),

    /// Store could not be reached or did not answer in time
    #[error("Content store unreachable: {0}")]
    Unreachable(String),

    /// Store rejected the write
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Document bytes do not decode as the expected type
    #[error("Document {cid} could not be decoded: {reason}")]
    Corrupt { cid: ContentId, reason: String },
}

/// Core trait for content stores.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Read the document bytes stored at `cid`.
    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StoreError>;

    /// Store `bytes`, returning their identifier.
    async fn publish(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError>;

    /// Link a person can open to read the document.
    fn gateway_link(&self, cid: &ContentId) -> String;
}

/// Serialise a document the way every store expects it.
pub fn encode_document<T: Serialize>(document: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(document)
        .map_err(|e| StoreError::PublishFailed(format!("serialize: {}", e)))
}

/// Fetch raw bytes, bounded by `timeout`.
pub async fn fetch_bytes(
    store: &dyn ContentStore,
    cid: &ContentId,
    timeout: Duration,
) -> Result<Vec<u8>, StoreError> {
    tokio::time::timeout(timeout, store.fetch(cid))
        .await
        .map_err(|_| {
            StoreError::Unreachable(format!("fetch of {} timed out after {:?}", cid, timeout))
        })?
}

/// Fetch and decode a document, bounded by `timeout`.
pub async fn fetch_document<T: DeserializeOwned>(
    store: &dyn ContentStore,
    cid: &ContentId,
    timeout: Duration,
) -> Result<T, StoreError> {
    let bytes = fetch_bytes(store, cid, timeout).await?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        cid: cid.clone(),
        reason: e.to_string(),
    })
}

/// Encode and publish a document, bounded by `timeout`.
pub async fn publish_document<T: Serialize>(
    store: &dyn ContentStore,
    document: &T,
    timeout: Duration,
) -> Result<ContentId, StoreError> {
    let bytes = encode_document(document)?;
    tokio::time::timeout(timeout, store.publish(bytes))
        .await
        .map_err(|_| StoreError::Unreachable(format!("publish timed out after {:?}", timeout)))?
}
