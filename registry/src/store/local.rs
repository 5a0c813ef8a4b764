//! Content-addressed document storage on the local filesystem.
//!
//! Documents live under `<root>/objects/<shard>/<cid>.json`, where the shard
//! is the last two characters of the CID.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{ContentStore, StoreError};
use crate::content_id::ContentId;

/// Filesystem-backed content store.
pub struct LocalContentStore {
    root_dir: PathBuf,
}

impl LocalContentStore {
    /// Create a store rooted at `root_dir`, creating it if needed.
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self, StoreError> {
        let root_dir = root_dir.as_ref().to_path_buf();

        fs::create_dir_all(root_dir.join("objects"))
            .await
            .map_err(|e| StoreError::Unreachable(format!("{}: {}", root_dir.display(), e)))?;

        info!(path = %root_dir.display(), "Initialized local content store");

        Ok(Self { root_dir })
    }

    fn object_path(&self, cid: &ContentId) -> PathBuf {
        let id = cid.as_str();
        let shard = id
            .char_indices()
            .rev()
            .nth(1)
            .map(|(i, _)| &id[i..])
            .unwrap_or(id);
        self.root_dir
            .join("objects")
            .join(shard)
            .join(format!("{}.json", id))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StoreError> {
        if !cid.is_path_safe() {
            return Err(StoreError::NotFound(cid.clone()));
        }

        match fs::read(self.object_path(cid)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(cid.clone())),
            Err(e) => Err(StoreError::Unreachable(e.to_string())),
        }
    }

    async fn publish(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError> {
        let cid = ContentId::for_bytes(&bytes);
        let path = self.object_path(&cid);

        if fs::metadata(&path).await.is_ok() {
            debug!(cid = %cid, "Document already exists");
            return Ok(cid);
        }

        let publish_err = |e: std::io::Error| StoreError::PublishFailed(e.to_string());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(publish_err)?;
        }

        // Readers never observe a partially written document.
        let staging = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&staging, &bytes).await.map_err(publish_err)?;
        fs::rename(&staging, &path).await.map_err(publish_err)?;

        info!(cid = %cid, size = bytes.len(), "Stored document");
        Ok(cid)
    }

    fn gateway_link(&self, cid: &ContentId) -> String {
        format!("file://{}", self.object_path(cid).display())
    }
}
