//! The current-snapshot pointer.
//!
//! The only mutable state shared between pipeline runs. Runs read it once at
//! the start and commit through [`CurrentPointer::compare_and_swap`], which
//! succeeds only if nobody else committed in between. The critical section is
//! synchronous and never spans an `.await`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::content_id::ContentId;

/// A commit lost the race for the pointer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Pointer moved from {expected} to {actual}")]
pub struct PointerConflict {
    pub expected: ContentId,
    pub actual: ContentId,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    cid: ContentId,
    updated_at: DateTime<Utc>,
}

/// On-disk copy of the pointer.
///
/// Commits are numbered under the pointer lock and written afterwards, so a
/// slow disk never holds up readers. A write older than what is already on
/// disk is skipped.
struct Journal {
    path: PathBuf,
    written: Mutex<u64>,
}

impl Journal {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            written: Mutex::new(0),
        }
    }

    fn record(&self, seq: u64, cid: &ContentId) {
        let mut written = self
            .written
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if seq <= *written {
            debug!(seq, latest = *written, "Skipping stale pointer journal write");
            return;
        }
        match write_journal(&self.path, cid) {
            Ok(()) => *written = seq,
            Err(e) => warn!(
                path = %self.path.display(),
                cid = %cid.as_str(),
                error = %e,
                "Failed to journal pointer"
            ),
        }
    }
}

/// Process-wide pointer to the latest published snapshot.
pub struct CurrentPointer {
    current: Mutex<ContentId>,
    commits: AtomicU64,
    journal: Option<Journal>,
}

impl CurrentPointer {
    /// Start at `genesis`.
    pub fn new(genesis: ContentId) -> Self {
        Self {
            current: Mutex::new(genesis),
            commits: AtomicU64::new(0),
            journal: None,
        }
    }

    /// Persist every commit to `path`.
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal = Some(Journal::new(path.into()));
        self
    }

    /// Resume from the journal at `path`, or start at `genesis` if none exists.
    ///
    /// Later commits are journaled to the same path.
    pub fn restore(genesis: ContentId, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let start = match std::fs::read(path) {
            Ok(bytes) => {
                let record: JournalRecord = serde_json::from_slice(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                info!(
                    cid = %record.cid,
                    updated_at = %record.updated_at,
                    "Restored pointer from journal"
                );
                record.cid
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => genesis,
            Err(e) => return Err(e),
        };
        Ok(Self::new(start).with_journal(path))
    }

    fn lock(&self) -> MutexGuard<'_, ContentId> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The current snapshot CID.
    pub fn get(&self) -> ContentId {
        self.lock().clone()
    }

    /// Number of successful commits since start-up.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Move the pointer to `new` if it still points at `expected`.
    pub fn compare_and_swap(
        &self,
        expected: &ContentId,
        new: ContentId,
    ) -> Result<(), PointerConflict> {
        let seq = {
            let mut current = self.lock();
            if *current != *expected {
                return Err(PointerConflict {
                    expected: expected.clone(),
                    actual: current.clone(),
                });
            }
            *current = new.clone();
            self.commits.fetch_add(1, Ordering::SeqCst) + 1
        };

        if let Some(journal) = &self.journal {
            journal.record(seq, &new);
        }
        Ok(())
    }
}

fn write_journal(path: &Path, cid: &ContentId) -> std::io::Result<()> {
    let record = JournalRecord {
        cid: cid.clone(),
        updated_at: Utc::now(),
    };
    let bytes = serde_json::to_vec_pretty(&record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let staging = path.with_extension("tmp");
    std::fs::write(&staging, bytes)?;
    std::fs::rename(&staging, path)
}
