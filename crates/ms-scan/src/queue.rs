//! Downstream work queue.

use std::path::{Path, PathBuf};

use ms_core::{LibraryId, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A file accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedFile {
    pub path: PathBuf,
    pub library_id: LibraryId,
    pub priority_score: i64,
}

/// Receives accepted files. Ordering by priority is the implementor's
/// business; the dispatcher forwards files in whatever order testers
/// finish them.
pub trait WorkQueue: Send + Sync {
    fn enqueue(&self, path: &Path, library_id: LibraryId, priority_score: i64) -> Result<()>;
}

/// In-memory queue, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<Vec<QueuedFile>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<QueuedFile> {
        self.items.lock().clone()
    }

    /// Take everything queued so far, highest priority first.
    pub fn drain(&self) -> Vec<QueuedFile> {
        let mut items = std::mem::take(&mut *self.items.lock());
        items.sort_by(|a, b| {
            b.priority_score
                .cmp(&a.priority_score)
                .then_with(|| a.path.cmp(&b.path))
        });
        items
    }
}

impl WorkQueue for MemoryQueue {
    fn enqueue(&self, path: &Path, library_id: LibraryId, priority_score: i64) -> Result<()> {
        self.items.lock().push(QueuedFile {
            path: path.to_path_buf(),
            library_id,
            priority_score,
        });
        Ok(())
    }
}
