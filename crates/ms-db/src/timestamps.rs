//! Per-library change detection.
//!
//! A timestamp record holds the mtime a file had when it was last accepted
//! and processed. A file whose current mtime equals the stored value is
//! unchanged and can be skipped by incremental scans.

use ms_core::{fs, LibraryId, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::NewRecord;
use crate::namespace::Namespace;
use crate::queries::records;
use crate::store::RecordStore;

/// One `(library, path, mtime)` entry for bulk writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampEntry {
    pub library_id: LibraryId,
    pub path: PathBuf,
    pub mtime: i64,
}

#[derive(Clone)]
pub struct TimestampStore {
    store: RecordStore,
}

impl TimestampStore {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// True iff a record exists and its mtime matches the file on disk.
    ///
    /// Stat failures are returned as errors rather than read as "changed".
    pub fn is_unchanged(&self, library_id: LibraryId, path: &Path) -> Result<bool> {
        let mtime = fs::mtime_secs(path)?;
        self.is_unchanged_at(library_id, path, mtime)
    }

    /// Like [`TimestampStore::is_unchanged`] with an mtime the caller has
    /// already read.
    pub fn is_unchanged_at(&self, library_id: LibraryId, path: &Path, mtime: i64) -> Result<bool> {
        let conn = self.store.conn()?;
        records::record_exists(&conn, &Namespace::timestamps(library_id), path, Some(mtime))
    }

    /// The stored mtime, if any.
    pub fn get(&self, library_id: LibraryId, path: &Path) -> Result<Option<i64>> {
        Ok(self
            .store
            .get(&Namespace::timestamps(library_id), path)?
            .map(|r| r.mtime))
    }

    /// Upsert one record and refresh its `last_update`.
    pub fn record_seen(&self, library_id: LibraryId, path: &Path, mtime: i64) -> Result<()> {
        self.store
            .put(&Namespace::timestamps(library_id), &NewRecord::new(path, mtime))
    }

    /// Upsert many records, possibly across libraries, in one transaction.
    pub fn record_seen_bulk(&self, entries: &[TimestampEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let now = fs::now_secs();
        self.store.write_tx(|tx| {
            for entry in entries {
                records::upsert_record(
                    tx,
                    &Namespace::timestamps(entry.library_id),
                    &NewRecord::new(entry.path.clone(), entry.mtime),
                    now,
                )?;
            }
            Ok(entries.len())
        })
    }

    /// Tracked paths, for one library or all of them.
    pub fn all_paths(&self, library_id: Option<LibraryId>) -> Result<Vec<(LibraryId, PathBuf)>> {
        let keys = self.store.all_keys(&Namespace::Timestamps(library_id))?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.library_id.map(|lib| (lib, k.path)))
            .collect())
    }

    /// Point-in-time `path -> mtime` snapshot of one library.
    pub fn all_as_map(&self, library_id: LibraryId) -> Result<HashMap<PathBuf, i64>> {
        let conn = self.store.conn()?;
        records::list_mtimes(&conn, &Namespace::timestamps(library_id))
    }

    /// Delete the given paths from one library.
    pub fn remove_orphans(&self, library_id: LibraryId, paths: &[PathBuf]) -> Result<usize> {
        self.store
            .delete_many(&Namespace::timestamps(library_id), paths)
    }

    pub fn count(&self, library_id: Option<LibraryId>) -> Result<u64> {
        self.store.count(&Namespace::Timestamps(library_id))
    }
}
