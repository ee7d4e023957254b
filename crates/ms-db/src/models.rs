//! Rust structs mapping to record rows.
//!
//! Rows are read with `SELECT {key_cols}, mtime, last_update, {payload}` so
//! every model's `from_row` uses fixed column positions.

use ms_core::LibraryId;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn parse_payload(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(text) => serde_json::from_str(&text).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// RecordKey
// ---------------------------------------------------------------------------

/// Identity of one record.
///
/// `library_id` is set for timestamp records and `None` for metadata
/// records, whose tables are keyed by path alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub library_id: Option<LibraryId>,
    pub path: PathBuf,
}

impl RecordKey {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let library_id: Option<i64> = row.get(0)?;
        let path: String = row.get(1)?;
        Ok(Self {
            library_id: library_id.map(LibraryId::new),
            path: PathBuf::from(path),
        })
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Record {
    pub key: RecordKey,
    /// File modification time observed when the record was written.
    pub mtime: i64,
    /// Wall-clock time of the last write or eviction touch.
    pub last_update: i64,
    pub payload: Option<serde_json::Value>,
}

impl Record {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            key: RecordKey::from_row(row)?,
            mtime: row.get(2)?,
            last_update: row.get(3)?,
            payload: parse_payload(row, 4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// NewRecord
// ---------------------------------------------------------------------------

/// Values for an upsert. `last_update` is always set by the store.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub path: PathBuf,
    pub mtime: i64,
    pub payload: Option<serde_json::Value>,
}

impl NewRecord {
    pub fn new(path: impl Into<PathBuf>, mtime: i64) -> Self {
        Self {
            path: path.into(),
            mtime,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

// ---------------------------------------------------------------------------
// Eviction candidates
// ---------------------------------------------------------------------------

/// A record selected by the eviction scan, with its physical row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OldestRow {
    pub rowid: i64,
    pub key: RecordKey,
    pub last_update: i64,
}

impl OldestRow {
    /// Expects `rowid, {key_cols}, last_update`.
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let library_id: Option<i64> = row.get(1)?;
        let path: String = row.get(2)?;
        Ok(Self {
            rowid: row.get(0)?,
            key: RecordKey {
                library_id: library_id.map(LibraryId::new),
                path: PathBuf::from(path),
            },
            last_update: row.get(3)?,
        })
    }
}
