//! Logical record namespaces and their table mapping.
//!
//! The timestamp store lives in one `timestamps` table keyed by
//! `(library_id, path)`. Each metadata provider gets its own
//! `metadata_<provider>` table keyed by `path`. A [`Namespace`] names one of
//! those tables and, for timestamps, optionally narrows it to one library.

use ms_core::{Error, LibraryId, Result};
use rusqlite::types::Value;
use std::fmt;
use std::path::Path;

/// Name of the change-detection table.
pub const TIMESTAMPS_TABLE: &str = "timestamps";

/// Prefix of every per-provider metadata table.
pub const METADATA_TABLE_PREFIX: &str = "metadata_";

/// A table (or a library-scoped slice of one) holding records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Timestamp records, either for one library or for all of them.
    Timestamps(Option<LibraryId>),
    /// Cached output of one metadata provider.
    Metadata(String),
}

impl Namespace {
    /// Timestamp records of a single library.
    pub fn timestamps(library_id: LibraryId) -> Self {
        Namespace::Timestamps(Some(library_id))
    }

    /// Timestamp records across every library.
    pub fn all_timestamps() -> Self {
        Namespace::Timestamps(None)
    }

    /// Metadata records for `provider`, which must match `[a-z0-9_]+`.
    pub fn metadata(provider: &str) -> Result<Self> {
        validate_provider_name(provider)?;
        Ok(Namespace::Metadata(provider.to_string()))
    }

    /// The SQL table backing this namespace.
    pub fn table(&self) -> String {
        match self {
            Namespace::Timestamps(_) => TIMESTAMPS_TABLE.to_string(),
            Namespace::Metadata(provider) => format!("{METADATA_TABLE_PREFIX}{provider}"),
        }
    }

    /// Like [`Namespace::table`], but re-validates a directly constructed
    /// provider name before it is interpolated into SQL.
    pub(crate) fn checked_table(&self) -> Result<String> {
        if let Namespace::Metadata(provider) = self {
            validate_provider_name(provider)?;
        }
        Ok(self.table())
    }

    /// Whether rows in this namespace carry a payload column.
    pub fn has_payload(&self) -> bool {
        matches!(self, Namespace::Metadata(_))
    }

    /// Columns that make up a [`crate::models::RecordKey`], in `from_row` order.
    pub(crate) fn key_cols(&self) -> &'static str {
        match self {
            Namespace::Timestamps(_) => "library_id, path",
            Namespace::Metadata(_) => "NULL, path",
        }
    }

    /// `WHERE` fragment and parameters restricting a query to this namespace.
    ///
    /// Always returns a valid clause (`1 = 1` when unscoped) so callers can
    /// append further `AND` conditions.
    pub(crate) fn scope(&self) -> (&'static str, Vec<Value>) {
        match self {
            Namespace::Timestamps(Some(lib)) => ("library_id = ?", vec![Value::Integer(lib.get())]),
            _ => ("1 = 1", Vec::new()),
        }
    }

    /// `WHERE` fragment and parameters selecting one record by path.
    ///
    /// Timestamp records need a library to be addressable, so an unscoped
    /// timestamp namespace is rejected.
    pub(crate) fn key_filter(&self, path: &str) -> Result<(&'static str, Vec<Value>)> {
        match self {
            Namespace::Timestamps(Some(lib)) => Ok((
                "library_id = ? AND path = ?",
                vec![Value::Integer(lib.get()), Value::Text(path.to_string())],
            )),
            Namespace::Timestamps(None) => Err(Error::Validation(
                "timestamp records are addressed per library".into(),
            )),
            Namespace::Metadata(_) => Ok(("path = ?", vec![Value::Text(path.to_string())])),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Timestamps(Some(lib)) => write!(f, "timestamps[{lib}]"),
            Namespace::Timestamps(None) => write!(f, "timestamps"),
            Namespace::Metadata(provider) => write!(f, "metadata[{provider}]"),
        }
    }
}

/// Reject provider names that cannot be used as a table suffix.
pub fn validate_provider_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "provider name '{name}' must match [a-z0-9_]+"
        )))
    }
}

/// Convert a filesystem path to its stored text form.
pub fn path_key(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Validation(format!("path is not valid UTF-8: {}", path.display())))
}
