//! Record CRUD and eviction queries, generic over [`Namespace`].
//!
//! Table names are interpolated from a validated namespace; every value goes
//! through a bound parameter.

use ms_core::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{NewRecord, OldestRow, Record, RecordKey};
use crate::namespace::{path_key, Namespace};

fn record_cols(ns: &Namespace) -> String {
    let payload = if ns.has_payload() { "payload" } else { "NULL" };
    format!("{}, mtime, last_update, {payload}", ns.key_cols())
}

/// Get one record by path.
pub fn get_record(conn: &Connection, ns: &Namespace, path: &Path) -> Result<Option<Record>> {
    let table = ns.checked_table()?;
    let (filter, params) = ns.key_filter(path_key(path)?)?;
    let q = format!("SELECT {} FROM {table} WHERE {filter}", record_cols(ns));
    conn.query_row(&q, params_from_iter(params), Record::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Whether a record exists, optionally requiring a specific stored mtime.
///
/// Never reads the payload column.
pub fn record_exists(
    conn: &Connection,
    ns: &Namespace,
    path: &Path,
    mtime: Option<i64>,
) -> Result<bool> {
    let table = ns.checked_table()?;
    let (filter, mut params) = ns.key_filter(path_key(path)?)?;
    let q = match mtime {
        Some(m) => {
            params.push(Value::Integer(m));
            format!("SELECT COUNT(*) > 0 FROM {table} WHERE {filter} AND mtime = ?")
        }
        None => format!("SELECT COUNT(*) > 0 FROM {table} WHERE {filter}"),
    };
    conn.query_row(&q, params_from_iter(params), |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))
}

/// Insert or update a record, stamping `last_update` with `now`.
///
/// `last_update` never moves backwards, even if the wall clock does.
pub fn upsert_record(conn: &Connection, ns: &Namespace, rec: &NewRecord, now: i64) -> Result<()> {
    let table = ns.checked_table()?;
    let path = path_key(&rec.path)?;

    let (sql, params) = match ns {
        Namespace::Timestamps(Some(lib)) => (
            format!(
                "INSERT INTO {table} (library_id, path, mtime, last_update)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(library_id, path) DO UPDATE SET
                    mtime = excluded.mtime,
                    last_update = MAX(last_update, excluded.last_update)"
            ),
            vec![
                Value::Integer(lib.get()),
                Value::Text(path.to_string()),
                Value::Integer(rec.mtime),
                Value::Integer(now),
            ],
        ),
        Namespace::Timestamps(None) => {
            return Err(Error::Validation(
                "timestamp records are addressed per library".into(),
            ))
        }
        Namespace::Metadata(provider) => {
            let payload = rec.payload.as_ref().ok_or_else(|| {
                Error::Validation(format!("{provider} record for {path} has no payload"))
            })?;
            let payload = serde_json::to_string(payload)
                .map_err(|e| Error::provider(provider.as_str(), e.to_string()))?;
            (
                format!(
                    "INSERT INTO {table} (path, mtime, last_update, payload)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(path) DO UPDATE SET
                        mtime = excluded.mtime,
                        last_update = MAX(last_update, excluded.last_update),
                        payload = excluded.payload"
                ),
                vec![
                    Value::Text(path.to_string()),
                    Value::Integer(rec.mtime),
                    Value::Integer(now),
                    Value::Text(payload),
                ],
            )
        }
    };

    conn.prepare_cached(&sql)
        .and_then(|mut stmt| stmt.execute(params_from_iter(params)))
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Delete the records for `paths`. Returns the number of rows removed.
pub fn delete_records(conn: &Connection, ns: &Namespace, paths: &[PathBuf]) -> Result<usize> {
    let table = ns.checked_table()?;
    let mut deleted = 0;
    for path in paths {
        let (filter, params) = ns.key_filter(path_key(path)?)?;
        let q = format!("DELETE FROM {table} WHERE {filter}");
        deleted += conn
            .prepare_cached(&q)
            .and_then(|mut stmt| stmt.execute(params_from_iter(params)))
            .map_err(|e| Error::database(e.to_string()))?;
    }
    Ok(deleted)
}

/// List every key in the namespace, ordered by library and path.
pub fn list_keys(conn: &Connection, ns: &Namespace) -> Result<Vec<RecordKey>> {
    let table = ns.checked_table()?;
    let (scope, params) = ns.scope();
    let q = format!(
        "SELECT {} FROM {table} WHERE {scope} ORDER BY 1, 2",
        ns.key_cols()
    );
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(params), RecordKey::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Read `path -> mtime` for the whole namespace in one query.
pub fn list_mtimes(conn: &Connection, ns: &Namespace) -> Result<HashMap<PathBuf, i64>> {
    let table = ns.checked_table()?;
    let (scope, params) = ns.scope();
    let q = format!("SELECT path, mtime FROM {table} WHERE {scope}");
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            Ok((PathBuf::from(row.get::<_, String>(0)?), row.get::<_, i64>(1)?))
        })
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<std::result::Result<HashMap<_, _>, _>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Count the records in the namespace.
pub fn count_records(conn: &Connection, ns: &Namespace) -> Result<u64> {
    let table = ns.checked_table()?;
    let (scope, params) = ns.scope();
    let q = format!("SELECT COUNT(*) FROM {table} WHERE {scope}");
    let n: i64 = conn
        .query_row(&q, params_from_iter(params), |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))?;
    u64::try_from(n).map_err(|_| Error::database(format!("negative row count {n} in {table}")))
}

/// Select the `limit` least recently updated rows.
///
/// Ties on `last_update` are broken by `rowid` so repeated calls over the
/// same data pick the same rows. With `skip_sentinel`, rows whose mtime is
/// already reset to `0` are ignored.
pub fn select_oldest(
    conn: &Connection,
    ns: &Namespace,
    limit: u64,
    skip_sentinel: bool,
) -> Result<Vec<OldestRow>> {
    let table = ns.checked_table()?;
    let (scope, mut params) = ns.scope();
    let sentinel = if skip_sentinel { " AND mtime != 0" } else { "" };
    params.push(Value::Integer(limit as i64));
    let q = format!(
        "SELECT rowid, {}, last_update FROM {table}
         WHERE {scope}{sentinel}
         ORDER BY last_update ASC, rowid ASC
         LIMIT ?",
        ns.key_cols()
    );
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(params), OldestRow::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))
}

fn update_rows(conn: &Connection, sql: &str, rowids: &[i64], extra: Option<i64>) -> Result<usize> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let mut n = 0;
    for &rowid in rowids {
        n += match extra {
            Some(v) => stmt.execute(rusqlite::params![v, rowid]),
            None => stmt.execute([rowid]),
        }
        .map_err(|e| Error::database(e.to_string()))?;
    }
    Ok(n)
}

/// Set `last_update = now` on the given rows.
pub fn touch_rows(conn: &Connection, ns: &Namespace, rowids: &[i64], now: i64) -> Result<usize> {
    let table = ns.checked_table()?;
    update_rows(
        conn,
        &format!("UPDATE {table} SET last_update = ?1 WHERE rowid = ?2"),
        rowids,
        Some(now),
    )
}

/// Reset `mtime` to the `0` sentinel without touching `last_update`.
pub fn reset_rows(conn: &Connection, ns: &Namespace, rowids: &[i64]) -> Result<usize> {
    let table = ns.checked_table()?;
    update_rows(
        conn,
        &format!("UPDATE {table} SET mtime = 0 WHERE rowid = ?1"),
        rowids,
        None,
    )
}

/// Delete rows by physical row id.
pub fn delete_rows(conn: &Connection, ns: &Namespace, rowids: &[i64]) -> Result<usize> {
    let table = ns.checked_table()?;
    update_rows(
        conn,
        &format!("DELETE FROM {table} WHERE rowid = ?1"),
        rowids,
        None,
    )
}
