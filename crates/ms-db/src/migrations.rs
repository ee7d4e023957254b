//! Introspective schema migration.
//!
//! Record tables are not versioned. On startup every expected table is
//! compared against `PRAGMA table_info` and brought up to date:
//!
//! - a missing table is created;
//! - a table without its key columns cannot be salvaged and is dropped and
//!   recreated empty;
//! - a missing `last_update` column is added and backfilled from `mtime`;
//! - a metadata table still using the legacy `data` column has it renamed
//!   to `payload`.
//!
//! Every change is reported, so running the migrations against an
//! up-to-date store yields an empty [`MigrationReport`].

use ms_core::{Error, Result};
use rusqlite::Connection;

use crate::namespace::Namespace;

/// One schema change applied by [`run_migrations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    CreatedTable(String),
    /// The table was dropped and recreated empty.
    RecreatedTable {
        table: String,
        reason: String,
    },
    /// `last_update` was added and backfilled from `mtime`.
    AddedLastUpdate {
        table: String,
        backfilled: usize,
    },
    RenamedPayload(String),
    CreatedIndex(String),
}

/// Changes applied by one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub changes: Vec<SchemaChange>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Bring the timestamp table and one metadata table per provider up to date.
pub fn run_migrations(conn: &Connection, providers: &[&str]) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    migrate_namespace(conn, &Namespace::all_timestamps(), &mut report)?;
    for provider in providers {
        let ns = Namespace::metadata(provider)?;
        migrate_namespace(conn, &ns, &mut report)?;
    }

    for change in &report.changes {
        match change {
            SchemaChange::RecreatedTable { .. } => {}
            other => tracing::info!(?other, "Applied schema change"),
        }
    }

    Ok(report)
}

/// Migrate the table backing a single namespace.
pub fn migrate_namespace(
    conn: &Connection,
    ns: &Namespace,
    report: &mut MigrationReport,
) -> Result<()> {
    let table = ns.checked_table()?;
    let cols = table_columns(conn, &table)?;

    if cols.is_empty() {
        conn.execute_batch(&create_table_sql(ns, &table))
            .map_err(|e| Error::Migration(format!("Failed to create {table}: {e}")))?;
        report.changes.push(SchemaChange::CreatedTable(table.clone()));
    } else if let Some(missing) = missing_key_column(ns, &cols) {
        recreate(conn, ns, &table, &format!("missing key column '{missing}'"), report)?;
    } else {
        let has = |c: &str| cols.iter().any(|col| col == c);
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;
        let mut changes = Vec::new();

        let altered: rusqlite::Result<()> = (|| {
            if ns.has_payload() && !has("payload") {
                tx.execute_batch(&format!("ALTER TABLE {table} RENAME COLUMN data TO payload"))?;
                changes.push(SchemaChange::RenamedPayload(table.clone()));
            }
            if !has("last_update") {
                tx.execute_batch(&format!(
                    "ALTER TABLE {table} ADD COLUMN last_update INTEGER NOT NULL DEFAULT 0"
                ))?;
                let backfilled = tx.execute(&format!("UPDATE {table} SET last_update = mtime"), [])?;
                changes.push(SchemaChange::AddedLastUpdate {
                    table: table.clone(),
                    backfilled,
                });
            }
            Ok(())
        })();

        let outcome = altered.and_then(|()| tx.commit());
        match outcome {
            Ok(()) => report.changes.extend(changes),
            Err(e) => {
                // The transaction rolled back on drop.
                recreate(conn, ns, &table, &format!("migration failed: {e}"), report)?;
            }
        }
    }

    let index = format!("idx_{table}_last_update");
    if !index_exists(conn, &index)? {
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {table}(last_update)"
        ))
        .map_err(|e| Error::Migration(format!("Failed to create {index}: {e}")))?;
        report.changes.push(SchemaChange::CreatedIndex(index));
    }

    Ok(())
}

fn recreate(
    conn: &Connection,
    ns: &Namespace,
    table: &str,
    reason: &str,
    report: &mut MigrationReport,
) -> Result<()> {
    tracing::error!(
        table,
        reason,
        "Dropping and recreating table; its cached records are lost"
    );
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; {}",
        create_table_sql(ns, table)
    ))
    .map_err(|e| Error::Migration(format!("Failed to recreate {table}: {e}")))?;
    report.changes.push(SchemaChange::RecreatedTable {
        table: table.to_string(),
        reason: reason.to_string(),
    });
    Ok(())
}

fn create_table_sql(ns: &Namespace, table: &str) -> String {
    match ns {
        Namespace::Timestamps(_) => format!(
            "CREATE TABLE {table} (
                library_id  INTEGER NOT NULL,
                path        TEXT NOT NULL,
                mtime       INTEGER NOT NULL,
                last_update INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (library_id, path)
            );"
        ),
        Namespace::Metadata(_) => format!(
            "CREATE TABLE {table} (
                path        TEXT PRIMARY KEY,
                mtime       INTEGER NOT NULL,
                last_update INTEGER NOT NULL DEFAULT 0,
                payload     TEXT NOT NULL
            );"
        ),
    }
}

/// Columns without which existing rows cannot be interpreted.
fn missing_key_column(ns: &Namespace, cols: &[String]) -> Option<&'static str> {
    let required: &[&str] = match ns {
        Namespace::Timestamps(_) => &["library_id", "path", "mtime"],
        Namespace::Metadata(_) => &["path", "mtime"],
    };
    let has = |c: &str| cols.iter().any(|col| col == c);
    if let Some(missing) = required.iter().find(|c| !has(**c)) {
        return Some(*missing);
    }
    if ns.has_payload() && !has("payload") && !has("data") {
        return Some("payload");
    }
    None
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))
}

fn index_exists(conn: &Connection, index: &str) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'index' AND name = ?1",
        [index],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn fresh_store_creates_tables_and_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        let report = run_migrations(&conn, &["ffprobe", "mediainfo"]).unwrap();

        let created: Vec<_> = report
            .changes
            .iter()
            .filter(|c| matches!(c, SchemaChange::CreatedTable(_)))
            .collect();
        assert_eq!(created.len(), 3);
        assert!(report
            .changes
            .contains(&SchemaChange::CreatedIndex("idx_timestamps_last_update".into())));
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='metadata_mediainfo'"
            ),
            1
        );
    }

    #[test]
    fn idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, &["ffprobe"]).unwrap();
        let second = run_migrations(&conn, &["ffprobe"]).unwrap();
        assert!(second.is_empty(), "unexpected changes: {:?}", second.changes);
    }

    #[test]
    fn backfills_last_update_exactly_once() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE timestamps (
                library_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                mtime INTEGER NOT NULL,
                PRIMARY KEY (library_id, path)
            );
            INSERT INTO timestamps VALUES (1, '/m/a.mkv', 100);
            INSERT INTO timestamps VALUES (1, '/m/b.mkv', 200);",
        )
        .unwrap();

        let report = run_migrations(&conn, &[]).unwrap();
        let alters: Vec<_> = report
            .changes
            .iter()
            .filter(|c| matches!(c, SchemaChange::AddedLastUpdate { .. }))
            .collect();
        assert_eq!(
            alters,
            vec![&SchemaChange::AddedLastUpdate {
                table: "timestamps".into(),
                backfilled: 2
            }]
        );
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM timestamps WHERE last_update = mtime"),
            2
        );

        let second = run_migrations(&conn, &[]).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn legacy_metadata_table_is_upgraded_in_place() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE metadata_ffprobe (
                path TEXT PRIMARY KEY,
                mtime INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            INSERT INTO metadata_ffprobe VALUES ('/m/a.mkv', 42, '{"format":{}}');"#,
        )
        .unwrap();

        let report = run_migrations(&conn, &["ffprobe"]).unwrap();
        assert!(report
            .changes
            .contains(&SchemaChange::RenamedPayload("metadata_ffprobe".into())));

        let (payload, last_update): (String, i64) = conn
            .query_row(
                "SELECT payload, last_update FROM metadata_ffprobe WHERE path = '/m/a.mkv'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(payload, r#"{"format":{}}"#);
        assert_eq!(last_update, 42);
    }

    #[test]
    fn table_without_library_id_is_recreated() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE timestamps (path TEXT PRIMARY KEY, mtime INTEGER);
             INSERT INTO timestamps VALUES ('/m/a.mkv', 1);",
        )
        .unwrap();

        let report = run_migrations(&conn, &[]).unwrap();
        assert!(matches!(
            report.changes[0],
            SchemaChange::RecreatedTable { ref table, .. } if table == "timestamps"
        ));
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM timestamps"), 0);
        assert!(run_migrations(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn rejects_unsafe_provider_names() {
        let conn = Connection::open_in_memory().unwrap();
        let err = run_migrations(&conn, &["bad-name"]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
