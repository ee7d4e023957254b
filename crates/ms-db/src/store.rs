//! Pooled record store shared by the timestamp store and metadata cache.
//!
//! Single-record operations run in SQLite's implicit autocommit
//! transaction. Multi-record writes go through [`RecordStore::write_tx`],
//! which opens an `IMMEDIATE` transaction so that concurrent writers queue
//! on the database lock (bounded by the busy timeout) instead of failing
//! when a deferred transaction tries to upgrade.

use ms_core::config::DatabaseConfig;
use ms_core::{fs, Error, Result};
use rusqlite::{Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};

use crate::models::{NewRecord, Record, RecordKey};
use crate::namespace::Namespace;
use crate::pool::{self, DbPool, PoolOptions, PooledConnection};
use crate::queries::records;

/// Generic keyed record persistence over an r2d2 SQLite pool.
#[derive(Clone)]
pub struct RecordStore {
    pool: DbPool,
}

impl RecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (and migrate) the on-disk store described by `config`.
    pub fn open(config: &DatabaseConfig, providers: &[&str]) -> Result<Self> {
        let path = config.resolved_path();
        let pool = pool::init_pool(&path, &PoolOptions::from(config), providers)?;
        Ok(Self::new(pool))
    }

    /// Open a fresh in-memory store.
    pub fn open_in_memory(providers: &[&str]) -> Result<Self> {
        Ok(Self::new(pool::init_memory_pool(providers)?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// A scoped connection, returned to the pool on drop.
    pub fn conn(&self) -> Result<PooledConnection> {
        pool::get_conn(&self.pool)
    }

    /// Run `f` inside an `IMMEDIATE` transaction, committing on `Ok` and
    /// rolling back on `Err` or panic.
    pub fn write_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)
            .map_err(|e| Error::database(e.to_string()))?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        Ok(value)
    }

    pub fn get(&self, ns: &Namespace, path: &Path) -> Result<Option<Record>> {
        records::get_record(&*self.conn()?, ns, path)
    }

    /// Upsert one record; `last_update` becomes now.
    pub fn put(&self, ns: &Namespace, record: &NewRecord) -> Result<()> {
        records::upsert_record(&*self.conn()?, ns, record, fs::now_secs())
    }

    /// Upsert many records in one transaction.
    pub fn put_many(&self, ns: &Namespace, batch: &[NewRecord]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let now = fs::now_secs();
        self.write_tx(|tx| {
            for record in batch {
                records::upsert_record(tx, ns, record, now)?;
            }
            Ok(batch.len())
        })
    }

    pub fn exists(&self, ns: &Namespace, path: &Path) -> Result<bool> {
        records::record_exists(&*self.conn()?, ns, path, None)
    }

    /// Delete the records for `paths` in one transaction.
    pub fn delete_many(&self, ns: &Namespace, paths: &[PathBuf]) -> Result<usize> {
        if paths.is_empty() {
            return Ok(0);
        }
        self.write_tx(|tx| records::delete_records(tx, ns, paths))
    }

    pub fn all_keys(&self, ns: &Namespace) -> Result<Vec<RecordKey>> {
        records::list_keys(&*self.conn()?, ns)
    }

    pub fn count(&self, ns: &Namespace) -> Result<u64> {
        records::count_records(&*self.conn()?, ns)
    }
}
