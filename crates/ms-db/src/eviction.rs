//! Proportional least-recently-used pruning.
//!
//! Each pass inspects the `clamp(round(f * n), 1, n)` records with the
//! oldest `last_update` and asks the caller whether to keep each one.
//! Rejected records are deleted. Kept records are either touched (moved to
//! the back of the LRU order) or have their mtime reset to `0` so the next
//! scan re-tests them. Repeated passes therefore walk the whole namespace
//! one fraction at a time.

use std::collections::HashMap;

use ms_core::{fs, Error, Result};

use crate::models::{OldestRow, RecordKey};
use crate::namespace::Namespace;
use crate::queries::records;
use crate::store::RecordStore;

/// What happens to records the caller keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionMode {
    /// Touch `last_update` so the record goes to the back of the queue.
    Evict,
    /// Reset `mtime` to `0`, leaving `last_update` alone, forcing a re-test.
    /// Records already at `0` are not selected.
    Reset,
}

/// Counts from one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    pub inspected: u64,
    pub evicted: u64,
    pub reset: u64,
    pub touched: u64,
}

impl EvictionOutcome {
    /// Records deleted or reset.
    pub fn affected(&self) -> u64 {
        self.evicted + self.reset
    }
}

/// Number of records one pass inspects for a namespace of `n` records.
pub fn eviction_limit(n: u64, fraction: f64) -> u64 {
    if n == 0 {
        return 0;
    }
    let target = (fraction * n as f64).round() as u64;
    target.clamp(1, n)
}

#[derive(Clone)]
pub struct EvictionEngine {
    store: RecordStore,
}

impl EvictionEngine {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Run one pass over `ns`.
    ///
    /// The oldest rows are read and handed to `keep` before any write lock
    /// is taken, since `keep` usually stats files. The verdicts are then
    /// applied in one `IMMEDIATE` transaction, which selects the oldest
    /// rows again and acts only on rows that are unchanged since `keep`
    /// saw them. Rows a concurrent writer updated in between are left for
    /// the next pass.
    pub fn run(
        &self,
        ns: &Namespace,
        fraction: f64,
        mode: EvictionMode,
        mut keep: impl FnMut(&RecordKey) -> bool,
    ) -> Result<EvictionOutcome> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::Validation(format!(
                "eviction fraction {fraction} is outside (0, 1]"
            )));
        }
        let skip_sentinel = mode == EvictionMode::Reset;

        let (limit, candidates) = {
            let conn = self.store.conn()?;
            let n = records::count_records(&conn, ns)?;
            let limit = eviction_limit(n, fraction);
            if limit == 0 {
                return Ok(EvictionOutcome::default());
            }
            (limit, records::select_oldest(&conn, ns, limit, skip_sentinel)?)
        };

        let verdicts: HashMap<i64, (OldestRow, bool)> = candidates
            .into_iter()
            .map(|row| {
                let kept = keep(&row.key);
                (row.rowid, (row, kept))
            })
            .collect();

        let outcome = self.store.write_tx(|tx| {
            let rows = records::select_oldest(tx, ns, limit, skip_sentinel)?;
            let mut discard = Vec::new();
            let mut retain = Vec::new();
            for row in &rows {
                match verdicts.get(&row.rowid) {
                    Some((seen, kept)) if seen == row => {
                        if *kept {
                            retain.push(row.rowid);
                        } else {
                            discard.push(row.rowid);
                        }
                    }
                    _ => {}
                }
            }

            let mut outcome = EvictionOutcome {
                inspected: (discard.len() + retain.len()) as u64,
                evicted: records::delete_rows(tx, ns, &discard)? as u64,
                ..EvictionOutcome::default()
            };
            match mode {
                EvictionMode::Evict => {
                    outcome.touched = records::touch_rows(tx, ns, &retain, fs::now_secs())? as u64;
                }
                EvictionMode::Reset => {
                    outcome.reset = records::reset_rows(tx, ns, &retain)? as u64;
                }
            }
            Ok(outcome)
        })?;

        tracing::debug!(
            namespace = %ns,
            ?mode,
            inspected = outcome.inspected,
            evicted = outcome.evicted,
            reset = outcome.reset,
            "Eviction pass complete"
        );
        Ok(outcome)
    }
}
