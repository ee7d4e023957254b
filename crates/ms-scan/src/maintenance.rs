//! Store maintenance: proportional pruning, rolling re-validation, full
//! orphan sweeps and explicit timestamp edits.
//!
//! Pruning operations share one advisory lock taken with `try_lock`. A
//! request arriving while another holds it is dropped with
//! [`MaintenanceStatus::Skipped`]; the operations are idempotent and cheap
//! to retry on the next trigger.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use ms_core::events::EventPayload;
use ms_core::{fs, Error, LibraryId, Result};
use ms_db::{EvictionMode, Namespace, TimestampEntry};
use parking_lot::Mutex;
use serde::Serialize;

use crate::candidates::{self, CandidateRequest};
use crate::context::ScanContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Completed { affected: u64 },
    /// Another maintenance operation held the lock.
    Skipped,
    /// The operation raised; the message is also logged.
    Failed { error: String },
}

pub struct Maintenance {
    ctx: ScanContext,
    lock: Mutex<()>,
}

impl Maintenance {
    pub fn new(ctx: ScanContext) -> Self {
        Self {
            ctx,
            lock: Mutex::new(()),
        }
    }

    /// One proportional LRU pass over timestamp records.
    ///
    /// Records are kept while their library is configured, the path passes
    /// the library filter and the file exists. Without a library, every
    /// provider's metadata cache gets a pass too, keeping files that still
    /// exist.
    pub fn prune(&self, library_id: Option<LibraryId>, fraction: f64) -> Result<MaintenanceStatus> {
        check_fraction(fraction)?;

        Ok(self.guarded("prune", || {
            let libraries = &self.ctx.libraries;
            let ns = Namespace::Timestamps(library_id);
            let mut affected = self
                .ctx
                .eviction
                .run(&ns, fraction, EvictionMode::Evict, |key| {
                    key.library_id
                        .map(|lib| libraries.keeps(lib, &key.path))
                        .unwrap_or(false)
                })?
                .affected();

            if library_id.is_none() {
                for provider in self.ctx.providers.names() {
                    let ns = Namespace::metadata(provider)?;
                    affected += self
                        .ctx
                        .eviction
                        .run(&ns, fraction, EvictionMode::Evict, |key| key.path.exists())?
                        .affected();
                }
            }
            Ok(affected)
        }))
    }

    /// Reset the mtime of the oldest fraction of a library's timestamp
    /// records so the next scan re-tests them. Records that no longer
    /// belong to the library are deleted instead.
    pub fn reset_oldest(&self, library_id: LibraryId, fraction: f64) -> Result<MaintenanceStatus> {
        check_fraction(fraction)?;
        if self.ctx.libraries.get(library_id).is_none() {
            return Err(Error::Validation(format!("unknown library {library_id}")));
        }

        Ok(self.guarded("reset_oldest", || {
            let libraries = &self.ctx.libraries;
            let outcome = self.ctx.eviction.run(
                &Namespace::timestamps(library_id),
                fraction,
                EvictionMode::Reset,
                |key| libraries.keeps(library_id, &key.path),
            )?;
            Ok(outcome.affected())
        }))
    }

    /// Delete every timestamp record that no longer belongs to its
    /// library, in one sweep.
    ///
    /// Over all libraries this also drops records of libraries that are no
    /// longer configured, and metadata rows whose path no timestamp
    /// record references.
    pub fn prune_orphans(&self, library_id: Option<LibraryId>) -> Result<MaintenanceStatus> {
        Ok(self.guarded("prune_orphans", || {
            let libraries = &self.ctx.libraries;
            let tracked = self.ctx.timestamps.all_paths(library_id)?;

            let mut orphans: BTreeMap<LibraryId, Vec<PathBuf>> = BTreeMap::new();
            let mut referenced = HashSet::new();
            for (lib, path) in tracked {
                if libraries.keeps(lib, &path) {
                    referenced.insert(path);
                } else {
                    orphans.entry(lib).or_default().push(path);
                }
            }

            let mut affected = 0u64;
            for (lib, paths) in &orphans {
                let removed = self.ctx.timestamps.remove_orphans(*lib, paths)?;
                tracing::debug!(library_id = %lib, removed, "Removed orphaned timestamps");
                affected += removed as u64;
            }

            if library_id.is_none() {
                for provider in self.ctx.providers.names() {
                    let stale: Vec<PathBuf> = self
                        .ctx
                        .metadata
                        .all_paths(provider)?
                        .into_iter()
                        .filter(|p| !referenced.contains(p))
                        .collect();
                    let removed = self.ctx.metadata.remove_orphans(provider, &stale)?;
                    tracing::debug!(provider, removed, "Removed orphaned metadata");
                    affected += removed as u64;
                }
            }
            Ok(affected)
        }))
    }

    /// Set the stored mtime of every requested in-library file to `0`, so
    /// the next incremental scan treats it as changed.
    pub fn reset_timestamps(&self, requests: &[CandidateRequest]) -> Result<usize> {
        let resolved = candidates::resolve(
            &self.ctx.libraries,
            requests,
            self.ctx.config.scan.follow_symlinks,
        )?;
        let entries: Vec<TimestampEntry> = resolved
            .into_iter()
            .flat_map(|(library_id, paths)| {
                paths.into_iter().map(move |path| TimestampEntry {
                    library_id,
                    path,
                    mtime: 0,
                })
            })
            .collect();

        let written = self.ctx.timestamps.record_seen_bulk(&entries)?;
        tracing::info!(files = written, "Reset timestamps");
        Ok(written)
    }

    /// Record the current mtime of every requested in-library file, so
    /// the next incremental scan skips it.
    pub fn update_timestamps(&self, requests: &[CandidateRequest]) -> Result<usize> {
        let resolved = candidates::resolve(
            &self.ctx.libraries,
            requests,
            self.ctx.config.scan.follow_symlinks,
        )?;

        let mut entries = Vec::new();
        for (library_id, paths) in resolved {
            for path in paths {
                match fs::mtime_secs(&path) {
                    Ok(mtime) => entries.push(TimestampEntry {
                        library_id,
                        path,
                        mtime,
                    }),
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "Cannot stat file, skipping");
                    }
                }
            }
        }

        let written = self.ctx.timestamps.record_seen_bulk(&entries)?;
        tracing::info!(files = written, "Updated timestamps");
        Ok(written)
    }

    fn guarded(&self, operation: &str, op: impl FnOnce() -> Result<u64>) -> MaintenanceStatus {
        let Some(_guard) = self.lock.try_lock() else {
            tracing::info!(operation, "Maintenance already running, skipping");
            self.ctx.events.broadcast(EventPayload::MaintenanceSkipped {
                operation: operation.to_string(),
            });
            return MaintenanceStatus::Skipped;
        };

        match op() {
            Ok(affected) => {
                tracing::info!(operation, affected, "Maintenance complete");
                self.ctx.events.broadcast(EventPayload::MaintenanceComplete {
                    operation: operation.to_string(),
                    affected,
                });
                MaintenanceStatus::Completed { affected }
            }
            Err(e) => {
                tracing::error!(operation, error = %e, "Maintenance failed");
                self.ctx.events.broadcast(EventPayload::MaintenanceFailed {
                    operation: operation.to_string(),
                    error: e.to_string(),
                });
                MaintenanceStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn check_fraction(fraction: f64) -> Result<()> {
    if fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "fraction {fraction} is outside (0, 1]"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MetadataProvider, ProviderRegistry};
    use ms_core::config::{Config, LibraryConfig};
    use ms_db::RecordStore;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Arc;

    const LIB: LibraryId = LibraryId::new(1);

    struct Null;

    impl MetadataProvider for Null {
        fn name(&self) -> &str {
            "null"
        }

        fn run(&self, _path: &Path) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    fn setup(root: &Path) -> (Maintenance, ScanContext) {
        let mut config = Config::default();
        config.libraries.push(LibraryConfig {
            id: LIB,
            name: "Movies".into(),
            path: root.to_path_buf(),
            extensions: vec!["mkv".into()],
            ignored_paths: vec![],
            enabled: true,
        });
        let mut providers = ProviderRegistry::new();
        providers.register(Arc::new(Null)).unwrap();
        let ctx = ScanContext::new(config, RecordStore::open_in_memory(&[]).unwrap(), providers)
            .unwrap();
        (Maintenance::new(ctx.clone()), ctx)
    }

    fn touch(path: &Path) -> PathBuf {
        std::fs::write(path, b"x").unwrap();
        path.to_path_buf()
    }

    #[test]
    fn invalid_fraction_is_rejected_before_locking() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _) = setup(dir.path());
        assert!(matches!(m.prune(None, 0.0), Err(Error::Validation(_))));
        assert!(matches!(m.prune(None, 1.5), Err(Error::Validation(_))));
        assert!(matches!(m.reset_oldest(LIB, f64::NAN), Err(Error::Validation(_))));
        assert!(matches!(
            m.reset_oldest(LibraryId::new(9), 0.5),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn busy_lock_skips() {
        let dir = tempfile::tempdir().unwrap();
        let (m, ctx) = setup(dir.path());
        let _held = m.lock.lock();
        assert!(m.lock.is_locked());
        assert_eq!(m.prune(None, 0.5).unwrap(), MaintenanceStatus::Skipped);
        assert!(matches!(
            ctx.events.recent_events(1)[0].payload,
            EventPayload::MaintenanceSkipped { .. }
        ));
    }

    #[test]
    fn prune_removes_missing_and_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let (m, ctx) = setup(dir.path());
        let kept = touch(&dir.path().join("a.mkv"));
        let gone = dir.path().join("gone.mkv");
        let other_lib = LibraryId::new(2);

        ctx.timestamps.record_seen(LIB, &kept, 1).unwrap();
        ctx.timestamps.record_seen(LIB, &gone, 1).unwrap();
        ctx.timestamps.record_seen(other_lib, &kept, 1).unwrap();
        ctx.metadata.put("null", &gone, 1, &json!({})).unwrap();
        ctx.metadata.put("null", &kept, 1, &json!({})).unwrap();

        assert_eq!(
            m.prune(None, 1.0).unwrap(),
            MaintenanceStatus::Completed { affected: 3 }
        );
        assert_eq!(ctx.timestamps.count(None).unwrap(), 1);
        assert_eq!(ctx.timestamps.get(LIB, &kept).unwrap(), Some(1));
        assert_eq!(ctx.metadata.count("null").unwrap(), 1);
    }

    #[test]
    fn records_outside_the_root_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let (m, ctx) = setup(dir.path());
        let kept = touch(&dir.path().join("a.mkv"));
        let stray = touch(&elsewhere.path().join("elsewhere.mkv"));
        ctx.timestamps.record_seen(LIB, &kept, 1).unwrap();
        ctx.timestamps.record_seen(LIB, &stray, 1).unwrap();

        assert_eq!(
            m.prune(Some(LIB), 1.0).unwrap(),
            MaintenanceStatus::Completed { affected: 1 }
        );
        assert_eq!(ctx.timestamps.get(LIB, &stray).unwrap(), None);

        ctx.timestamps.record_seen(LIB, &stray, 1).unwrap();
        assert_eq!(
            m.prune_orphans(Some(LIB)).unwrap(),
            MaintenanceStatus::Completed { affected: 1 }
        );
        assert_eq!(ctx.timestamps.all_paths(Some(LIB)).unwrap(), vec![(LIB, kept)]);
    }

    #[test]
    fn reset_oldest_forces_retest() {
        let dir = tempfile::tempdir().unwrap();
        let (m, ctx) = setup(dir.path());
        let a = touch(&dir.path().join("a.mkv"));
        ctx.timestamps.record_seen(LIB, &a, 55).unwrap();

        assert_eq!(
            m.reset_oldest(LIB, 1.0).unwrap(),
            MaintenanceStatus::Completed { affected: 1 }
        );
        assert_eq!(ctx.timestamps.get(LIB, &a).unwrap(), Some(0));
        // Sentinel rows are not selected again.
        assert_eq!(
            m.reset_oldest(LIB, 1.0).unwrap(),
            MaintenanceStatus::Completed { affected: 0 }
        );
    }

    #[test]
    fn prune_orphans_sweeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (m, ctx) = setup(dir.path());
        let kept = touch(&dir.path().join("a.mkv"));
        let wrong_ext = touch(&dir.path().join("a.txt"));
        let unreferenced = touch(&dir.path().join("b.mkv"));

        ctx.timestamps.record_seen(LIB, &kept, 1).unwrap();
        ctx.timestamps.record_seen(LIB, &wrong_ext, 1).unwrap();
        ctx.timestamps.record_seen(LibraryId::new(7), &kept, 1).unwrap();
        ctx.metadata.put("null", &kept, 1, &json!({})).unwrap();
        ctx.metadata.put("null", &unreferenced, 1, &json!({})).unwrap();

        assert_eq!(
            m.prune_orphans(None).unwrap(),
            MaintenanceStatus::Completed { affected: 3 }
        );
        assert_eq!(ctx.timestamps.count(None).unwrap(), 1);
        assert_eq!(ctx.metadata.all_paths("null").unwrap(), vec![kept]);
    }

    #[test]
    fn prune_orphans_single_library_leaves_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (m, ctx) = setup(dir.path());
        let gone = dir.path().join("gone.mkv");
        ctx.timestamps.record_seen(LIB, &gone, 1).unwrap();
        ctx.metadata.put("null", &gone, 1, &json!({})).unwrap();

        assert_eq!(
            m.prune_orphans(Some(LIB)).unwrap(),
            MaintenanceStatus::Completed { affected: 1 }
        );
        assert_eq!(ctx.metadata.count("null").unwrap(), 1);
    }

    #[test]
    fn reset_and_update_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let (m, ctx) = setup(dir.path());
        let a = touch(&dir.path().join("a.mkv"));
        touch(&dir.path().join("notes.txt"));
        let req = [CandidateRequest::new(LIB, dir.path())];

        assert_eq!(m.update_timestamps(&req).unwrap(), 1);
        assert_eq!(
            ctx.timestamps.get(LIB, &a).unwrap(),
            Some(fs::mtime_secs(&a).unwrap())
        );
        assert!(ctx.timestamps.is_unchanged(LIB, &a).unwrap());

        assert_eq!(m.reset_timestamps(&req).unwrap(), 1);
        assert_eq!(ctx.timestamps.get(LIB, &a).unwrap(), Some(0));

        let bad = [CandidateRequest::new(LIB, "/etc")];
        assert!(matches!(m.update_timestamps(&bad), Err(Error::Validation(_))));
    }
}
