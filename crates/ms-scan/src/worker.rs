//! Per-file testing.
//!
//! [`Tester::test_file`] is the unit of work a dispatcher worker performs.
//! It never returns an error: every failure becomes
//! [`FileOutcome::Errored`] so a bad file cannot take the scan down.

use std::path::Path;
use std::sync::Arc;

use ms_core::{fs, LibraryId};
use ms_db::{MetadataCache, TimestampStore};

use crate::chain::FileTestChain;
use crate::context::{FileTestContext, ScanContext};
use crate::provider::ProviderRegistry;
use crate::queue::QueuedFile;

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Timestamp matched; not tested.
    Unchanged,
    /// The chain did not accept it.
    Rejected,
    Accepted(QueuedFile),
    /// Stat, provider or chain failure.
    Errored(String),
}

pub struct Tester {
    timestamps: TimestampStore,
    metadata: MetadataCache,
    providers: Arc<ProviderRegistry>,
    chain: Arc<FileTestChain>,
    incremental: bool,
    caching: bool,
}

impl Tester {
    pub fn new(
        timestamps: TimestampStore,
        metadata: MetadataCache,
        providers: Arc<ProviderRegistry>,
        chain: Arc<FileTestChain>,
    ) -> Self {
        Self {
            timestamps,
            metadata,
            providers,
            chain,
            incremental: true,
            caching: true,
        }
    }

    /// Build a tester from the shared context and the configured scan flags.
    pub fn from_context(ctx: &ScanContext, chain: Arc<FileTestChain>) -> Self {
        Self::new(
            ctx.timestamps.clone(),
            ctx.metadata.clone(),
            Arc::clone(&ctx.providers),
            chain,
        )
        .incremental(ctx.config.scan.incremental)
        .caching(ctx.config.scan.caching)
    }

    /// Skip files whose timestamp matches the stored one.
    pub fn incremental(mut self, enabled: bool) -> Self {
        self.incremental = enabled;
        self
    }

    /// Reuse and populate the metadata cache.
    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    /// Test one file. Blocking: providers may run external processes.
    pub fn test_file(&self, library_id: LibraryId, path: &Path) -> FileOutcome {
        let mtime = match fs::mtime_secs(path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Cannot stat file, skipping");
                return FileOutcome::Errored(e.to_string());
            }
        };

        if self.incremental {
            match self.timestamps.is_unchanged_at(library_id, path, mtime) {
                Ok(true) => {
                    tracing::debug!(file = %path.display(), "Unchanged since last scan");
                    return FileOutcome::Unchanged;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Timestamp lookup failed, treating as changed");
                }
            }
        }

        let mut ctx = FileTestContext::new(library_id, path, mtime);

        for provider in self.providers.iter() {
            let name = provider.name();

            if self.caching {
                match self.metadata.get(name, path, mtime) {
                    Ok(Some(cached)) => {
                        tracing::debug!(provider = name, file = %path.display(), "Metadata cache hit");
                        ctx.metadata.insert(name.to_string(), cached);
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(provider = name, file = %path.display(), error = %e, "Metadata cache read failed");
                    }
                }
            }

            match provider.run(path) {
                Ok(Some(data)) => {
                    if self.caching {
                        if let Err(e) = self.metadata.put(name, path, mtime, &data) {
                            tracing::warn!(provider = name, file = %path.display(), error = %e, "Metadata cache write failed");
                        }
                    }
                    ctx.metadata.insert(name.to_string(), data);
                }
                Ok(None) => {
                    tracing::debug!(provider = name, file = %path.display(), "Provider returned no data");
                }
                Err(e) => {
                    tracing::warn!(provider = name, file = %path.display(), error = %e, "Provider failed, skipping file");
                    return FileOutcome::Errored(e.to_string());
                }
            }
        }

        match self.chain.evaluate(&mut ctx) {
            Ok(true) => FileOutcome::Accepted(QueuedFile {
                path: ctx.path,
                library_id,
                priority_score: ctx.priority_score,
            }),
            Ok(false) => {
                if !ctx.issues.is_empty() {
                    tracing::debug!(file = %path.display(), issues = ?ctx.issues, "File rejected");
                }
                FileOutcome::Rejected
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "File test failed, skipping file");
                FileOutcome::Errored(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{AcceptAll, RequireMetadata};
    use crate::provider::MetadataProvider;
    use ms_core::{Error, Result};
    use ms_db::RecordStore;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LIB: LibraryId = LibraryId::new(1);

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl MetadataProvider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn run(&self, path: &Path) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("broken") {
                return Err(Error::provider("counting", "corrupt container"));
            }
            if path.to_string_lossy().contains("empty") {
                return Ok(None);
            }
            Ok(Some(json!({ "ok": true })))
        }
    }

    fn tester(provider: Arc<Counting>) -> (Tester, TimestampStore, MetadataCache) {
        let store = RecordStore::open_in_memory(&["counting"]).unwrap();
        let timestamps = TimestampStore::new(store.clone());
        let metadata = MetadataCache::new(store);
        let mut providers = ProviderRegistry::new();
        providers.register(provider).unwrap();
        let chain = FileTestChain::new()
            .with_test(RequireMetadata)
            .with_test(AcceptAll { priority_score: 3 });
        let tester = Tester::new(
            timestamps.clone(),
            metadata.clone(),
            Arc::new(providers),
            Arc::new(chain),
        );
        (tester, timestamps, metadata)
    }

    fn file(dir: &Path, name: &str) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"x").unwrap();
        p
    }

    #[test]
    fn accepted_file_is_cached_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), "a.mkv");
        let provider = Arc::new(Counting::default());
        let (tester, _, metadata) = tester(Arc::clone(&provider));

        let outcome = tester.test_file(LIB, &path);
        assert_eq!(
            outcome,
            FileOutcome::Accepted(QueuedFile {
                path: path.clone(),
                library_id: LIB,
                priority_score: 3
            })
        );
        let mtime = fs::mtime_secs(&path).unwrap();
        assert!(metadata.get("counting", &path, mtime).unwrap().is_some());

        // Second run hits the cache.
        tester.test_file(LIB, &path);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unchanged_files_skip_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), "a.mkv");
        let provider = Arc::new(Counting::default());
        let (tester, timestamps, _) = tester(Arc::clone(&provider));
        timestamps
            .record_seen(LIB, &path, fs::mtime_secs(&path).unwrap())
            .unwrap();

        assert_eq!(tester.test_file(LIB, &path), FileOutcome::Unchanged);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_incremental_ignores_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), "a.mkv");
        let (tester, timestamps, _) = tester(Arc::new(Counting::default()));
        timestamps
            .record_seen(LIB, &path, fs::mtime_secs(&path).unwrap())
            .unwrap();

        let tester = tester.incremental(false);
        assert!(matches!(tester.test_file(LIB, &path), FileOutcome::Accepted(_)));
    }

    #[test]
    fn provider_failure_and_missing_file_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let broken = file(dir.path(), "broken.mkv");
        let (tester, _, _) = tester(Arc::new(Counting::default()));

        assert!(matches!(tester.test_file(LIB, &broken), FileOutcome::Errored(_)));
        assert!(matches!(
            tester.test_file(LIB, &dir.path().join("gone.mkv")),
            FileOutcome::Errored(_)
        ));
    }

    #[test]
    fn absent_metadata_is_rejected_not_errored() {
        let dir = tempfile::tempdir().unwrap();
        let empty = file(dir.path(), "empty.mkv");
        let (tester, _, metadata) = tester(Arc::new(Counting::default()));

        assert_eq!(tester.test_file(LIB, &empty), FileOutcome::Rejected);
        assert_eq!(metadata.count("counting").unwrap(), 0);
    }

    #[test]
    fn caching_disabled_always_runs_providers() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(dir.path(), "a.mkv");
        let provider = Arc::new(Counting::default());
        let (tester, _, metadata) = tester(Arc::clone(&provider));
        let tester = tester.caching(false);

        tester.test_file(LIB, &path);
        tester.test_file(LIB, &path);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(metadata.count("counting").unwrap(), 0);
    }
}
