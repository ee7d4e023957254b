//! Shared test harness for ms-scan integration tests.
//!
//! [`TestHarness`] owns a temporary directory holding the media trees and
//! an on-disk database, plus a fully built [`ScanService`] writing into a
//! [`MemoryQueue`].

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ms_core::config::{Config, DatabaseConfig, LibraryConfig};
use ms_core::{Error, LibraryId, Result};
use ms_db::RecordStore;
use ms_scan::chain::{AcceptAll, RequireMetadata};
use ms_scan::{FileTestChain, MemoryQueue, MetadataProvider, ProviderRegistry, ScanContext, ScanService};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const PROVIDER: &str = "probe";

/// Fake provider: fails on files whose name contains `corrupt`, otherwise
/// reports the file size.
#[derive(Default)]
pub struct FakeProbe {
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataProvider for FakeProbe {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn run(&self, path: &Path) -> Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if path.to_string_lossy().contains("corrupt") {
            return Err(Error::provider(PROVIDER, "invalid data found when processing input"));
        }
        let size = std::fs::metadata(path)?.len();
        Ok(Some(json!({ "format": { "size": size } })))
    }
}

pub struct TestHarness {
    pub dir: TempDir,
    pub service: ScanService,
    pub queue: Arc<MemoryQueue>,
    pub probe: Arc<FakeProbe>,
}

impl TestHarness {
    /// One library per id, each rooted at `<tmp>/lib<id>`.
    pub fn new(library_ids: &[i64]) -> Self {
        Self::with_config(library_ids, |_| {})
    }

    pub fn with_config(library_ids: &[i64], tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.database = DatabaseConfig {
            path: dir.path().join("mediascan.db"),
            pool_size: 8,
            busy_timeout_ms: 5000,
        };
        config.scan.testers = 3;
        config.scan.poll_interval_ms = 5;
        for id in library_ids {
            let root = dir.path().join(format!("lib{id}"));
            std::fs::create_dir_all(&root).expect("library root");
            config.libraries.push(LibraryConfig {
                id: LibraryId::new(*id),
                name: format!("Library {id}"),
                path: root,
                extensions: vec!["mkv".into(), "mp4".into()],
                ignored_paths: vec![],
                enabled: true,
            });
        }
        tweak(&mut config);

        let probe = Arc::new(FakeProbe::default());
        let mut providers = ProviderRegistry::new();
        providers.register(probe.clone()).expect("register provider");
        let store = RecordStore::open(&config.database, &[PROVIDER]).expect("open store");
        let ctx = ScanContext::new(config, store, providers).expect("context");

        let chain = FileTestChain::new()
            .with_test(RequireMetadata)
            .with_test(AcceptAll { priority_score: 10 });
        let queue = Arc::new(MemoryQueue::new());
        let service = ScanService::new(ctx, chain, queue.clone());

        Self {
            dir,
            service,
            queue,
            probe,
        }
    }

    pub fn root(&self, library_id: i64) -> PathBuf {
        self.dir.path().join(format!("lib{library_id}"))
    }

    /// Create a media file under a library root.
    pub fn media(&self, library_id: i64, relative: &str) -> PathBuf {
        let path = self.root(library_id).join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, relative.as_bytes()).expect("write media");
        path
    }
}
