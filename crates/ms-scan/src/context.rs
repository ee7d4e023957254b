//! Composition root and per-file test context.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use ms_core::config::Config;
use ms_core::events::EventBus;
use ms_core::{LibraryId, Result};
use ms_db::{EvictionEngine, MetadataCache, RecordStore, TimestampStore};
use serde_json::Value;

use crate::chain::FailedSet;
use crate::library::LibrarySet;
use crate::provider::ProviderRegistry;

/// Everything the file-test chain sees about one file.
#[derive(Debug, Clone)]
pub struct FileTestContext {
    pub library_id: LibraryId,
    pub path: PathBuf,
    pub mtime: i64,
    /// Provider output keyed by provider name. Providers that produced
    /// nothing are absent.
    pub metadata: BTreeMap<String, Value>,
    /// Free-form decisions for the processing stage.
    pub decisions: serde_json::Map<String, Value>,
    /// Human-readable reasons collected while testing.
    pub issues: Vec<String>,
    /// `None` until a test decides.
    pub add_to_pending: Option<bool>,
    pub priority_score: i64,
}

impl FileTestContext {
    pub fn new(library_id: LibraryId, path: impl Into<PathBuf>, mtime: i64) -> Self {
        Self {
            library_id,
            path: path.into(),
            mtime,
            metadata: BTreeMap::new(),
            decisions: serde_json::Map::new(),
            issues: Vec::new(),
            add_to_pending: None,
            priority_score: 0,
        }
    }

    pub fn accept(&mut self, priority_score: i64) {
        self.add_to_pending = Some(true);
        self.priority_score = priority_score;
    }

    pub fn reject(&mut self, issue: impl Into<String>) {
        self.add_to_pending = Some(false);
        self.issues.push(issue.into());
    }

    pub fn is_decided(&self) -> bool {
        self.add_to_pending.is_some()
    }
}

/// Shared state for one process, built once and cloned into every
/// component that needs it.
#[derive(Clone)]
pub struct ScanContext {
    pub config: Arc<Config>,
    pub store: RecordStore,
    pub timestamps: TimestampStore,
    pub metadata: MetadataCache,
    pub eviction: EvictionEngine,
    pub providers: Arc<ProviderRegistry>,
    pub libraries: Arc<LibrarySet>,
    pub events: Arc<EventBus>,
    /// Files whose processing failed during this process's lifetime.
    pub failures: Arc<FailedSet>,
}

impl ScanContext {
    /// Compile the library filters and make sure every registered provider
    /// has a cache table.
    pub fn new(config: Config, store: RecordStore, providers: ProviderRegistry) -> Result<Self> {
        let libraries = LibrarySet::from_config(&config.libraries)?;
        let metadata = MetadataCache::new(store.clone());
        for name in providers.names() {
            metadata.ensure_provider(name)?;
        }

        Ok(Self {
            config: Arc::new(config),
            timestamps: TimestampStore::new(store.clone()),
            metadata,
            eviction: EvictionEngine::new(store.clone()),
            store,
            providers: Arc::new(providers),
            libraries: Arc::new(libraries),
            events: Arc::new(EventBus::default()),
            failures: Arc::new(FailedSet::new()),
        })
    }

    /// Open the configured database and discover providers.
    pub fn open(config: Config) -> Result<Self> {
        let providers = ProviderRegistry::from_config(&config.providers);
        let store = RecordStore::open(&config.database, &providers.names())?;
        Self::new(config, store, providers)
    }
}
