//! The [`MetadataProvider`] trait and the ordered provider registry.

use std::path::Path;
use std::sync::Arc;

use ms_core::config::ProvidersConfig;
use ms_core::{Error, Result};

use crate::providers::{FfprobeProvider, MediainfoProvider};

/// An external metadata-extraction tool.
///
/// `run` must be a pure function of the file contents: calling it twice on
/// an unchanged file yields the same data. Implementations are shared
/// across tester threads.
pub trait MetadataProvider: Send + Sync {
    /// Name used as the metadata cache namespace. Must match `[a-z0-9_]+`.
    fn name(&self) -> &str;

    /// Extract metadata. `Ok(None)` means the tool ran but had nothing to say.
    fn run(&self, path: &Path) -> Result<Option<serde_json::Value>>;
}

/// Providers in the fixed order they run for every file.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration, skipping disabled providers
    /// and tools that cannot be found.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();
        let timeout = std::time::Duration::from_secs(config.timeout_secs);

        if config.ffprobe.enabled {
            match FfprobeProvider::discover(config.ffprobe.path.as_deref(), timeout) {
                Some(p) => registry.push(Arc::new(p)),
                None => tracing::warn!("ffprobe not found; provider disabled"),
            }
        }
        if config.mediainfo.enabled {
            match MediainfoProvider::discover(config.mediainfo.path.as_deref(), timeout) {
                Some(p) => registry.push(Arc::new(p)),
                None => tracing::warn!("mediainfo not found; provider disabled"),
            }
        }

        registry
    }

    /// Add a provider after the existing ones.
    ///
    /// Rejects names that are not usable as a cache namespace and
    /// duplicates of an already registered name.
    pub fn register(&mut self, provider: Arc<dyn MetadataProvider>) -> Result<()> {
        let name = provider.name();
        ms_db::namespace::validate_provider_name(name)?;
        if self.get(name).is_some() {
            return Err(Error::Validation(format!(
                "provider '{name}' is already registered"
            )));
        }
        self.providers.push(provider);
        Ok(())
    }

    fn push(&mut self, provider: Arc<dyn MetadataProvider>) {
        if let Err(e) = self.register(provider) {
            tracing::warn!(error = %e, "Skipping provider");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn MetadataProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MetadataProvider>> {
        self.providers.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
