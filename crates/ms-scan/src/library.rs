//! Configured libraries with their compiled filters.

use std::collections::BTreeMap;
use std::path::Path;

use ms_core::config::LibraryConfig;
use ms_core::{Error, LibraryId, Result};

use crate::filter::LibraryFilter;

#[derive(Debug, Clone)]
pub struct Library {
    pub config: LibraryConfig,
    pub filter: LibraryFilter,
}

impl Library {
    pub fn id(&self) -> LibraryId {
        self.config.id
    }

    pub fn root(&self) -> &Path {
        &self.config.path
    }
}

/// All configured libraries, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    libraries: BTreeMap<LibraryId, Library>,
}

impl LibrarySet {
    /// Compile every library's filter. Duplicate ids and bad ignore
    /// patterns are configuration errors.
    pub fn from_config(configs: &[LibraryConfig]) -> Result<Self> {
        let mut libraries = BTreeMap::new();
        for config in configs {
            let library = Library {
                config: config.clone(),
                filter: LibraryFilter::from_config(config)?,
            };
            if libraries.insert(config.id, library).is_some() {
                return Err(Error::Validation(format!(
                    "library id {} is configured more than once",
                    config.id
                )));
            }
        }
        Ok(Self { libraries })
    }

    pub fn get(&self, id: LibraryId) -> Option<&Library> {
        self.libraries.get(&id)
    }

    /// Look up an enabled library, rejecting unknown and disabled ids.
    pub fn require_enabled(&self, id: LibraryId) -> Result<&Library> {
        match self.libraries.get(&id) {
            Some(lib) if lib.config.enabled => Ok(lib),
            Some(_) => Err(Error::Validation(format!("library {id} is disabled"))),
            None => Err(Error::Validation(format!("unknown library {id}"))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Library> {
        self.libraries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Whether a tracked record should survive pruning: its library is
    /// still configured, the path lies under the library root and passes
    /// its filter, and the file still exists.
    pub fn keeps(&self, library_id: LibraryId, path: &Path) -> bool {
        match self.libraries.get(&library_id) {
            Some(lib) => lib.filter.is_in_library(path) && path.exists(),
            None => false,
        }
    }
}
