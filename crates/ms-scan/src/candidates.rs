//! Candidate validation and expansion.
//!
//! Requests name files or directories inside a library. Every request is
//! validated before any of them is expanded, so a single bad path rejects
//! the whole batch without side effects.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use ms_core::{Error, LibraryId, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::filter::LibraryFilter;
use crate::library::LibrarySet;

/// A file or directory proposed for scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRequest {
    pub library_id: LibraryId,
    pub path: PathBuf,
}

impl CandidateRequest {
    pub fn new(library_id: LibraryId, path: impl Into<PathBuf>) -> Self {
        Self {
            library_id,
            path: path.into(),
        }
    }
}

/// Reject relative paths, `..` components and paths outside `root`.
pub fn validate_path(root: &Path, path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::Validation(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(Error::Validation(format!(
            "path must not contain '..': {}",
            path.display()
        )));
    }
    if !path.starts_with(root) {
        return Err(Error::Validation(format!(
            "{} is outside library root {}",
            path.display(),
            root.display()
        )));
    }
    Ok(())
}

/// Expand one path to the in-library files it names.
///
/// Directories are walked recursively, skipping hidden entries. A missing
/// path yields nothing and is logged.
pub fn expand(filter: &LibraryFilter, path: &Path, follow_symlinks: bool) -> Vec<PathBuf> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable candidate");
            return Vec::new();
        }
    };

    if !meta.is_dir() {
        return if filter.is_in_library(path) {
            vec![path.to_path_buf()]
        } else {
            tracing::debug!(path = %path.display(), "Candidate filtered out");
            Vec::new()
        };
    }

    WalkDir::new(path)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !filter.is_hidden(e.path()))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "Error walking directory");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| filter.is_in_library(p))
        .collect()
}

/// Validate every request, then expand and deduplicate per library.
pub fn resolve(
    libraries: &LibrarySet,
    requests: &[CandidateRequest],
    follow_symlinks: bool,
) -> Result<BTreeMap<LibraryId, Vec<PathBuf>>> {
    for req in requests {
        let library = libraries.require_enabled(req.library_id)?;
        validate_path(library.root(), &req.path)?;
    }

    let mut grouped: BTreeMap<LibraryId, BTreeSet<PathBuf>> = BTreeMap::new();
    for req in requests {
        let library = libraries.require_enabled(req.library_id)?;
        grouped
            .entry(req.library_id)
            .or_default()
            .extend(expand(&library.filter, &req.path, follow_symlinks));
    }

    Ok(grouped
        .into_iter()
        .map(|(id, paths)| (id, paths.into_iter().collect()))
        .collect())
}
