//! Per-library path filtering: extension allow-list, ignore patterns and
//! hidden entries.

use std::path::{Component, Path, PathBuf};

use ms_core::config::LibraryConfig;
use ms_core::{Error, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct LibraryFilter {
    root: PathBuf,
    /// Lowercase, without leading dots. Empty allows everything.
    extensions: Vec<String>,
    ignore: Vec<Regex>,
}

impl LibraryFilter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
            ignore: Vec::new(),
        }
    }

    /// Build the filter for a configured library.
    ///
    /// Invalid ignore patterns are rejected rather than silently dropped.
    pub fn from_config(config: &LibraryConfig) -> Result<Self> {
        let ignore = config
            .ignore_patterns()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::Validation(format!(
                        "library {} ignore pattern '{p}': {e}",
                        config.id
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(&config.path)
            .with_extensions(config.extensions.iter().map(String::as_str))
            .with_ignore(ignore))
    }

    pub fn with_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn with_ignore(mut self, patterns: Vec<Regex>) -> Self {
        self.ignore = patterns;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension_allowed(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == e)
            })
            .unwrap_or(false)
    }

    /// True if any ignore pattern matches anywhere in the path.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.ignore.iter().any(|re| re.is_match(&text))
    }

    /// True if any component below the library root starts with a dot.
    pub fn is_hidden(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }

    /// Whether the file belongs to this library's scan set: below the
    /// root (compared component-wise), with an allowed extension and not
    /// ignored.
    pub fn is_in_library(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && self.extension_allowed(path) && !self.is_ignored(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_core::LibraryId;

    fn filter() -> LibraryFilter {
        LibraryFilter::new("/media/movies")
            .with_extensions([".MKV", "mp4", " "])
            .with_ignore(vec![Regex::new(r"/extras/").unwrap(), Regex::new(r"sample").unwrap()])
    }

    #[test]
    fn extensions_are_case_insensitive() {
        let f = filter();
        assert!(f.extension_allowed(Path::new("/media/movies/a.mkv")));
        assert!(f.extension_allowed(Path::new("/media/movies/a.MP4")));
        assert!(!f.extension_allowed(Path::new("/media/movies/a.avi")));
        assert!(!f.extension_allowed(Path::new("/media/movies/noext")));
    }

    #[test]
    fn empty_extension_list_allows_all() {
        let f = LibraryFilter::new("/media");
        assert!(f.is_in_library(Path::new("/media/whatever.xyz")));
        assert!(f.is_in_library(Path::new("/media/noext")));
    }

    #[test]
    fn ignore_patterns_search_the_whole_path() {
        let f = filter();
        assert!(f.is_ignored(Path::new("/media/movies/Film/extras/b.mkv")));
        assert!(f.is_ignored(Path::new("/media/movies/Film/film-sample.mkv")));
        assert!(!f.is_in_library(Path::new("/media/movies/Film/extras/b.mkv")));
        assert!(f.is_in_library(Path::new("/media/movies/Film/film.mkv")));
    }

    #[test]
    fn paths_outside_root_are_not_members() {
        let f = filter();
        assert!(!f.is_in_library(Path::new("/media/other/film.mkv")));
        assert!(!f.is_in_library(Path::new("/media/movies-old/film.mkv")));
        assert!(!f.is_in_library(Path::new("film.mkv")));
        assert!(f.is_in_library(Path::new("/media/movies/film.mkv")));
    }

    #[test]
    fn hidden_components_below_root() {
        let f = LibraryFilter::new("/media/.library");
        assert!(!f.is_hidden(Path::new("/media/.library/Film/a.mkv")));
        assert!(f.is_hidden(Path::new("/media/.library/.trash/a.mkv")));
        assert!(f.is_hidden(Path::new("/media/.library/Film/.a.mkv")));
    }

    #[test]
    fn from_config_rejects_bad_regex() {
        let config = LibraryConfig {
            id: LibraryId::new(1),
            name: "Movies".into(),
            path: "/media/movies".into(),
            extensions: vec!["mkv".into()],
            ignored_paths: vec!["# comment".into(), "(".into()],
            enabled: true,
        };
        assert!(matches!(
            LibraryFilter::from_config(&config),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn from_config_skips_comments() {
        let config = LibraryConfig {
            id: LibraryId::new(1),
            name: "Movies".into(),
            path: "/media/movies".into(),
            extensions: vec![],
            ignored_paths: vec!["# /extras/".into(), "".into()],
            enabled: true,
        };
        let f = LibraryFilter::from_config(&config).unwrap();
        assert!(!f.is_ignored(Path::new("/media/movies/extras/a.mkv")));
    }
}
