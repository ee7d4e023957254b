//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! database, scan, provider, maintenance and library sections. Every section
//! defaults sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::{Error, LibraryId};

/// Locations searched by [`Config::load_or_default`] when no path is given.
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./mediascan.toml",
    "~/.config/mediascan/config.toml",
    "/etc/mediascan/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scan: ScanConfig,
    pub providers: ProvidersConfig,
    pub maintenance: MaintenanceConfig,
    pub libraries: Vec<LibraryConfig>,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read and parse a config file, failing on any error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    ///
    /// Without an explicit path the default locations are tried in order.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match DEFAULT_CONFIG_PATHS
                .iter()
                .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
                .find(|p| p.exists())
            {
                Some(p) => p,
                None => return Self::default(),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Look up a library by id.
    pub fn library(&self, id: LibraryId) -> Option<&LibraryConfig> {
        self.libraries.iter().find(|l| l.id == id)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.scan.testers == 0 {
            warnings.push("scan.testers is 0; one tester will be used".into());
        }
        if self.database.pool_size == 0 {
            warnings.push("database.pool_size is 0; a pool of 1 will be used".into());
        }
        for (name, fraction) in [
            ("maintenance.prune_fraction", self.maintenance.prune_fraction),
            ("maintenance.reset_fraction", self.maintenance.reset_fraction),
        ] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                warnings.push(format!("{name} {fraction} is outside (0, 1]"));
            }
        }

        let mut seen = HashSet::new();
        for (i, lib) in self.libraries.iter().enumerate() {
            if !seen.insert(lib.id) {
                warnings.push(format!("libraries[{i}] duplicates library id {}", lib.id));
            }
            if !lib.path.is_absolute() {
                warnings.push(format!(
                    "libraries[{i}].path {} is not absolute",
                    lib.path.display()
                ));
            }
            for pattern in lib.ignore_patterns() {
                if let Err(e) = regex::Regex::new(pattern) {
                    warnings.push(format!("libraries[{i}] ignore pattern '{pattern}': {e}"));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Persistent store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// The database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path.to_string_lossy()).as_ref())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/mediascan/mediascan.db"),
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// Scan dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of concurrent tester workers per scan.
    pub testers: usize,
    /// How often the dispatcher drains results and reports progress.
    pub poll_interval_ms: u64,
    /// Skip files whose mtime matches the stored timestamp.
    pub incremental: bool,
    /// Reuse cached provider output.
    pub caching: bool,
    /// Test files even if they previously failed processing.
    pub retest_failed: bool,
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            testers: 2,
            poll_interval_ms: 100,
            incremental: true,
            caching: true,
            retest_failed: false,
            follow_symlinks: false,
        }
    }
}

/// Metadata provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub timeout_secs: u64,
    pub ffprobe: ProviderConfig,
    pub mediainfo: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            ffprobe: ProviderConfig::default(),
            mediainfo: ProviderConfig::default(),
        }
    }
}

/// Settings for one external metadata tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    /// Explicit binary path; `PATH` is searched when unset.
    pub path: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Store pruning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub prune_fraction: f64,
    pub reset_fraction: f64,
    /// Run one proportional prune pass after every scan.
    pub prune_after_scan: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            prune_fraction: 0.05,
            reset_fraction: 0.01,
            prune_after_scan: false,
        }
    }
}

/// A configured library root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub id: LibraryId,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
    /// Allowed extensions; empty allows every extension.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Regular expressions matched anywhere in the path.
    #[serde(default)]
    pub ignored_paths: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl LibraryConfig {
    /// Ignore patterns with blank lines and `#` comments removed.
    pub fn ignore_patterns(&self) -> impl Iterator<Item = &str> {
        self.ignored_paths
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty() && !p.starts_with('#'))
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.scan.testers, 2);
        assert!(cfg.scan.incremental);
        assert!(cfg.scan.caching);
        assert!(!cfg.scan.retest_failed);
        assert_eq!(cfg.database.pool_size, 8);
        assert!(cfg.providers.ffprobe.enabled);
        assert!(cfg.libraries.is_empty());
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.scan.poll_interval_ms, 100);
        assert_eq!(cfg.maintenance.prune_fraction, 0.05);
    }

    #[test]
    fn parse_libraries() {
        let toml = r##"
            [scan]
            testers = 4

            [[libraries]]
            id = 1
            name = "Movies"
            path = "/media/movies"
            extensions = ["mkv", ".MP4"]
            ignored_paths = ["/extras/", "# comment", ""]
        "##;
        let cfg = Config::from_toml(toml).unwrap();
        assert_eq!(cfg.scan.testers, 4);
        let lib = cfg.library(LibraryId::new(1)).unwrap();
        assert!(lib.enabled);
        assert_eq!(lib.ignore_patterns().collect::<Vec<_>>(), vec!["/extras/"]);
        assert!(cfg.library(LibraryId::new(2)).is_none());
    }

    #[test]
    fn parse_error_is_validation() {
        let err = Config::from_toml("[scan\ntesters = ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn fraction_out_of_range_warns() {
        let mut cfg = Config::default();
        cfg.maintenance.prune_fraction = 0.0;
        cfg.maintenance.reset_fraction = 1.5;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn duplicate_and_relative_libraries_warn() {
        let lib = LibraryConfig {
            id: LibraryId::new(1),
            name: String::new(),
            path: PathBuf::from("media"),
            extensions: vec![],
            ignored_paths: vec!["(unclosed".into()],
            enabled: true,
        };
        let cfg = Config {
            libraries: vec![lib.clone(), lib],
            ..Config::default()
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("duplicates")));
        assert!(warnings.iter().any(|w| w.contains("not absolute")));
        assert!(warnings.iter().any(|w| w.contains("(unclosed")));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/mediascan.toml")));
        assert_eq!(cfg.scan.testers, 2);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediascan.toml");
        std::fs::write(&path, "[database]\npool_size = 3\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.database.pool_size, 3);
    }

    #[test]
    fn tilde_is_expanded() {
        let cfg = Config::default();
        assert!(!cfg.database.resolved_path().to_string_lossy().starts_with('~'));
    }
}
