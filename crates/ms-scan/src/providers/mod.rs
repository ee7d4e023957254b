//! Built-in metadata providers and external tool discovery.

mod ffprobe;
mod mediainfo;

pub use ffprobe::FfprobeProvider;
pub use mediainfo::MediainfoProvider;

use std::path::{Path, PathBuf};

use ms_core::config::ProvidersConfig;
use ms_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Availability information for a tool, returned by [`check_tools`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the provider is enabled in configuration.
    pub enabled: bool,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of the version output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Locate a tool: the configured path if it exists, otherwise `PATH`.
pub fn resolve_tool(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    match configured {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!(
                tool = name,
                path = %p.display(),
                "Configured tool path does not exist; searching PATH"
            );
            which::which(name).ok()
        }
        None => which::which(name).ok(),
    }
}

/// Check the built-in providers' tools and report availability.
pub fn check_tools(config: &ProvidersConfig) -> Vec<ToolInfo> {
    [
        ("ffprobe", &config.ffprobe, "-version"),
        ("mediainfo", &config.mediainfo, "--version"),
    ]
    .into_iter()
    .map(|(name, cfg, version_arg)| {
        let path = resolve_tool(name, cfg.path.as_deref());
        let version = path.as_deref().and_then(|p| detect_version(p, version_arg));
        ToolInfo {
            name: name.to_string(),
            enabled: cfg.enabled,
            available: path.is_some(),
            version,
            path,
        }
    })
    .collect()
}

/// Run `<tool> <version_arg>` and return the first non-empty line of stdout.
fn detect_version(path: &Path, version_arg: &str) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|s| s.to_string())
}

/// Parse a tool's JSON stdout.
///
/// Empty output, `null`, and empty objects or arrays mean "no metadata".
pub(crate) fn parse_json_output(provider: &str, stdout: &str) -> Result<Option<serde_json::Value>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| Error::provider(provider, format!("invalid JSON output: {e}")))?;
    let empty = match &value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    };
    Ok(if empty { None } else { Some(value) })
}
