//! Filesystem helpers shared by the stores and the scanner.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// Modification time of `path` in whole seconds since the Unix epoch.
///
/// Sub-second precision is truncated toward zero, so the value is stable
/// across filesystems that store nanoseconds and ones that do not.
pub fn mtime_secs(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(system_time_secs(modified))
}

/// Convert a [`SystemTime`] to whole seconds since the epoch.
pub fn system_time_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Current wall-clock time in whole seconds since the epoch.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
