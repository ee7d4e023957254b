//! Post-processing hook.
//!
//! Once the downstream stage has written its output files, their metadata
//! is refreshed and their mtime recorded, so the next incremental scan
//! sees them as unchanged instead of queueing them again.

use std::path::{Path, PathBuf};

use ms_core::{fs, LibraryId};
use serde::{Deserialize, Serialize};

use crate::context::ScanContext;

/// Outcome reported by the downstream processing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub library_id: LibraryId,
    pub source: PathBuf,
    pub destinations: Vec<PathBuf>,
    pub processing_success: bool,
    pub file_move_success: bool,
}

impl TaskResult {
    pub fn succeeded(&self) -> bool {
        self.processing_success && self.file_move_success
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostProcessReport {
    /// Destinations whose timestamp was recorded.
    pub recorded: usize,
    /// Provider runs whose output was cached.
    pub cached: usize,
    /// Destinations outside the library or that could not be read.
    pub skipped: usize,
}

pub struct PostProcessor {
    ctx: ScanContext,
}

impl PostProcessor {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Refresh caches and timestamps for a completed task. Never fails;
    /// per-file problems are logged and counted as skipped.
    ///
    /// Providers may run external tools, so the work happens on the
    /// blocking pool.
    pub async fn on_task_complete(&self, task: &TaskResult) -> PostProcessReport {
        let ctx = self.ctx.clone();
        let owned = task.clone();
        match tokio::task::spawn_blocking(move || complete_task(&ctx, &owned)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(source = %task.source.display(), error = %e, "Post-processing task panicked");
                PostProcessReport {
                    skipped: task.destinations.len(),
                    ..PostProcessReport::default()
                }
            }
        }
    }
}

fn complete_task(ctx: &ScanContext, task: &TaskResult) -> PostProcessReport {
    let mut report = PostProcessReport::default();
    if !task.succeeded() {
        tracing::debug!(
            source = %task.source.display(),
            processing = task.processing_success,
            file_move = task.file_move_success,
            "Task did not succeed, leaving timestamps untouched"
        );
        ctx.failures.mark_failed(task.library_id, &task.source);
        return report;
    }
    ctx.failures.clear(task.library_id, &task.source);

    let Some(library) = ctx.libraries.get(task.library_id) else {
        tracing::warn!(library_id = %task.library_id, "Task result for unknown library");
        report.skipped = task.destinations.len();
        return report;
    };

    for dest in &task.destinations {
        if !library.filter.is_in_library(dest) {
            tracing::debug!(file = %dest.display(), "Destination outside library");
            report.skipped += 1;
            continue;
        }

        let mtime = match fs::mtime_secs(dest) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %dest.display(), error = %e, "Cannot stat destination");
                report.skipped += 1;
                continue;
            }
        };

        if ctx.config.scan.caching {
            report.cached += refresh_metadata(ctx, dest, mtime);
        }

        // Without incremental scans nothing ever reads these rows.
        if !ctx.config.scan.incremental {
            continue;
        }
        match ctx.timestamps.record_seen(task.library_id, dest, mtime) {
            Ok(()) => report.recorded += 1,
            Err(e) => {
                tracing::warn!(file = %dest.display(), error = %e, "Failed to record timestamp");
                report.skipped += 1;
            }
        }
    }

    tracing::info!(
        source = %task.source.display(),
        recorded = report.recorded,
        cached = report.cached,
        skipped = report.skipped,
        "Post-processing complete"
    );
    report
}

/// Run every provider whose cache entry for `dest` is stale. Returns the
/// number of entries written.
fn refresh_metadata(ctx: &ScanContext, dest: &Path, mtime: i64) -> usize {
    let mut cached = 0;
    for provider in ctx.providers.iter() {
        let name = provider.name();
        match ctx.metadata.exists(name, dest, mtime) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(provider = name, file = %dest.display(), error = %e, "Metadata cache read failed");
            }
        }
        match provider.run(dest) {
            Ok(Some(data)) => match ctx.metadata.put(name, dest, mtime, &data) {
                Ok(()) => cached += 1,
                Err(e) => {
                    tracing::warn!(provider = name, file = %dest.display(), error = %e, "Metadata cache write failed");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(provider = name, file = %dest.display(), error = %e, "Provider failed on destination");
            }
        }
    }
    cached
}
