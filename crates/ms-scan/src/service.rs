//! The scan service: the API callers use to test, process and inspect
//! library files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ms_core::events::EventPayload;
use ms_core::{Error, LibraryId, Result, ScanId};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::candidates::{self, CandidateRequest};
use crate::chain::FileTestChain;
use crate::context::ScanContext;
use crate::dispatcher::{ScanDispatcher, ScanSummary};
use crate::maintenance::{Maintenance, MaintenanceStatus};
use crate::postprocess::PostProcessor;
use crate::queue::WorkQueue;
use crate::worker::Tester;

pub struct ScanService {
    ctx: ScanContext,
    tester: Arc<Tester>,
    queue: Arc<dyn WorkQueue>,
    active_scans: Arc<DashMap<LibraryId, ScanId>>,
    maintenance: Arc<Maintenance>,
}

/// Releases a library's active-scan slot when dropped.
struct ActiveScanGuard {
    scans: Arc<DashMap<LibraryId, ScanId>>,
    library_id: LibraryId,
}

impl Drop for ActiveScanGuard {
    fn drop(&mut self) {
        self.scans.remove(&self.library_id);
    }
}

impl ScanService {
    /// Build the service. A chain without its own failure history is
    /// gated on the context's, which the post-processor feeds.
    pub fn new(ctx: ScanContext, chain: FileTestChain, queue: Arc<dyn WorkQueue>) -> Self {
        let chain = if chain.has_failure_history() {
            chain
        } else {
            chain.with_failure_history(Arc::clone(&ctx.failures))
        };
        let chain = chain.retest_failed(ctx.config.scan.retest_failed);
        let tester = Arc::new(Tester::from_context(&ctx, Arc::new(chain)));
        Self {
            maintenance: Arc::new(Maintenance::new(ctx.clone())),
            ctx,
            tester,
            queue,
            active_scans: Arc::new(DashMap::new()),
        }
    }

    pub fn context(&self) -> &ScanContext {
        &self.ctx
    }

    pub fn maintenance(&self) -> &Arc<Maintenance> {
        &self.maintenance
    }

    pub fn post_processor(&self) -> PostProcessor {
        PostProcessor::new(self.ctx.clone())
    }

    pub fn is_scanning(&self, library_id: LibraryId) -> bool {
        self.active_scans.contains_key(&library_id)
    }

    /// Libraries with a scan in flight and the id of that scan.
    pub fn active_scans(&self) -> Vec<(LibraryId, ScanId)> {
        self.active_scans
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }

    /// Validate, expand and test a batch of candidates, one concurrent
    /// scan per library.
    ///
    /// Fails without testing anything if a request is invalid or one of
    /// its libraries is already being scanned.
    pub async fn test_files(
        &self,
        requests: &[CandidateRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<ScanSummary>> {
        let resolved = self.resolve(requests).await?;

        let mut guards = Vec::with_capacity(resolved.len());
        let mut scans = Vec::with_capacity(resolved.len());
        for (library_id, paths) in resolved {
            let scan_id = ScanId::new();
            let claimed = match self.active_scans.entry(library_id) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(scan_id);
                    true
                }
            };
            if !claimed {
                return Err(Error::Validation(format!(
                    "library {library_id} is already being scanned"
                )));
            }
            guards.push(ActiveScanGuard {
                scans: Arc::clone(&self.active_scans),
                library_id,
            });
            scans.push((scan_id, library_id, paths));
        }

        let mut set = JoinSet::new();
        for (scan_id, library_id, paths) in scans {
            let dispatcher = self.dispatcher();
            let cancel = cancel.clone();
            set.spawn(async move { dispatcher.run(scan_id, library_id, paths, &cancel).await });
        }

        let mut summaries = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::error!(error = %e, "Scan task failed"),
            }
        }
        summaries.sort_by_key(|s| s.library_id);
        drop(guards);

        if self.ctx.config.maintenance.prune_after_scan && !cancel.is_cancelled() {
            for summary in &summaries {
                self.prune_after_scan(summary.library_id).await;
            }
        }

        Ok(summaries)
    }

    /// Scan a whole library from its root.
    pub async fn scan_library(
        &self,
        library_id: LibraryId,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary> {
        let root = self.ctx.libraries.require_enabled(library_id)?.root().to_path_buf();
        let summaries = self
            .test_files(&[CandidateRequest::new(library_id, root)], cancel)
            .await?;
        summaries
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal(format!("scan of library {library_id} produced no summary")))
    }

    /// Validate and expand candidates, then queue every file without
    /// testing it. Returns the number of files queued.
    pub async fn process_files(
        &self,
        requests: &[CandidateRequest],
        priority_score: i64,
    ) -> Result<usize> {
        let resolved = self.resolve(requests).await?;
        let mut queued = 0;
        for (library_id, paths) in resolved {
            for path in paths {
                match self.queue.enqueue(&path, library_id, priority_score) {
                    Ok(()) => {
                        queued += 1;
                        self.ctx.events.broadcast(EventPayload::FileQueued {
                            library_id,
                            path: path.display().to_string(),
                            priority_score,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "Failed to enqueue file");
                    }
                }
            }
        }
        tracing::info!(files = queued, "Queued files for processing");
        Ok(queued)
    }

    /// Point-in-time `path -> mtime` map of one library's timestamps.
    pub async fn timestamp_snapshot(&self, library_id: LibraryId) -> Result<HashMap<PathBuf, i64>> {
        if self.ctx.libraries.get(library_id).is_none() {
            return Err(Error::Validation(format!("unknown library {library_id}")));
        }
        let timestamps = self.ctx.timestamps.clone();
        tokio::task::spawn_blocking(move || timestamps.all_as_map(library_id))
            .await
            .map_err(|e| Error::Internal(format!("snapshot task failed: {e}")))?
    }

    fn dispatcher(&self) -> ScanDispatcher {
        let scan = &self.ctx.config.scan;
        ScanDispatcher::new(
            Arc::clone(&self.tester),
            Arc::clone(&self.queue),
            Arc::clone(&self.ctx.events),
            scan.testers,
            Duration::from_millis(scan.poll_interval_ms),
        )
    }

    async fn resolve(
        &self,
        requests: &[CandidateRequest],
    ) -> Result<std::collections::BTreeMap<LibraryId, Vec<PathBuf>>> {
        let libraries = Arc::clone(&self.ctx.libraries);
        let follow = self.ctx.config.scan.follow_symlinks;
        let requests = requests.to_vec();
        tokio::task::spawn_blocking(move || candidates::resolve(&libraries, &requests, follow))
            .await
            .map_err(|e| Error::Internal(format!("candidate expansion failed: {e}")))?
    }

    async fn prune_after_scan(&self, library_id: LibraryId) {
        let maintenance = Arc::clone(&self.maintenance);
        let fraction = self.ctx.config.maintenance.prune_fraction;
        let status =
            tokio::task::spawn_blocking(move || maintenance.prune(Some(library_id), fraction)).await;
        match status {
            Ok(Ok(MaintenanceStatus::Completed { affected })) => {
                tracing::debug!(library_id = %library_id, affected, "Post-scan prune complete");
            }
            Ok(Ok(other)) => {
                tracing::debug!(library_id = %library_id, status = ?other, "Post-scan prune did not run");
            }
            Ok(Err(e)) => tracing::warn!(library_id = %library_id, error = %e, "Post-scan prune rejected"),
            Err(e) => tracing::error!(library_id = %library_id, error = %e, "Post-scan prune panicked"),
        }
    }
}
