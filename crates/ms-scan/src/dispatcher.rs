//! Concurrent scan dispatch.
//!
//! A dispatcher run seeds a shared input queue with the candidate paths
//! and starts a fixed number of tester workers on tokio's blocking pool.
//! Workers pop paths until the queue is empty or they are told to stop,
//! sending each outcome back over a channel. The dispatcher loop forwards
//! accepted files to the [`WorkQueue`] and publishes progress on a bounded
//! poll interval, so a slow provider never stalls progress reporting.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ms_core::events::{EventBus, EventPayload};
use ms_core::{LibraryId, ScanId};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::queue::WorkQueue;
use crate::worker::{FileOutcome, Tester};

/// Counts for one library scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub scan_id: ScanId,
    pub library_id: LibraryId,
    pub total: u64,
    pub processed: u64,
    pub unchanged: u64,
    pub rejected: u64,
    pub queued: u64,
    pub errors: u64,
    pub cancelled: bool,
}

impl ScanSummary {
    fn new(scan_id: ScanId, library_id: LibraryId, total: u64) -> Self {
        Self {
            scan_id,
            library_id,
            total,
            processed: 0,
            unchanged: 0,
            rejected: 0,
            queued: 0,
            errors: 0,
            cancelled: false,
        }
    }

    /// `processed / total` as a whole percentage. An empty scan is 100%.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.processed.min(self.total) * 100 / self.total) as u8
    }
}

pub struct ScanDispatcher {
    tester: Arc<Tester>,
    queue: Arc<dyn WorkQueue>,
    events: Arc<EventBus>,
    testers: usize,
    poll_interval: Duration,
}

impl ScanDispatcher {
    pub fn new(
        tester: Arc<Tester>,
        queue: Arc<dyn WorkQueue>,
        events: Arc<EventBus>,
        testers: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            tester,
            queue,
            events,
            testers: testers.max(1),
            poll_interval,
        }
    }

    /// Test every path and forward accepted ones downstream.
    ///
    /// `paths` must already be expanded and deduplicated. Cancelling
    /// `cancel` stops workers at their next file; files already being
    /// tested run to completion.
    pub async fn run(
        &self,
        scan_id: ScanId,
        library_id: LibraryId,
        paths: Vec<PathBuf>,
        cancel: &CancellationToken,
    ) -> ScanSummary {
        let mut summary = ScanSummary::new(scan_id, library_id, paths.len() as u64);
        tracing::info!(
            scan_id = %summary.scan_id,
            library_id = %library_id,
            files = summary.total,
            testers = self.testers,
            "Starting scan"
        );
        self.events.broadcast(EventPayload::ScanStarted {
            scan_id: summary.scan_id,
            library_id,
            total: summary.total,
        });

        let input = Arc::new(Mutex::new(VecDeque::from(paths)));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(PathBuf, FileOutcome)>();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel::<PathBuf>();
        let stop = cancel.child_token();

        let worker_count = if summary.total == 0 { 0 } else { self.testers };
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let input = Arc::clone(&input);
            let tester = Arc::clone(&self.tester);
            let result_tx = result_tx.clone();
            let status_tx = status_tx.clone();
            let stop = stop.clone();

            handles.push(tokio::task::spawn_blocking(move || loop {
                if stop.is_cancelled() {
                    break;
                }
                let next = input.lock().pop_front();
                let Some(path) = next else {
                    break;
                };
                let _ = status_tx.send(path.clone());
                let outcome = tester.test_file(library_id, &path);
                if result_tx.send((path, outcome)).is_err() {
                    break;
                }
            }));
        }
        drop(result_tx);
        drop(status_tx);

        let mut current: Option<PathBuf> = None;
        loop {
            self.drain(&mut result_rx, &mut status_rx, &mut summary, &mut current);

            if input.lock().is_empty() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    tracing::info!(scan_id = %summary.scan_id, "Scan cancelled");
                    break;
                }
            }
        }

        stop.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(scan_id = %summary.scan_id, error = %e, "Tester worker panicked");
            }
        }

        // Workers may have finished files after the last poll.
        self.drain(&mut result_rx, &mut status_rx, &mut summary, &mut current);
        self.events.broadcast(EventPayload::ScanProgress {
            scan_id: summary.scan_id,
            library_id,
            percent: summary.percent(),
            current_file: None,
        });

        tracing::info!(
            scan_id = %summary.scan_id,
            library_id = %library_id,
            total = summary.total,
            unchanged = summary.unchanged,
            rejected = summary.rejected,
            queued = summary.queued,
            errors = summary.errors,
            cancelled = summary.cancelled,
            "Scan complete"
        );
        self.events.broadcast(EventPayload::ScanComplete {
            scan_id: summary.scan_id,
            library_id,
            total: summary.total,
            unchanged: summary.unchanged,
            rejected: summary.rejected,
            queued: summary.queued,
            errors: summary.errors,
        });

        summary
    }

    /// Forward everything currently buffered and publish progress if any
    /// file finished since the last call.
    fn drain(
        &self,
        results: &mut mpsc::UnboundedReceiver<(PathBuf, FileOutcome)>,
        status: &mut mpsc::UnboundedReceiver<PathBuf>,
        summary: &mut ScanSummary,
        current: &mut Option<PathBuf>,
    ) {
        while let Ok(path) = status.try_recv() {
            *current = Some(path);
        }

        let before = summary.processed;
        while let Ok((path, outcome)) = results.try_recv() {
            summary.processed += 1;
            match outcome {
                FileOutcome::Unchanged => summary.unchanged += 1,
                FileOutcome::Rejected => summary.rejected += 1,
                FileOutcome::Accepted(file) => {
                    match self
                        .queue
                        .enqueue(&file.path, file.library_id, file.priority_score)
                    {
                        Ok(()) => {
                            summary.queued += 1;
                            self.events.broadcast(EventPayload::FileQueued {
                                library_id: file.library_id,
                                path: file.path.display().to_string(),
                                priority_score: file.priority_score,
                            });
                        }
                        Err(e) => {
                            summary.errors += 1;
                            tracing::warn!(file = %path.display(), error = %e, "Failed to enqueue file");
                            self.file_error(summary.library_id, &path, e.to_string());
                        }
                    }
                }
                FileOutcome::Errored(message) => {
                    summary.errors += 1;
                    self.file_error(summary.library_id, &path, message);
                }
            }
        }

        if summary.processed != before {
            let percent = summary.percent();
            tracing::debug!(
                scan_id = %summary.scan_id,
                percent,
                processed = summary.processed,
                total = summary.total,
                "Scan progress"
            );
            self.events.broadcast(EventPayload::ScanProgress {
                scan_id: summary.scan_id,
                library_id: summary.library_id,
                percent,
                current_file: current.as_ref().map(|p| p.display().to_string()),
            });
        }
    }

    fn file_error(&self, library_id: LibraryId, path: &std::path::Path, message: String) {
        self.events.broadcast(EventPayload::FileError {
            library_id,
            path: path.display().to_string(),
            message,
        });
    }
}
