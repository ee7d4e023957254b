//! The file-test chain.
//!
//! Tests run in order against a [`FileTestContext`] until one of them
//! decides whether the file goes to the processing queue. A file nobody
//! decided on is not queued.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ms_core::{LibraryId, Result};
use parking_lot::RwLock;

use crate::context::FileTestContext;

/// One step of the chain.
pub trait FileTest: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect the context and optionally set `add_to_pending`.
    fn test(&self, ctx: &mut FileTestContext) -> Result<()>;
}

/// Knows which files previously failed processing.
pub trait FailureHistory: Send + Sync {
    fn has_failed(&self, library_id: LibraryId, path: &Path) -> bool;
}

impl<T: FailureHistory + ?Sized> FailureHistory for Arc<T> {
    fn has_failed(&self, library_id: LibraryId, path: &Path) -> bool {
        (**self).has_failed(library_id, path)
    }
}

/// A [`FailureHistory`] backed by an in-memory set. Lives as long as the
/// process; the post-processor records failed tasks into it.
#[derive(Debug, Default)]
pub struct FailedSet {
    failed: RwLock<HashSet<(LibraryId, PathBuf)>>,
}

impl FailedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_failed(&self, library_id: LibraryId, path: impl Into<PathBuf>) {
        self.failed.write().insert((library_id, path.into()));
    }

    pub fn clear(&self, library_id: LibraryId, path: &Path) {
        self.failed.write().remove(&(library_id, path.to_path_buf()));
    }
}

impl FailureHistory for FailedSet {
    fn has_failed(&self, library_id: LibraryId, path: &Path) -> bool {
        self.failed
            .read()
            .contains(&(library_id, path.to_path_buf()))
    }
}

/// Ordered list of tests plus the failure-history gate.
#[derive(Default)]
pub struct FileTestChain {
    tests: Vec<Box<dyn FileTest>>,
    failure_history: Option<Box<dyn FailureHistory>>,
    retest_failed: bool,
}

impl FileTestChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test(mut self, test: impl FileTest + 'static) -> Self {
        self.tests.push(Box::new(test));
        self
    }

    pub fn with_failure_history(mut self, history: impl FailureHistory + 'static) -> Self {
        self.failure_history = Some(Box::new(history));
        self
    }

    pub fn has_failure_history(&self) -> bool {
        self.failure_history.is_some()
    }

    /// Let files that failed processing before be tested again.
    pub fn retest_failed(mut self, enabled: bool) -> Self {
        self.retest_failed = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Run the chain. Returns whether the file should be queued.
    ///
    /// A failing test aborts the chain with its error; the caller decides
    /// what that means for the file.
    pub fn evaluate(&self, ctx: &mut FileTestContext) -> Result<bool> {
        if !self.retest_failed {
            if let Some(history) = &self.failure_history {
                if history.has_failed(ctx.library_id, &ctx.path) {
                    ctx.reject("file previously failed processing");
                    return Ok(false);
                }
            }
        }

        for test in &self.tests {
            test.test(ctx)?;
            if ctx.is_decided() {
                tracing::trace!(
                    test = test.name(),
                    file = %ctx.path.display(),
                    accepted = ?ctx.add_to_pending,
                    "File test decided"
                );
                break;
            }
        }

        Ok(ctx.add_to_pending == Some(true))
    }
}

/// Reject files for which no provider produced metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireMetadata;

impl FileTest for RequireMetadata {
    fn name(&self) -> &str {
        "require_metadata"
    }

    fn test(&self, ctx: &mut FileTestContext) -> Result<()> {
        if ctx.metadata.is_empty() {
            ctx.reject("no metadata available");
        }
        Ok(())
    }
}

/// Accept everything that reaches it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll {
    pub priority_score: i64,
}

impl FileTest for AcceptAll {
    fn name(&self) -> &str {
        "accept_all"
    }

    fn test(&self, ctx: &mut FileTestContext) -> Result<()> {
        ctx.accept(self.priority_score);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_core::Error;
    use serde_json::json;

    const LIB: LibraryId = LibraryId::new(1);

    struct Boom;

    impl FileTest for Boom {
        fn name(&self) -> &str {
            "boom"
        }

        fn test(&self, _ctx: &mut FileTestContext) -> Result<()> {
            Err(Error::Internal("boom".into()))
        }
    }

    struct Decorate;

    impl FileTest for Decorate {
        fn name(&self) -> &str {
            "decorate"
        }

        fn test(&self, ctx: &mut FileTestContext) -> Result<()> {
            ctx.decisions.insert("container".into(), json!("mkv"));
            Ok(())
        }
    }

    fn ctx_with_metadata() -> FileTestContext {
        let mut ctx = FileTestContext::new(LIB, "/m/a.mkv", 100);
        ctx.metadata.insert("ffprobe".into(), json!({"streams": []}));
        ctx
    }

    #[test]
    fn first_decision_wins() {
        let chain = FileTestChain::new()
            .with_test(Decorate)
            .with_test(RequireMetadata)
            .with_test(AcceptAll { priority_score: 7 })
            .with_test(Boom);

        let mut ctx = ctx_with_metadata();
        assert!(chain.evaluate(&mut ctx).unwrap());
        assert_eq!(ctx.priority_score, 7);
        assert_eq!(ctx.decisions["container"], json!("mkv"));

        let mut bare = FileTestContext::new(LIB, "/m/b.mkv", 100);
        assert!(!chain.evaluate(&mut bare).unwrap());
        assert_eq!(bare.issues, vec!["no metadata available"]);
    }

    #[test]
    fn undecided_is_not_queued() {
        let chain = FileTestChain::new().with_test(Decorate);
        let mut ctx = ctx_with_metadata();
        assert!(!chain.evaluate(&mut ctx).unwrap());
        assert_eq!(ctx.add_to_pending, None);
    }

    #[test]
    fn test_errors_propagate() {
        let chain = FileTestChain::new().with_test(Boom).with_test(AcceptAll::default());
        assert!(chain.evaluate(&mut ctx_with_metadata()).is_err());
    }

    #[test]
    fn failure_history_gate() {
        let failed = FailedSet::new();
        failed.mark_failed(LIB, "/m/a.mkv");
        let chain = FileTestChain::new()
            .with_test(AcceptAll::default())
            .with_failure_history(failed);
        assert!(!chain.evaluate(&mut ctx_with_metadata()).unwrap());

        let failed = FailedSet::new();
        failed.mark_failed(LIB, "/m/a.mkv");
        let chain = FileTestChain::new()
            .with_test(AcceptAll::default())
            .with_failure_history(failed)
            .retest_failed(true);
        assert!(chain.evaluate(&mut ctx_with_metadata()).unwrap());
    }

    #[test]
    fn shared_history_sees_later_failures() {
        let failed = Arc::new(FailedSet::new());
        let chain = FileTestChain::new()
            .with_test(AcceptAll::default())
            .with_failure_history(Arc::clone(&failed));
        assert!(chain.has_failure_history());
        assert!(chain.evaluate(&mut ctx_with_metadata()).unwrap());

        failed.mark_failed(LIB, "/m/a.mkv");
        let mut ctx = ctx_with_metadata();
        assert!(!chain.evaluate(&mut ctx).unwrap());
        assert_eq!(ctx.issues, vec!["file previously failed processing"]);
    }

    #[test]
    fn failed_set_clear() {
        let failed = FailedSet::new();
        failed.mark_failed(LIB, "/m/a.mkv");
        assert!(failed.has_failed(LIB, Path::new("/m/a.mkv")));
        failed.clear(LIB, Path::new("/m/a.mkv"));
        assert!(!failed.has_failed(LIB, Path::new("/m/a.mkv")));
    }
}
