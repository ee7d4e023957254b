//! ms-scan: scan dispatch and store maintenance.
//!
//! Candidate files are validated and expanded per library, then fanned out
//! over a bounded pool of tester workers. Each tester consults the
//! timestamp store and metadata cache, runs the registered metadata
//! providers on a miss, and hands the assembled context to the file-test
//! chain. Accepted files go to a downstream [`WorkQueue`].

pub mod candidates;
pub mod chain;
pub mod command;
pub mod context;
pub mod dispatcher;
pub mod filter;
pub mod library;
pub mod maintenance;
pub mod postprocess;
pub mod provider;
pub mod providers;
pub mod queue;
pub mod service;
pub mod worker;

pub use candidates::CandidateRequest;
pub use chain::{AcceptAll, FailedSet, FailureHistory, FileTest, FileTestChain, RequireMetadata};
pub use command::ToolCommand;
pub use context::{FileTestContext, ScanContext};
pub use dispatcher::{ScanDispatcher, ScanSummary};
pub use filter::LibraryFilter;
pub use maintenance::{Maintenance, MaintenanceStatus};
pub use postprocess::{PostProcessReport, PostProcessor, TaskResult};
pub use provider::{MetadataProvider, ProviderRegistry};
pub use queue::{MemoryQueue, QueuedFile, WorkQueue};
pub use service::ScanService;
pub use worker::{FileOutcome, Tester};
