use clap::{Parser, Subcommand};
use ms_core::LibraryId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediascan")]
#[command(author, version, about = "Incremental media library scanner")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Test library files and print the ones to process
    Scan {
        /// Library to scan (all enabled libraries if omitted)
        #[arg(short, long)]
        library: Option<LibraryId>,

        /// Files or directories inside the library (whole library if omitted)
        #[arg(requires = "library")]
        paths: Vec<PathBuf>,

        /// Print scan summaries as JSON (on stderr, stdout carries the queue)
        #[arg(long)]
        json: bool,
    },

    /// Queue files for processing without testing them
    Process {
        #[arg(short, long)]
        library: LibraryId,

        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Priority score attached to every file
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },

    /// Report a finished processing task so its outputs are skipped by the
    /// next scan
    PostProcess {
        #[arg(short, long)]
        library: LibraryId,

        /// File the task was created for
        #[arg(long)]
        source: PathBuf,

        /// Files the task wrote (the source itself when processed in place)
        destinations: Vec<PathBuf>,
    },

    /// Print a library's recorded timestamps
    Timestamps {
        #[arg(short, long)]
        library: LibraryId,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one proportional pruning pass over the stores
    Prune {
        /// Limit to one library (metadata caches are only pruned without this)
        #[arg(short, long)]
        library: Option<LibraryId>,

        /// Fraction of records to inspect (defaults to maintenance.prune_fraction)
        #[arg(long)]
        fraction: Option<f64>,
    },

    /// Force a re-test of the oldest fraction of a library
    ResetOldest {
        #[arg(short, long)]
        library: LibraryId,

        /// Fraction of records to reset (defaults to maintenance.reset_fraction)
        #[arg(long)]
        fraction: Option<f64>,
    },

    /// Remove every record whose file is gone or no longer in its library
    PruneOrphans {
        #[arg(short, long)]
        library: Option<LibraryId>,
    },

    /// Mark files as changed so the next scan tests them
    ResetTimestamps {
        #[arg(short, long)]
        library: LibraryId,

        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Mark files as unchanged at their current modification time
    UpdateTimestamps {
        #[arg(short, long)]
        library: LibraryId,

        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show record counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that metadata provider tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
