//! Command implementations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ms_core::config::Config;
use ms_core::LibraryId;
use ms_scan::providers::check_tools as probe_tools;
use ms_scan::{
    AcceptAll, CandidateRequest, FileTestChain, MaintenanceStatus, RequireMetadata, ScanContext,
    ScanService, ScanSummary, TaskResult, WorkQueue,
};
use tokio_util::sync::CancellationToken;

/// Downstream queue for the CLI: one `<priority>\t<path>` line per file.
struct StdoutQueue;

impl WorkQueue for StdoutQueue {
    fn enqueue(&self, path: &Path, _library_id: LibraryId, priority_score: i64) -> ms_core::Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{priority_score}\t{}", path.display())?;
        Ok(())
    }
}

fn open_service(config: Config) -> Result<ScanService> {
    let ctx = ScanContext::open(config).context("failed to open the scan store")?;
    tracing::debug!(providers = ?ctx.providers, "Providers ready");

    let mut chain = FileTestChain::new();
    if !ctx.providers.is_empty() {
        chain = chain.with_test(RequireMetadata);
    }
    let chain = chain.with_test(AcceptAll::default());

    Ok(ScanService::new(ctx, chain, Arc::new(StdoutQueue)))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

/// Relative CLI paths are taken from the working directory.
fn requests(library: LibraryId, paths: &[PathBuf]) -> Result<Vec<CandidateRequest>> {
    paths
        .iter()
        .map(|p| {
            let abs = std::path::absolute(p)
                .with_context(|| format!("cannot resolve {}", p.display()))?;
            Ok(CandidateRequest::new(library, abs))
        })
        .collect()
}

/// Cancel the token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping after in-flight files");
            child.cancel();
        }
    });
    token
}

fn print_summary(summary: &ScanSummary) {
    eprintln!(
        "library {}: {} files, {} unchanged, {} rejected, {} queued, {} errors{}",
        summary.library_id,
        summary.total,
        summary.unchanged,
        summary.rejected,
        summary.queued,
        summary.errors,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}

pub fn scan(
    config: Config,
    library: Option<LibraryId>,
    paths: &[PathBuf],
    json: bool,
) -> Result<()> {
    let service = open_service(config)?;

    let requests = match library {
        Some(id) if !paths.is_empty() => requests(id, paths)?,
        Some(id) => {
            let lib = service.context().libraries.require_enabled(id)?;
            vec![CandidateRequest::new(id, lib.root())]
        }
        None => service
            .context()
            .libraries
            .iter()
            .filter(|l| l.config.enabled)
            .map(|l| CandidateRequest::new(l.id(), l.root()))
            .collect(),
    };
    if requests.is_empty() {
        anyhow::bail!("no enabled libraries configured");
    }

    let summaries = runtime()?.block_on(async {
        let cancel = cancel_on_interrupt();
        service.test_files(&requests, &cancel).await
    })?;

    if json {
        eprintln!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        summaries.iter().for_each(print_summary);
    }
    Ok(())
}

pub fn process(config: Config, library: LibraryId, paths: &[PathBuf], priority: i64) -> Result<()> {
    let service = open_service(config)?;
    let requests = requests(library, paths)?;
    let queued = runtime()?.block_on(service.process_files(&requests, priority))?;
    eprintln!("{queued} files queued");
    Ok(())
}

pub fn post_process(
    config: Config,
    library: LibraryId,
    source: &Path,
    destinations: &[PathBuf],
) -> Result<()> {
    let service = open_service(config)?;
    let absolute = |p: &Path| {
        std::path::absolute(p).with_context(|| format!("cannot resolve {}", p.display()))
    };
    let source = absolute(source)?;
    let destinations = if destinations.is_empty() {
        vec![source.clone()]
    } else {
        destinations
            .iter()
            .map(|p| absolute(p.as_path()))
            .collect::<Result<Vec<_>>>()?
    };

    let task = TaskResult {
        library_id: library,
        source,
        destinations,
        processing_success: true,
        file_move_success: true,
    };
    let report = runtime()?.block_on(service.post_processor().on_task_complete(&task));
    println!(
        "post-process: {} recorded, {} cached, {} skipped",
        report.recorded, report.cached, report.skipped
    );
    Ok(())
}

pub fn timestamps(config: Config, library: LibraryId, json: bool) -> Result<()> {
    let service = open_service(config)?;
    let snapshot = runtime()?.block_on(service.timestamp_snapshot(library))?;
    let mut entries: Vec<_> = snapshot.into_iter().collect();
    entries.sort();

    if json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .into_iter()
            .map(|(path, mtime)| (path.display().to_string(), mtime.into()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }
    for (path, mtime) in entries {
        println!("{mtime}\t{}", path.display());
    }
    Ok(())
}

fn report(operation: &str, status: MaintenanceStatus) -> Result<()> {
    match status {
        MaintenanceStatus::Completed { affected } => {
            println!("{operation}: {affected} records affected");
            Ok(())
        }
        MaintenanceStatus::Skipped => {
            println!("{operation}: skipped, another maintenance operation is running");
            Ok(())
        }
        MaintenanceStatus::Failed { error } => anyhow::bail!("{operation} failed: {error}"),
    }
}

pub fn prune(config: Config, library: Option<LibraryId>, fraction: Option<f64>) -> Result<()> {
    let fraction = fraction.unwrap_or(config.maintenance.prune_fraction);
    let service = open_service(config)?;
    report("prune", service.maintenance().prune(library, fraction)?)
}

pub fn reset_oldest(config: Config, library: LibraryId, fraction: Option<f64>) -> Result<()> {
    let fraction = fraction.unwrap_or(config.maintenance.reset_fraction);
    let service = open_service(config)?;
    report(
        "reset-oldest",
        service.maintenance().reset_oldest(library, fraction)?,
    )
}

pub fn prune_orphans(config: Config, library: Option<LibraryId>) -> Result<()> {
    let service = open_service(config)?;
    report("prune-orphans", service.maintenance().prune_orphans(library)?)
}

pub fn reset_timestamps(config: Config, library: LibraryId, paths: &[PathBuf]) -> Result<()> {
    let service = open_service(config)?;
    let n = service
        .maintenance()
        .reset_timestamps(&requests(library, paths)?)?;
    println!("reset-timestamps: {n} files marked as changed");
    Ok(())
}

pub fn update_timestamps(config: Config, library: LibraryId, paths: &[PathBuf]) -> Result<()> {
    let service = open_service(config)?;
    let n = service
        .maintenance()
        .update_timestamps(&requests(library, paths)?)?;
    println!("update-timestamps: {n} files marked as unchanged");
    Ok(())
}

pub fn stats(config: Config, json: bool) -> Result<()> {
    let service = open_service(config)?;
    let ctx = service.context();

    let mut libraries = serde_json::Map::new();
    for lib in ctx.libraries.iter() {
        libraries.insert(
            lib.id().to_string(),
            serde_json::json!({
                "name": lib.config.name,
                "path": lib.root(),
                "enabled": lib.config.enabled,
                "timestamps": ctx.timestamps.count(Some(lib.id()))?,
            }),
        );
    }
    let mut metadata = serde_json::Map::new();
    for provider in ctx.providers.names() {
        metadata.insert(provider.to_string(), ctx.metadata.count(provider)?.into());
    }
    let total = ctx.timestamps.count(None)?;

    if json {
        let value = serde_json::json!({
            "timestamps": total,
            "libraries": libraries,
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Timestamp records: {total}");
    for (id, lib) in &libraries {
        println!(
            "  library {id} ({}): {}",
            lib["name"].as_str().unwrap_or_default(),
            lib["timestamps"]
        );
    }
    println!("Metadata records:");
    if metadata.is_empty() {
        println!("  (no providers)");
    }
    for (provider, count) in &metadata {
        println!("  {provider}: {count}");
    }
    Ok(())
}

pub fn check_tools(config: &Config) -> Result<()> {
    println!("Checking metadata provider tools...\n");

    let tools = probe_tools(&config.providers);
    let mut all_ok = true;

    for tool in &tools {
        let status = if !tool.enabled {
            "-"
        } else if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        if !tool.enabled {
            print!(" [disabled]");
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All enabled tools are available!");
    } else {
        println!("Some tools are missing. Files will be tested without their metadata.");
    }

    Ok(())
}

pub fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            Config::load(p)?
        }
        None => {
            println!("No config file given, validating defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration is valid ({} libraries)", config.libraries.len());
    } else {
        println!("Configuration loaded with {} warning(s):", warnings.len());
        for w in &warnings {
            println!("  - {w}");
        }
    }
    Ok(())
}
