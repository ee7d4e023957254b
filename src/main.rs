mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use ms_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive the filter from --verbose.
    // Logs go to stderr: stdout carries the queued file list.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediascan=trace,ms_scan=trace,ms_db=debug,ms_core=debug".to_string()
        } else {
            "mediascan=info,ms_scan=info,ms_db=warn,ms_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Scan {
            library,
            paths,
            json,
        } => commands::scan(load(config_path), library, &paths, json),
        Commands::Process {
            library,
            paths,
            priority,
        } => commands::process(load(config_path), library, &paths, priority),
        Commands::PostProcess {
            library,
            source,
            destinations,
        } => commands::post_process(load(config_path), library, &source, &destinations),
        Commands::Timestamps { library, json } => {
            commands::timestamps(load(config_path), library, json)
        }
        Commands::Prune { library, fraction } => {
            commands::prune(load(config_path), library, fraction)
        }
        Commands::ResetOldest { library, fraction } => {
            commands::reset_oldest(load(config_path), library, fraction)
        }
        Commands::PruneOrphans { library } => commands::prune_orphans(load(config_path), library),
        Commands::ResetTimestamps { library, paths } => {
            commands::reset_timestamps(load(config_path), library, &paths)
        }
        Commands::UpdateTimestamps { library, paths } => {
            commands::update_timestamps(load(config_path), library, &paths)
        }
        Commands::Stats { json } => commands::stats(load(config_path), json),
        Commands::CheckTools => commands::check_tools(&load(config_path)),
        Commands::Validate {
            config: validate_path,
        } => commands::validate_config(validate_path.as_deref().or(config_path)),
        Commands::Version => {
            println!("mediascan {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load(path: Option<&std::path::Path>) -> Config {
    let config = Config::load_or_default(path);
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }
    config
}
