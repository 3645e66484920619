//! repocache - version-keyed snapshot cache for GitHub repository data
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use repocache::cli::{Cli, Commands};
use repocache::config::ConfigManager;
use repocache::error::RepoCacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RepoCacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug; general.verbose counts as -v
    let level = cli.verbose.max(u8::from(config.general.verbose));
    let filter = match level {
        0 => EnvFilter::new("repocache=warn"),
        1 => EnvFilter::new("repocache=info"),
        _ => EnvFilter::new("repocache=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Using config {}", config_manager.path().display());
    config.warn_deprecated();

    if let Some(dir) = cli.cache_dir {
        config.cache.dir = Some(dir);
    }

    match cli.command {
        Commands::Status(args) => repocache::cli::commands::status(args, &config).await,
        Commands::Refresh(args) => repocache::cli::commands::refresh(args, &config).await,
        Commands::Cache(args) => repocache::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            repocache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
