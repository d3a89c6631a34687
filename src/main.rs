//! lms-archive main entry point
//!
//! This is the command-line interface for the portal archiver.

use anyhow::Context;
use clap::Parser;
use lms_archive::config::{load_config_with_hash, Config};
use lms_archive::crawler::{seed_tasks, Coordinator};
use lms_archive::output::{load_statistics, print_statistics, print_summary, SqliteIndex};
use lms_archive::state::EntityKind;
use lms_archive::storage::FsArtifactStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// lms-archive: a resumable archiver for learning-management portals
///
/// Walks the portal's course catalog, semester listings, courses and user
/// profiles and stores each page once under its identifier. Re-running
/// against the same output directory only fetches what is missing.
#[derive(Parser, Debug)]
#[command(name = "lms-archive")]
#[command(version)]
#[command(about = "A resumable archiver for learning-management portals", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the seed plan without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show what the archive holds and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_archive(config, config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lms_archive=info,warn"),
            1 => EnvFilter::new("lms_archive=debug,info"),
            2 => EnvFilter::new("lms_archive=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the seed plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== lms-archive Dry Run ===\n");

    println!("Portal:");
    println!("  Root URL: {}", config.portal.root_url);
    println!("  Credential header: {}", config.portal.credential_header);
    println!(
        "  Credential: {}",
        if config.portal.resolved_credential().is_some() {
            "set"
        } else {
            "missing"
        }
    );

    println!("\nCrawler:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!(
        "  Backoff: {}ms doubling, capped at {}ms",
        config.crawler.backoff_base_ms, config.crawler.backoff_max_ms
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    if let Some(index) = &config.output.index_path {
        println!("  Index: {}", index);
    }

    let seeds = seed_tasks(config)?;
    let users = seeds
        .iter()
        .filter(|t| t.kind.entity() == Some(EntityKind::User))
        .count();

    println!("\nSeeds:");
    println!("  Catalog: {}", if config.seeds.catalog { "yes" } else { "no" });
    println!("  User profiles: {}", users);

    println!("\n✓ Configuration is valid");
    println!("✓ Would start with {} seed tasks", seeds.len());

    Ok(())
}

/// Handles the --stats mode: counts artifacts and index rows
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Archive: {}\n", config.output.directory);

    let store = FsArtifactStore::open(&config.output.directory)
        .with_context(|| format!("cannot open archive at {}", config.output.directory))?;
    let index = match &config.output.index_path {
        Some(path) => Some(SqliteIndex::open(Path::new(path))?),
        None => None,
    };

    let stats = load_statistics(&store, index.as_ref())?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main archive run
async fn handle_archive(config: Config, config_hash: String) -> anyhow::Result<()> {
    let coordinator = Coordinator::new(config)?.with_config_hash(config_hash);

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight tasks");
            cancel.cancel();
        }
    });

    let summary = coordinator.run().await?;
    print_summary(&summary);

    Ok(())
}
