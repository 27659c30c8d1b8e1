//! Job Harvester main entry point
//!
//! This is the command-line interface for the job-board harvester.

use anyhow::Context;
use clap::{Parser, Subcommand};
use job_harvester::config::{load_config_with_hash, Config};
use job_harvester::crawler::Coordinator;
use job_harvester::output::stats::print_session;
use job_harvester::output::{load_statistics, print_statistics};
use job_harvester::storage::SqliteGateway;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Job Harvester: a resumable two-stage job-board crawler
///
/// The listing stage walks category pages and stores new listings; the
/// content stage fetches each listing's description from a durable queue.
#[derive(Parser, Debug)]
#[command(name = "job-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A resumable job-board harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    mode: Mode,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Listing stage then content stage, recorded as one session
    Run,
    /// Listing stage only; summaries stay queued for a content run
    Info,
    /// Content stage only, over the queued job ids
    Content,
    /// Fetch descriptions for stored listings that still have none
    MissingContent,
    /// Show statistics from the database and exit
    Stats,
    /// Validate the config and show what would be harvested
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.mode {
        Mode::Check => handle_check(&config),
        Mode::Stats => handle_stats(&config),
        mode => handle_harvest(config, config_hash, mode).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("job_harvester=info,warn"),
            1 => EnvFilter::new("job_harvester=debug,info"),
            2 => EnvFilter::new("job_harvester=trace,debug"),
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

/// Handles the harvesting modes
async fn handle_harvest(config: Config, config_hash: String, mode: Mode) -> anyhow::Result<()> {
    let coordinator =
        Coordinator::new(config, config_hash).context("Failed to open harvest store")?;

    // Ctrl-C stops every worker; whatever was saved stays saved
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping workers");
            cancel.cancel();
        }
    });

    match mode {
        Mode::Info => {
            let report = coordinator.run_info().await?;
            println!(
                "Listed {} categories ({} subcategories, {} failed)",
                report.categories, report.subcategories, report.failed_categories
            );
        }
        Mode::Content => print_session(&coordinator.run_content().await?),
        Mode::MissingContent => print_session(&coordinator.run_missing_content().await?),
        _ => print_session(&coordinator.run().await?),
    }

    Ok(())
}

/// Handles the stats mode: reads totals and the last session from the store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let database_path = Path::new(&config.storage.database_path);
    if !database_path.exists() {
        anyhow::bail!("Database not found: {}", database_path.display());
    }

    let gateway = SqliteGateway::new(database_path).context("Failed to open harvest store")?;
    let stats = load_statistics(&gateway, &config.site.name)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the check mode: shows the validated configuration
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Job Harvester Check ===\n");

    println!("Site:");
    println!("  Name: {}", config.site.name);
    println!("  Category URL: {}", config.site.category_url);
    println!("  Content URL: {}", config.site.content_url);

    println!("\nWorkers:");
    println!("  Listing: {}", config.crawler.listing_workers);
    println!("  Content: {}", config.crawler.content_workers);
    println!("  Recovery: {}", config.crawler.recovery_workers);
    println!("  Day limit: {}", config.crawler.day_limit);

    println!("\nIdentity:");
    println!("  User agents: {}", config.identity.user_agents.len());
    match (&config.identity.proxy_list_url, &config.identity.proxy_file) {
        (Some(url), _) => println!("  Proxies: {}", url),
        (_, Some(file)) => println!("  Proxies: {}", file),
        _ => println!("  Proxies: none (direct connections)"),
    }

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Queue: {}", config.storage.queue_key_for(&config.site.name));

    println!("\nCategories ({}):", config.categories.len());
    for category in &config.categories {
        println!("  - {}", category);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}
