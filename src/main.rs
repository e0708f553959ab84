//! Driftnet main entry point
//!
//! This is the command-line interface for the driftnet crawl engine.

use anyhow::{Context, Result};
use clap::Parser;
use driftnet::config::{load_config_with_hash, Config};
use driftnet::crawler::{load_seeds, run_crawl};
use driftnet::output::{load_statistics, print_statistics};
use driftnet::storage::SqliteCheckpointStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Driftnet: a polite domain-discovery crawler
///
/// Driftnet walks outward from a seed list, paces every domain, expands
/// sitemaps, and checkpoints its frontier so an interrupted crawl resumes
/// where it stopped.
#[derive(Parser, Debug)]
#[command(name = "driftnet")]
#[command(version)]
#[command(about = "A polite domain-discovery crawler", long_about = None)]
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

    /// Discard the saved checkpoint and start from the seed list
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "fresh"])]
    dry_run: bool,

    /// Show statistics from the checkpoint database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("driftnet=info,warn"),
            1 => EnvFilter::new("driftnet=debug,info"),
            2 => EnvFilter::new("driftnet=trace,debug"),
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

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unlimited".to_string())
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Driftnet Dry Run ===\n");

    println!("Crawler:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Domain delay: {}ms", config.crawler.domain_delay_ms);
    println!(
        "  Global rate: {} per {}ms",
        config.crawler.global_rate, config.crawler.rate_window_ms
    );
    println!("  Max depth: {}", optional(config.crawler.max_depth));
    println!("  Max domains: {}", optional(config.crawler.max_domains));
    println!("  Links per document: {}", config.crawler.links_per_document);

    println!("\nFetcher:");
    println!("  Request timeout: {}s", config.fetcher.request_timeout_secs);
    println!("  Max body: {} bytes", config.fetcher.max_body_bytes);
    println!(
        "  Connections: {} total, {} per host",
        config.fetcher.max_connections, config.fetcher.max_connections_per_host
    );
    println!(
        "  Retries: {} (backoff {}ms)",
        config.fetcher.retry_budget, config.fetcher.retry_backoff_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nShutdown:");
    println!("  Deadline: {}s", config.shutdown.deadline_secs);
    println!("  Idle grace: {}s", config.shutdown.idle_grace_secs);

    println!("\nGovernor:");
    println!("  Memory ceiling: {} MB", config.governor.memory_ceiling_mb);
    println!(
        "  Cache ceiling: {} MB at {}",
        config.governor.cache_ceiling_mb,
        config.governor.cache_dir.display()
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path.display());
    println!("  Seeds: {}", config.output.seeds_path.display());

    let seeds = load_seeds(&config.output.seeds_path)?;

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", seeds.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the checkpoint database
fn handle_stats(config: &Config) -> Result<()> {
    let path = &config.output.database_path;
    println!("Database: {}\n", path.display());

    if !path.exists() {
        println!("No checkpoint database yet");
        return Ok(());
    }

    let store = SqliteCheckpointStore::new(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    match load_statistics(&store)? {
        Some(stats) => print_statistics(&stats),
        None => println!("No checkpoint saved yet"),
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous checkpoint)");
    } else {
        tracing::info!("Starting crawl (will resume from checkpoint if one exists)");
    }

    let report = run_crawl(config, config_hash, fresh)
        .await
        .context("crawl failed")?;

    println!("{}", report);
    Ok(())
}
