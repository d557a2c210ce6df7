//! Catalog-Crawler main entry point
//!
//! This is the command-line interface for the Catalog-Crawler catalog crawl orchestrator.

use anyhow::Context;
use catalog_crawler::config::{load_config_with_hash, Config};
use catalog_crawler::crawler::{plan_seeds, CrawlHandle, Crawler, SeedDecision};
use catalog_crawler::storage::open_storage;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Catalog-Crawler: a bounded, resumable catalog crawler
///
/// Catalog-Crawler walks paginated listing pages, schedules each product
/// page at most once under a global item quota, and writes one record per
/// product page. Interrupted crawls resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(version)]
#[command(about = "A bounded, resumable catalog crawler", long_about = None)]
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

    /// Start a fresh crawl, discarding the persisted queue, quota and dataset
    #[arg(long)]
    fresh: bool,

    /// Validate config and show how the start URLs would be seeded
    #[arg(long, conflicts_with_all = ["stats", "fresh"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_crawler=info,warn"),
            1 => EnvFilter::new("catalog_crawler=debug,info"),
            2 => EnvFilter::new("catalog_crawler=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the seeding plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrency: {}", config.crawler.max_concurrency);
    println!("  Max request retries: {}", config.crawler.max_request_retries);
    println!(
        "  Max requests per crawl: {}",
        config.crawler.max_requests_per_crawl
    );
    match config.input.max_items.filter(|&n| n > 0) {
        Some(limit) => println!("  Max items: {}", limit),
        None => println!("  Max items: unlimited"),
    }

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Item path marker: {}", config.site.item_path_marker);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(path) = &config.output.dataset_path {
        println!("  Dataset: {}", path);
    }
    if config.input.extend_output.is_some() {
        println!("  Output extension: configured");
    }

    let plan = plan_seeds(config)?;
    println!("\nStart URLs ({}):", plan.len());
    let mut accepted = 0;
    for decision in &plan {
        match decision {
            SeedDecision::Accept(request) => {
                accepted += 1;
                println!("  - [{}] {}", request.label, request.url);
            }
            SeedDecision::Rejected { url } => {
                println!("  - [ignored: outside site] {}", url);
            }
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} start URLs", accepted);

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use catalog_crawler::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume persisted state)");
    }

    let client = launch_client(&config).await?;
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let crawler = Crawler::new(config, config_hash, storage, client, fresh)?;

    let signals = tokio::spawn(forward_signals(crawler.handle()));
    let result = crawler.run().await;
    signals.abort();

    let report = result.context("crawl failed")?;
    tracing::info!(
        "Crawl stopped ({:?}): {} handled, {} failed, {} records",
        report.stop_reason,
        report.handled,
        report.failed,
        report.records_emitted
    );

    Ok(())
}

#[cfg(feature = "chromium")]
async fn launch_client(
    config: &Config,
) -> anyhow::Result<std::sync::Arc<dyn catalog_crawler::page::PageClient>> {
    use catalog_crawler::page::{chromium::ChromiumClient, LaunchOptions};

    let client = ChromiumClient::launch(&LaunchOptions::from_config(config))
        .await
        .context("failed to launch browser")?;
    Ok(std::sync::Arc::new(client))
}

#[cfg(not(feature = "chromium"))]
async fn launch_client(
    _config: &Config,
) -> anyhow::Result<std::sync::Arc<dyn catalog_crawler::page::PageClient>> {
    anyhow::bail!("built without a page client; enable the `chromium` feature")
}

/// Ctrl-C stops the crawl; SIGTERM checkpoints first, then stops
async fn forward_signals(handle: CrawlHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                wait_for_ctrl_c().await;
                stop(&handle).await;
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {}
            _ = term.recv() => {
                tracing::info!("SIGTERM received, checkpointing");
                if let Err(e) = handle.checkpoint().await {
                    tracing::error!("Checkpoint failed: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    stop(&handle).await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn stop(handle: &CrawlHandle) {
    tracing::info!("Stopping crawl");
    if let Err(e) = handle.shutdown().await {
        tracing::error!("Shutdown failed: {}", e);
    }
}
