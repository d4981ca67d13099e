//! Newt-Walker main entry point
//!
//! This is the command-line runner for the Newt-Walker crawl engine.

use anyhow::{bail, Context};
use clap::Parser;
use newt_walker::config::{load_config_with_hash, validate, EngineConfig};
use newt_walker::crawler::{recover_crashed_jobs, HttpFetcher, StatusQuery};
use newt_walker::storage::{open_storage, shared, SharedStore};
use newt_walker::{InstanceRegistry, JobStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Session key used by the command-line runner
const CLI_SESSION: &str = "cli";

/// Newt-Walker: a resumable SEO crawler
///
/// Newt-Walker crawls a site while respecting robots.txt and crawl delays,
/// scores page content, records links and SEO issues, and checkpoints its
/// progress so an interrupted crawl can be resumed.
#[derive(Parser, Debug)]
#[command(name = "newt-walker")]
#[command(version = "1.0.0")]
#[command(about = "A resumable SEO crawler", long_about = None)]
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

    /// Seed URL, in addition to those in the config file
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Owner recorded on new jobs and checked on resume
    #[arg(long, default_value = "local")]
    owner: String,

    /// Resume a persisted job from its last checkpoint
    #[arg(long, value_name = "JOB_ID", conflicts_with_all = ["dry_run", "jobs"])]
    resume: Option<i64>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "jobs")]
    dry_run: bool,

    /// List persisted jobs and exit
    #[arg(long)]
    jobs: bool,

    /// Seconds between progress reports
    #[arg(long, default_value_t = 10)]
    progress_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.seeds.extend(cli.seeds.iter().cloned());
    validate(&config).context("invalid configuration")?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let storage = open_storage(
        Path::new(&config.storage.database_path),
        config.storage.batch_size,
    )
    .context("failed to open checkpoint database")?;
    let store = shared(storage);

    let swept = recover_crashed_jobs(&store)?;
    if !swept.is_empty() {
        tracing::warn!("Marked {} orphaned job(s) as failed: {:?}", swept.len(), swept);
    }

    if cli.jobs {
        return handle_jobs(&store);
    }

    handle_crawl(config, store, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("newt_walker=info,warn"),
            1 => EnvFilter::new("newt_walker=debug,info"),
            2 => EnvFilter::new("newt_walker=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &EngineConfig) {
    let crawler = &config.crawler;
    println!("=== Newt-Walker Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Max URLs: {}", crawler.max_urls);
    println!("  Concurrency: {}", crawler.concurrency);
    println!("  Delay: {}s", crawler.delay);
    println!("  Timeout: {}s, retries: {}", crawler.timeout, crawler.retries);
    println!("  Robots: {:?} (respect: {})", crawler.robots_mode, crawler.respect_robots);
    println!("  Crawl external: {}", crawler.crawl_external);
    println!("  User agent: {}", crawler.user_agent);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Batch size: {}", config.storage.batch_size);

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --jobs mode: lists persisted jobs
fn handle_jobs(store: &SharedStore) -> anyhow::Result<()> {
    let jobs = store.lock().list_jobs(None)?;
    if jobs.is_empty() {
        println!("No crawl jobs recorded");
        return Ok(());
    }

    println!("{:>6}  {:<10}  {:>10}  {:>8}  {:<12}  URL", "ID", "STATUS", "DISCOVERED", "CRAWLED", "OWNER");
    for job in jobs {
        println!(
            "{:>6}  {:<10}  {:>10}  {:>8}  {:<12}  {}",
            job.id, job.status.to_db_string(), job.discovered, job.crawled, job.owner, job.base_url
        );
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: EngineConfig, store: SharedStore, cli: &Cli) -> anyhow::Result<()> {
    let fetcher = Arc::new(HttpFetcher::new()?);
    let registry = Arc::new(InstanceRegistry::new(&config, fetcher, store));
    let orchestrator = registry.get_or_create(CLI_SESSION);
    let sampler = Arc::clone(&registry).spawn_sampling_loop();

    match cli.resume {
        Some(job_id) => {
            orchestrator.resume_from_database(job_id, &cli.owner).await?;
            tracing::info!("Resumed job {}", job_id);
        }
        None => {
            if config.seeds.is_empty() {
                bail!("no seed URLs: add `seeds` to the config file or pass --seed");
            }
            let message = orchestrator
                .start_crawl(&config.seeds, config.crawler.clone(), &cli.owner)
                .await?;
            tracing::info!("{}", message);
        }
    }

    let mut progress = tokio::time::interval(Duration::from_secs(cli.progress_interval.max(1)));
    progress.tick().await;

    let settled = tokio::select! {
        status = orchestrator.wait_until_settled() => Some(status),
        _ = shutdown_signal() => None,
        _ = async {
            loop {
                progress.tick().await;
                report_progress(&registry);
            }
        } => None,
    };

    let status = match settled {
        Some(status) => status,
        None => {
            tracing::info!("Checkpointing before exit");
            registry.shutdown_all().await;
            orchestrator.status()
        }
    };

    sampler.abort();

    let snapshot = orchestrator.get_status(&StatusQuery::default());
    println!("\n=== Crawl {} ===", status);
    if let Some(job_id) = snapshot.job_id {
        println!("Job: {}", job_id);
    }
    println!("Base URL: {}", snapshot.base_url);
    println!("Discovered: {}", snapshot.stats.discovered);
    println!("Crawled: {}", snapshot.stats.crawled);
    println!("Links: {}", snapshot.stats.links);
    println!("Issues: {}", snapshot.stats.issues);
    println!("Blocked by robots.txt: {}", snapshot.stats.blocked.total);
    if let Some(error) = &snapshot.error {
        println!("Last error: {}", error);
    }
    if status == JobStatus::Paused {
        if let Some(job_id) = snapshot.job_id {
            println!("\nResume with: newt-walker {} --resume {}", cli.config.display(), job_id);
        }
    }

    Ok(())
}

fn report_progress(registry: &InstanceRegistry) {
    let query = StatusQuery {
        url_since: usize::MAX,
        link_since: usize::MAX,
        issue_since: usize::MAX,
        full_refresh: false,
    };
    if let Some(snapshot) = registry.status(CLI_SESSION, &query) {
        tracing::info!(
            "Progress: {} crawled, {} queued, {} in flight, {} issues",
            snapshot.stats.crawled,
            snapshot.stats.queued,
            snapshot.stats.in_flight,
            snapshot.stats.issues
        );
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
