//! Outbound main entry point
//!
//! Command-line front end for the outbound pipeline and site crawler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use outbound::config::{load_config_with_hash, Config};
use outbound::crawler::{CrawlReport, CrawlResult, Crawler};
use outbound::pipeline::{Pipeline, RequestDescriptor, ResponseCache};
use outbound::url::normalize_url;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Outbound: resilient HTTP fetching and bounded site crawling
///
/// Every request goes through the same cache, retry and telemetry layers.
/// Ctrl-C cancels in-flight work; partial crawl results are still printed.
#[derive(Parser, Debug)]
#[command(name = "outbound")]
#[command(version)]
#[command(about = "Resilient HTTP fetcher and bounded site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print the effective settings
    Check,

    /// Fetch one URL through the pipeline
    Fetch {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Crawl a site from a seed URL
    Crawl {
        #[arg(value_name = "SEED")]
        seed: String,

        /// Maximum pages to fetch (defaults to [crawler] page-budget)
        #[arg(long)]
        budget: Option<usize>,

        /// Maximum fetches in flight (defaults to [crawler] concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print results as JSON lines instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Check => {
            handle_check(&config, &config_hash);
            Ok(())
        }
        Command::Fetch { url } => handle_fetch(&config, &url).await,
        Command::Crawl {
            seed,
            budget,
            concurrency,
            json,
        } => {
            let budget = budget.unwrap_or(config.crawler.page_budget);
            let width = concurrency.unwrap_or(config.crawler.concurrency);
            handle_crawl(&config, &seed, budget, width, json).await
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("outbound=info,warn"),
            1 => EnvFilter::new("outbound=debug,info"),
            2 => EnvFilter::new("outbound=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancels `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight requests");
            token.cancel();
        }
    });
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let cache = Arc::new(ResponseCache::from_config(&config.cache));
    Pipeline::from_config(config, cache).context("Failed to build HTTP pipeline")
}

fn handle_check(config: &Config, hash: &str) {
    println!("=== Outbound Configuration ===\n");

    println!("User Agent: {}", config.user_agent.header_value());

    println!("\nHTTP:");
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms x{} (max {}ms)",
        config.retry.initial_backoff_ms, config.retry.backoff_factor, config.retry.max_backoff_ms
    );
    println!("  Retryable statuses: {:?}", config.retry.retryable_statuses);

    println!("\nCache:");
    println!("  TTL: {}s", config.cache.ttl_secs);
    match config.cache.max_entries {
        Some(max) => println!("  Max entries: {}", max),
        None => println!("  Max entries: unbounded"),
    }

    println!("\nCrawler:");
    println!("  Page budget: {}", config.crawler.page_budget);
    println!("  Concurrency: {}", config.crawler.concurrency);

    println!("\nServices ({}):", config.services.len());
    for (name, service) in &config.services {
        let key = if service.api_key.is_some() { "with key" } else { "no key" };
        println!("  - {} -> {} ({})", name, service.base_url, key);
    }

    println!("\n✓ Configuration is valid (sha256 {})", hash);
}

async fn handle_fetch(config: &Config, url: &str) -> anyhow::Result<()> {
    let url = normalize_url(url).with_context(|| format!("Invalid URL: {}", url))?;
    let pipeline = build_pipeline(config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let envelope = pipeline.send(&RequestDescriptor::get(url.clone()), &cancel).await;

    println!("URL:       {}", url);
    println!("Success:   {}", envelope.is_success());
    println!("Status:    {}", envelope.status());
    println!("Attempts:  {}", envelope.attempts());
    if let Some(ms) = envelope.elapsed_ms() {
        println!("Elapsed:   {}ms", ms);
    }
    if let Some(error) = envelope.error() {
        println!("Error:     {}", error);
    }
    if let Some(body) = envelope.payload() {
        println!("Final URL: {}", body.final_url);
        println!(
            "Type:      {}",
            body.content_type.as_deref().unwrap_or("unknown")
        );
        println!("Bytes:     {}", body.body.len());
    }

    Ok(())
}

async fn handle_crawl(
    config: &Config,
    seed: &str,
    budget: usize,
    width: usize,
    json: bool,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let crawler = Crawler::new(pipeline);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let report = crawler
        .crawl(seed, budget, width, &cancel)
        .await
        .with_context(|| format!("Cannot crawl from {}", seed))?;

    if json {
        print_json(&report)?;
    } else {
        print_table(&report);
    }

    Ok(())
}

/// One line of `crawl --json` output
#[derive(Serialize)]
struct PageSummary<'a> {
    sequence: u64,
    url: &'a str,
    success: bool,
    status: u16,
    error: Option<&'a str>,
    elapsed_ms: Option<u64>,
    attempts: u32,
    title: Option<&'a str>,
    links: Vec<&'a str>,
}

impl<'a> From<&'a CrawlResult> for PageSummary<'a> {
    fn from(result: &'a CrawlResult) -> Self {
        let envelope = result.envelope();
        Self {
            sequence: result.sequence(),
            url: result.url().as_str(),
            success: envelope.is_success(),
            status: envelope.status(),
            error: envelope.error(),
            elapsed_ms: envelope.elapsed_ms(),
            attempts: envelope.attempts(),
            title: result.title(),
            links: result.links().iter().map(|u| u.as_str()).collect(),
        }
    }
}

fn print_json(report: &CrawlReport) -> anyhow::Result<()> {
    let mut results: Vec<&CrawlResult> = report.results.iter().collect();
    results.sort_by_key(|r| r.sequence());

    for result in results {
        println!("{}", serde_json::to_string(&PageSummary::from(result))?);
    }

    let summary = serde_json::json!({
        "status": report.status,
        "dispatched": report.dispatched,
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "elapsed_ms": report.elapsed.as_millis() as u64,
    });
    println!("{}", summary);

    Ok(())
}

fn print_table(report: &CrawlReport) {
    let mut results: Vec<&CrawlResult> = report.results.iter().collect();
    results.sort_by_key(|r| r.sequence());

    for result in results {
        let envelope = result.envelope();
        let outcome = match envelope.error() {
            None => format!("{} ({} links)", envelope.status(), result.links().len()),
            Some(error) => format!("FAILED {}", error),
        };
        println!("{:>4}  {}  {}", result.sequence(), result.url(), outcome);
    }

    println!(
        "\n{}: {} pages ({} ok, {} failed) in {:.2}s",
        report.status,
        report.results.len(),
        report.succeeded(),
        report.failed(),
        report.elapsed.as_secs_f64()
    );
}
