//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest page and image
//! harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use sumi_harvest::config::{load_config_with_hash, validate_seeds, Config};
use sumi_harvest::crawler::Coordinator;
use sumi_harvest::output::print_statistics;
use sumi_harvest::RunState;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a polite page and image harvester
///
/// Sumi-Harvest crawls outward from a set of seed URLs, records the visible
/// text of every in-scope page and downloads the images they reference,
/// saving the results as a JSON array.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite page and image harvester", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Keep records already present in the output file
    #[arg(long)]
    keep_existing: bool,

    /// Additional seed URL (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if !cli.seeds.is_empty() {
        config.seeds.extend(cli.seeds);
        validate_seeds(&config.seeds).context("invalid --seed")?;
    }
    if cli.keep_existing {
        config.output.keep_existing = true;
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(ExitCode::SUCCESS);
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", crawler.max_workers);
    println!(
        "  Delay: {}s (+ up to {}s jitter)",
        crawler.delay_seconds, crawler.delay_jitter_seconds
    );
    match crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unbounded"),
    }
    println!("  Request timeout: {}s", crawler.timeout_seconds);
    println!("  Max retries: {}", crawler.max_retries);
    if let Some(max_pages) = crawler.max_pages {
        println!("  Max pages: {}", max_pages);
    }
    if let Some(run_timeout) = crawler.run_timeout_seconds {
        println!("  Run timeout: {}s", run_timeout);
    }
    println!(
        "  Abort after {} consecutive failures",
        crawler.max_consecutive_failures
    );
    println!("  Scope: {:?}", crawler.scope);
    for pattern in &crawler.allowed_domains {
        println!("    + {}", pattern);
    }

    println!("\nBackoff:");
    println!("  Multiplier: {}", config.backoff.multiplier);
    println!("  Max delay: {}s", config.backoff.max_delay_seconds);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Records: {}", config.output.data_path);
    println!("  Images: {}", config.output.image_dir);
    println!("  Save interval: {}", config.output.save_interval);
    println!("  Keep existing: {}", config.output.keep_existing);

    println!("\nImages:");
    if config.images.enabled {
        println!("  Max size: {} bytes", config.images.max_bytes);
        println!("  Respect scope: {}", config.images.respect_scope);
    } else {
        println!("  Disabled");
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation; Ctrl-C drains the run gracefully
async fn handle_crawl(config: Config) -> anyhow::Result<ExitCode> {
    tracing::info!(
        "Seeds: {}, workers: {}",
        config.seeds.len(),
        config.crawler.max_workers
    );

    let coordinator = Coordinator::new(config);
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            cancel.cancel();
        }
    });

    let report = coordinator.run().await.context("crawl failed to start")?;

    println!();
    print_statistics(&report.statistics);
    println!(
        "\nRun {} ({}) in {:.1}s, {} records saved",
        report.state,
        report.stop_reason,
        report.elapsed.as_secs_f64(),
        report.records_persisted
    );

    Ok(match report.state {
        RunState::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    })
}
