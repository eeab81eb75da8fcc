//! Geo-Ripple main entry point
//!
//! This is the command-line interface for the Geo-Ripple batch geocoder.

use anyhow::Context;
use clap::Parser;
use geo_ripple::config::{load_config_with_hash, Config};
use geo_ripple::crawler::crawl;
use geo_ripple::output::print_statistics;
use geo_ripple::table::InputTable;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Geo-Ripple: a bounded-concurrency batch geocoder
///
/// Geo-Ripple reads a CSV file with an `address` column, resolves each address
/// against a Nominatim-style service with retries and timing breakdowns, and
/// writes the table back out with `lat_address` and `lon_address` columns.
#[derive(Parser, Debug)]
#[command(name = "geo-ripple")]
#[command(version = "1.0.0")]
#[command(about = "A bounded-concurrency batch geocoder", long_about = None)]
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

    /// Override the input CSV path from the config
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Override the output CSV path from the config
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Override the persistent log file path from the config
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Validate config and input without sending any requests
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);

    setup_logging(cli.verbose, cli.quiet, Path::new(&config.output.log_path))?;
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_crawl(&config).await
    }
}

/// Applies command-line path overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(input) = &cli.input {
        config.output.input_path = input.display().to_string();
    }
    if let Some(output) = &cli.output {
        config.output.output_path = output.display().to_string();
    }
    if let Some(log_file) = &cli.log_file {
        config.output.log_path = log_file.display().to_string();
    }
}

/// Sets up the console and file logging sinks based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, log_path: &Path) -> anyhow::Result<()> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("geo_ripple=info,warn"),
            1 => EnvFilter::new("geo_ripple=debug,info"),
            2 => EnvFilter::new("geo_ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    Ok(())
}

/// Handles the --dry-run mode: shows the effective settings and input size
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Geo-Ripple Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  Connect timeout: {}s", config.crawler.connect_timeout_secs);

    println!("\nGeocoder:");
    println!("  Endpoint: {}", config.geocoder.base_url);
    println!("  Referer: {}", config.geocoder.referer);
    println!("  Format: {}", config.geocoder.format);
    if let Some(limit) = config.geocoder.limit {
        println!("  Limit: {}", limit);
    }
    println!("  Polygon GeoJSON: {}", config.geocoder.polygon_geojson);

    println!("\nRetry Policy:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms x{} up to {}ms (jitter ±{:.0}%)",
        config.retry.initial_backoff_ms,
        config.retry.multiplier,
        config.retry.max_backoff_ms,
        config.retry.jitter * 100.0
    );
    println!(
        "  Service unavailable floor: {}ms",
        config.retry.service_unavailable_delay_ms
    );

    println!("\nIdentity:");
    match &config.identity.user_agents_path {
        Some(path) => println!("  User agents: {}", path),
        None => println!("  User agents: built-in list"),
    }

    println!("\nProxies ({}):", config.proxy.endpoints.len());
    for endpoint in &config.proxy.endpoints {
        println!("  - {}", endpoint);
    }
    println!("  Rotate on rate limit: {}", config.proxy.rotate_on_rate_limit);

    let table = InputTable::read(Path::new(&config.output.input_path))
        .with_context(|| format!("Failed to read input {}", config.output.input_path))?;

    println!("\nInput/Output:");
    println!("  Input: {} ({} rows)", config.output.input_path, table.len());
    println!("  Output: {}", config.output.output_path);
    println!("  Log: {}", config.output.log_path);

    println!("\n✓ Configuration is valid");
    println!("✓ Would geocode {} addresses", table.len());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> anyhow::Result<()> {
    match crawl(config).await {
        Ok(report) => {
            tracing::info!("Crawl completed successfully");
            println!();
            print_statistics(&report.statistics);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
