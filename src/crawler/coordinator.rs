//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives a batch:
//! - Choosing the session identity and building the proxy registry
//! - Submitting one lookup task per address through the admission controller
//! - Recording results and isolating per-address failures
//! - Joining all tasks and producing the output table

use crate::config::Config;
use crate::crawler::admission::AdmissionController;
use crate::crawler::aggregator::ResultAggregator;
use crate::crawler::client::{Geocoder, PhasedClient};
use crate::crawler::retry::{RetryController, RetryPolicy};
use crate::output::{CrawlStatistics, StatsCollector};
use crate::session::{IdentityPool, ProxyRegistry};
use crate::table::{AddressRecord, GeocodeRow, InputTable};
use crate::GeoError;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Progress is logged every this many completed addresses
const PROGRESS_INTERVAL: u64 = 10;

/// Result of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// One row per input address, in input order
    pub rows: Vec<GeocodeRow>,
    pub statistics: CrawlStatistics,
}

/// Main crawler coordinator structure
///
/// Holds the immutable session (identity, endpoint, retry policy) and the
/// proxy registry. Per-run state lives in [`Coordinator::run`].
pub struct Coordinator<G = PhasedClient> {
    retry: Arc<RetryController<G>>,
    max_concurrent: usize,
    identity: Option<String>,
}

impl Coordinator<PhasedClient> {
    /// Creates a coordinator with a fresh session
    ///
    /// A random identity is chosen from the pool here and kept for every request.
    pub fn new(config: &Config) -> Result<Self, GeoError> {
        let pool = IdentityPool::from_optional_path(
            config.identity.user_agents_path.as_deref().map(Path::new),
        )?;
        let identity = pool.choose_for_session();
        tracing::info!("Session identity: {}", identity);

        let proxies = ProxyRegistry::from_strings(
            &config.proxy.endpoints,
            config.proxy.rotate_on_rate_limit,
        )?;
        tracing::info!(
            "Proxies: {}, rotate on rate limit: {}",
            proxies.len(),
            proxies.rotate_on_rate_limit()
        );

        let client = PhasedClient::new(&config.crawler, &config.geocoder, &identity)?;

        let mut coordinator = Self::with_geocoder(
            client,
            Arc::new(proxies),
            RetryPolicy::from(&config.retry),
            config.crawler.max_concurrent_requests as usize,
        );
        coordinator.identity = Some(identity);
        Ok(coordinator)
    }
}

impl<G: Geocoder + 'static> Coordinator<G> {
    /// Creates a coordinator around any [`Geocoder`]
    pub fn with_geocoder(
        geocoder: G,
        proxies: Arc<ProxyRegistry>,
        policy: RetryPolicy,
        max_concurrent: usize,
    ) -> Self {
        Self {
            retry: Arc::new(RetryController::new(geocoder, proxies, policy)),
            max_concurrent: max_concurrent.max(1),
            identity: None,
        }
    }

    /// The identity chosen for this session, if built from configuration
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Geocodes every address and returns the merged table
    ///
    /// Per-address failures are logged and leave that row unset; they never fail
    /// the batch.
    pub async fn run(&self, addresses: Vec<AddressRecord>) -> Result<CrawlReport, GeoError> {
        let start_time = Instant::now();
        tracing::info!(
            "Starting crawl of {} addresses with concurrency limit {}",
            addresses.len(),
            self.max_concurrent
        );

        let aggregator = Arc::new(ResultAggregator::new(addresses.len()));
        let stats = Arc::new(StatsCollector::new(addresses.len() as u64));
        let mut admission = AdmissionController::new(self.max_concurrent);

        for record in &addresses {
            admission
                .submit(process_address(
                    self.retry.clone(),
                    record.clone(),
                    aggregator.clone(),
                    stats.clone(),
                ))
                .await;
        }

        admission.await_all().await;

        let statistics = stats.finish();
        tracing::info!(
            "Crawl completed: {} resolved, {} no match, {} failed in {:?}",
            statistics.resolved,
            statistics.no_match,
            statistics.failed,
            start_time.elapsed()
        );

        Ok(CrawlReport {
            rows: aggregator.rows(&addresses),
            statistics,
        })
    }
}

/// Looks up one address and records the outcome
///
/// This is the per-address failure boundary: every error ends here.
async fn process_address<G: Geocoder>(
    retry: Arc<RetryController<G>>,
    record: AddressRecord,
    aggregator: Arc<ResultAggregator>,
    stats: Arc<StatsCollector>,
) {
    let start_time = Instant::now();

    let completed = match retry.lookup(&record.text).await {
        Ok(lookup) => {
            let first = lookup.candidate.as_ref();
            aggregator.record(record.index, first);

            match first {
                Some(candidate) => tracing::info!(
                    "Processed {}: Latitude = {}, Longitude = {} in {:.2} seconds with detailed timings {}",
                    record.text,
                    candidate.latitude,
                    candidate.longitude,
                    start_time.elapsed().as_secs_f64(),
                    lookup.timings
                ),
                None => tracing::info!("No match for {}", record.text),
            }

            stats.record_success(lookup.attempts, &lookup.timings, first.is_some())
        }
        Err(e) => {
            tracing::error!(
                "Error processing address {} after {} attempt(s): {}",
                record.text,
                e.attempts(),
                e
            );
            stats.record_failure(&e)
        }
    };

    if completed % PROGRESS_INTERVAL == 0 {
        tracing::info!("Progress: {} addresses processed", completed);
    }
}

/// Runs the main crawl operation
///
/// 1. Read the input CSV
/// 2. Build the coordinator (identity, proxies, client)
/// 3. Geocode every address
/// 4. Write the output CSV
///
/// # Example
///
/// ```no_run
/// use geo_ripple::config::load_config;
/// use geo_ripple::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("geo-ripple.toml"))?;
/// let report = run_crawl(&config).await?;
/// println!("{} addresses resolved", report.statistics.resolved);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: &Config) -> Result<CrawlReport, GeoError> {
    let table = InputTable::read(Path::new(&config.output.input_path))?;
    tracing::info!(
        "Read {} rows from {}",
        table.len(),
        config.output.input_path
    );

    let coordinator = Coordinator::new(config)?;
    let report = coordinator.run(table.addresses()).await?;

    table.write_geocoded(Path::new(&config.output.output_path), &report.rows)?;
    tracing::info!("Wrote results to {}", config.output.output_path);

    Ok(report)
}
