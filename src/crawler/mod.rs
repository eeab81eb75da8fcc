//! Crawler module for batch geocoding
//!
//! This module contains the core crawling logic, including:
//! - Phased HTTP lookups with per-phase timings
//! - Retry with exponential backoff and optional proxy rotation
//! - Admission control bounding concurrent lookups
//! - Concurrent-safe result aggregation
//! - Overall crawl coordination

mod admission;
mod aggregator;
mod client;
mod coordinator;
mod retry;
mod timings;

pub use admission::AdmissionController;
pub use aggregator::ResultAggregator;
pub use client::{
    build_http_client, parse_first_candidate, FetchError, FetchOutcome, GeocodeCandidate, Geocoder,
    PhasedClient,
};
pub use coordinator::{run_crawl, Coordinator, CrawlReport};
pub use retry::{Lookup, LookupError, RetryController, RetryPolicy};
pub use timings::{Phase, PhaseTimings};

use crate::config::Config;
use crate::GeoError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Read the input table
/// 2. Pick the session identity and build the HTTP client
/// 3. Geocode every address under the concurrency limit
/// 4. Write the output table
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed; individual addresses may still have failed
/// * `Err(GeoError)` - Input/output or setup failure
pub async fn crawl(config: &Config) -> Result<CrawlReport, GeoError> {
    run_crawl(config).await
}
