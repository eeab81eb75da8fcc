//! Crawl statistics
//!
//! Counts per outcome, attempt totals, and mean phase timings, collected while
//! tasks complete and printed once the crawl ends.

use crate::crawler::{LookupError, Phase, PhaseTimings};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Addresses submitted
    pub total_addresses: u64,

    /// Addresses with coordinates recorded
    pub resolved: u64,

    /// Addresses the service answered with an empty list
    pub no_match: u64,

    /// Addresses that ended in a terminal error
    pub failed: u64,

    /// Attempts across all addresses, retries included
    pub total_attempts: u64,

    /// Terminal errors grouped by kind
    pub errors_by_kind: BTreeMap<&'static str, u64>,

    /// Summed duration and sample count per phase, from successful attempts
    phase_totals: BTreeMap<&'static str, (Duration, u64)>,
}

impl CrawlStatistics {
    pub fn new(total_addresses: u64) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            total_addresses,
            resolved: 0,
            no_match: 0,
            failed: 0,
            total_attempts: 0,
            errors_by_kind: BTreeMap::new(),
            phase_totals: BTreeMap::new(),
        }
    }

    /// Addresses that have finished, whatever the outcome
    pub fn completed(&self) -> u64 {
        self.resolved + self.no_match + self.failed
    }

    /// Mean duration of `phase` over successful attempts
    pub fn mean_phase(&self, phase: Phase) -> Option<Duration> {
        self.phase_totals
            .get(phase.as_str())
            .filter(|(_, samples)| *samples > 0)
            .map(|(total, samples)| *total / *samples as u32)
    }

    /// Wall-clock duration of the run, once finished
    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }

    fn add_timings(&mut self, timings: &PhaseTimings) {
        for (phase, duration) in timings.iter() {
            let entry = self
                .phase_totals
                .entry(phase.as_str())
                .or_insert((Duration::ZERO, 0));
            entry.0 += duration;
            entry.1 += 1;
        }
    }
}

/// Thread-safe collector shared by lookup tasks
#[derive(Debug)]
pub struct StatsCollector {
    inner: Mutex<CrawlStatistics>,
}

impl StatsCollector {
    pub fn new(total_addresses: u64) -> Self {
        Self {
            inner: Mutex::new(CrawlStatistics::new(total_addresses)),
        }
    }

    fn update<T>(&self, f: impl FnOnce(&mut CrawlStatistics) -> T) -> T {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats)
    }

    /// Records a successful lookup and returns the completed count
    pub fn record_success(&self, attempts: u32, timings: &PhaseTimings, matched: bool) -> u64 {
        self.update(|stats| {
            if matched {
                stats.resolved += 1;
            } else {
                stats.no_match += 1;
            }
            stats.total_attempts += attempts as u64;
            stats.add_timings(timings);
            stats.completed()
        })
    }

    /// Records a terminal failure and returns the completed count
    pub fn record_failure(&self, error: &LookupError) -> u64 {
        self.update(|stats| {
            stats.failed += 1;
            stats.total_attempts += error.attempts() as u64;
            *stats
                .errors_by_kind
                .entry(error.last_error().kind())
                .or_insert(0) += 1;
            stats.completed()
        })
    }

    /// Stamps the finish time and returns the final statistics
    pub fn finish(&self) -> CrawlStatistics {
        self.update(|stats| {
            stats.finished_at = Some(Utc::now());
            stats.clone()
        })
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Geocoding Statistics ===\n");

    println!("Overview:");
    println!("  Addresses: {}", stats.total_addresses);
    println!("  Resolved: {}", stats.resolved);
    println!("  No match: {}", stats.no_match);
    println!("  Failed: {}", stats.failed);
    println!("  Attempts: {}", stats.total_attempts);
    if let Some(seconds) = stats.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!();

    if !stats.errors_by_kind.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.errors_by_kind.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (kind, count) in error_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    println!("Mean Phase Timings:");
    for phase in Phase::ALL {
        match stats.mean_phase(phase) {
            Some(mean) => println!("  {}: {:.4}s", phase, mean.as_secs_f64()),
            None => println!("  {}: n/a", phase),
        }
    }
    println!();

    let success_rate = if stats.total_addresses > 0 {
        (stats.resolved as f64 / stats.total_addresses as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} addresses geocoded)",
        success_rate, stats.resolved, stats.total_addresses
    );
}
