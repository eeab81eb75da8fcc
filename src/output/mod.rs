//! Output module for crawl reporting
//!
//! This module handles:
//! - Collecting per-address outcomes while tasks complete
//! - Printing the final statistics summary

pub mod stats;

pub use stats::{print_statistics, CrawlStatistics, StatsCollector};
