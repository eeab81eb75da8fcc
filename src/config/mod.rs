//! Configuration module for Geo-Ripple
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use geo_ripple::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("geo-ripple.toml")).unwrap();
//! println!("Concurrency limit: {}", config.crawler.max_concurrent_requests);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, GeocoderConfig, IdentityConfig, OutputConfig, ProxyConfig, RetryConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
