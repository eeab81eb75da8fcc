//! Geo-Ripple: a bounded-concurrency batch geocoding crawler
//!
//! This crate resolves a list of free-text addresses to coordinates by issuing
//! rate-limited lookups against a Nominatim-style geocoding service, timing each
//! request phase, retrying transient failures with backoff, and collecting the
//! results into a table indexed by input position.

pub mod config;
pub mod crawler;
pub mod output;
pub mod session;
pub mod table;

use thiserror::Error;

/// Main error type for Geo-Ripple operations
///
/// Only these errors abort a crawl. Per-address failures are reported through
/// [`crawler::LookupError`] and never escape the task that produced them.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid proxy endpoint '{endpoint}': {message}")]
    InvalidProxy { endpoint: String, message: String },

    #[error("Identity pool is empty")]
    EmptyIdentityPool,

    #[error("Input table has no '{0}' column")]
    MissingColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Geo-Ripple operations
pub type Result<T> = std::result::Result<T, GeoError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, GeocodeCandidate, PhaseTimings};
pub use table::{AddressRecord, GeocodeRow, ResultSlot};
