use serde::Deserialize;

/// Main configuration structure for Geo-Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    pub proxy: ProxyConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of geocoding requests in flight at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 3,
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// Geocoding endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    /// Search endpoint, without query string
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Fixed referer header sent with every request
    pub referer: String,

    /// Value of the `format` query parameter
    #[serde(default = "default_format")]
    pub format: String,

    /// Value of the `limit` query parameter, omitted when unset
    #[serde(default)]
    pub limit: Option<u32>,

    /// Sends `polygon_geojson=1` when enabled
    #[serde(rename = "polygon-geojson", default)]
    pub polygon_geojson: bool,
}

fn default_format() -> String {
    "jsonv2".to_string()
}

/// Retry and backoff policy for transient lookup failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per address, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,

    /// Growth factor applied per retry
    pub multiplier: f64,

    /// Random spread applied to each delay, as a fraction of it
    pub jitter: f64,

    /// Minimum delay after an HTTP 503 (milliseconds)
    #[serde(rename = "service-unavailable-delay-ms")]
    pub service_unavailable_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
            service_unavailable_delay_ms: 10_000,
        }
    }
}

/// Client identity configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Newline-delimited list of user agents; the built-in list is used when unset
    #[serde(rename = "user-agents-path", default)]
    pub user_agents_path: Option<String>,
}

/// Egress proxy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Proxy URLs, tried in order; empty means direct connections
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Advance to the next proxy whenever the service answers HTTP 429.
    /// Deliberately has no default and must be set explicitly.
    #[serde(rename = "rotate-on-rate-limit")]
    pub rotate_on_rate_limit: bool,
}

/// Input/output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// CSV file with an `address` column
    #[serde(rename = "input-path")]
    pub input_path: String,

    /// CSV file receiving the geocoded table
    #[serde(rename = "output-path")]
    pub output_path: String,

    /// Persistent log sink
    #[serde(rename = "log-path", default = "default_log_path")]
    pub log_path: String,
}

fn default_log_path() -> String {
    "detailed_request_logs.txt".to_string()
}
