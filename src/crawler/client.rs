//! Phased HTTP client for geocoding lookups
//!
//! This module handles the HTTP side of a single lookup attempt:
//! - Building clients with the session identity and optional proxy
//! - Timing each request phase (see [`Phase`])
//! - Classifying failures into retryable and terminal kinds
//! - Reading the first candidate of the service's JSON result list

use crate::config::{CrawlerConfig, GeocoderConfig};
use crate::crawler::timings::{Phase, PhaseTimer, PhaseTimings};
use crate::session::ProxyEndpoint;
use crate::{ConfigError, GeoError};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::{Client, Method, Proxy, Request, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// One coordinate pair returned by the geocoding service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeCandidate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parsed payload and timings of one successful attempt
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// First candidate of the result list; `None` when nothing matched
    pub candidate: Option<GeocodeCandidate>,

    /// Timings of this attempt only
    pub timings: PhaseTimings,
}

/// Failure of a single lookup attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited (HTTP 429)")]
    RateLimited,

    #[error("Service unavailable (HTTP 503)")]
    ServiceUnavailable,

    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Failed to bind proxy {proxy}: {message}")]
    ProxyBinding { proxy: String, message: String },
}

impl FetchError {
    /// Whether another attempt may succeed
    ///
    /// | Error | Retried |
    /// |-------|---------|
    /// | Timeout | yes |
    /// | HTTP 429 | yes |
    /// | HTTP 503 | yes |
    /// | Other status, connect, malformed body | no |
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout | FetchError::RateLimited | FetchError::ServiceUnavailable
        )
    }

    /// Short label used to group errors in statistics
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::RateLimited => "rate_limited",
            FetchError::ServiceUnavailable => "service_unavailable",
            FetchError::Status { .. } => "http_status",
            FetchError::Connect(_) => "connect",
            FetchError::Transport(_) => "transport",
            FetchError::Malformed(_) => "malformed_response",
            FetchError::ProxyBinding { .. } => "proxy_binding",
        }
    }

    /// Maps a non-success status code to its error kind
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
            StatusCode::SERVICE_UNAVAILABLE => FetchError::ServiceUnavailable,
            other => FetchError::Status {
                status: other.as_u16(),
            },
        }
    }

    /// Classifies a transport-level reqwest error
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_connect() {
            FetchError::Connect(error.to_string())
        } else if let Some(status) = error.status() {
            FetchError::from_status(status)
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}

/// Executes one geocoding attempt
///
/// The retry controller and orchestrator are generic over this trait so tests can
/// substitute instrumented implementations.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn fetch(
        &self,
        address: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Builds an HTTP client with the crawler's timeouts
///
/// # Arguments
///
/// * `config` - The crawler configuration (timeouts)
/// * `proxy` - Egress proxy; `None` disables proxies entirely, including ones from the environment
pub fn build_http_client(
    config: &CrawlerConfig,
    proxy: Option<&ProxyEndpoint>,
) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true);

    let builder = match proxy {
        Some(proxy) => builder.proxy(Proxy::all(proxy.as_str())?),
        None => builder.no_proxy(),
    };

    builder.build()
}

/// HTTP geocoding client that records per-phase timings
///
/// Identity and referer are fixed for the client's lifetime. One underlying
/// `reqwest::Client` is kept per proxy so connection pools are reused.
pub struct PhasedClient {
    endpoint: Url,
    format: String,
    limit: Option<u32>,
    polygon_geojson: bool,
    identity: HeaderValue,
    referer: HeaderValue,
    crawler: CrawlerConfig,
    direct: Client,
    proxied: Mutex<HashMap<ProxyEndpoint, Client>>,
}

impl PhasedClient {
    /// Creates a client for the configured endpoint using `identity` as user agent
    pub fn new(
        crawler: &CrawlerConfig,
        geocoder: &GeocoderConfig,
        identity: &str,
    ) -> Result<Self, GeoError> {
        let endpoint = Url::parse(&geocoder.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;
        let identity = HeaderValue::from_str(identity).map_err(|_| {
            ConfigError::Validation(format!("Identity '{}' is not a valid header value", identity))
        })?;
        let referer = HeaderValue::from_str(&geocoder.referer).map_err(|_| {
            ConfigError::Validation(format!(
                "Referer '{}' is not a valid header value",
                geocoder.referer
            ))
        })?;

        Ok(Self {
            endpoint,
            format: geocoder.format.clone(),
            limit: geocoder.limit,
            polygon_geojson: geocoder.polygon_geojson,
            identity,
            referer,
            direct: build_http_client(crawler, None)?,
            crawler: crawler.clone(),
            proxied: Mutex::new(HashMap::new()),
        })
    }

    /// Full lookup URL for `address`, with the address URL-encoded
    pub fn lookup_url(&self, address: &str) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", address);
            query.append_pair("format", &self.format);
            if let Some(limit) = self.limit {
                query.append_pair("limit", &limit.to_string());
            }
            if self.polygon_geojson {
                query.append_pair("polygon_geojson", "1");
            }
        }
        url
    }

    fn prepare_request(&self, address: &str) -> Request {
        let mut request = Request::new(Method::GET, self.lookup_url(address));
        let headers = request.headers_mut();
        headers.insert(USER_AGENT, self.identity.clone());
        headers.insert(REFERER, self.referer.clone());
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        request
    }

    /// Returns the client bound to `proxy`, building it on first use
    fn bind_proxy(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, FetchError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.crawler, Some(proxy)).map_err(|e| {
            FetchError::ProxyBinding {
                proxy: proxy.to_string(),
                message: e.to_string(),
            }
        })?;
        proxied.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Geocoder for PhasedClient {
    async fn fetch(
        &self,
        address: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut timer = PhaseTimer::start();

        let request = self.prepare_request(address);
        tracing::info!("Request URL: {}", request.url());
        timer.lap(Phase::Preparation);

        let client = self.bind_proxy(proxy)?;
        timer.lap(Phase::ProxyBinding);

        let mut response = client
            .execute(request)
            .await
            .map_err(FetchError::from_reqwest)?;
        timer.lap(Phase::Transport);

        let status = response.status();
        if !status.is_success() {
            if let Some(proxy) = proxy {
                tracing::info!("Proxy used: {}", proxy);
            }
            tracing::info!(
                "Timing details for {} (HTTP {}): {}",
                address,
                status.as_u16(),
                timer.timings()
            );
            return Err(FetchError::from_status(status));
        }

        let mut body = match response.chunk().await.map_err(FetchError::from_reqwest)? {
            Some(first) => first.to_vec(),
            None => Vec::new(),
        };
        timer.lap(Phase::TimeToFirstByte);

        while let Some(chunk) = response.chunk().await.map_err(FetchError::from_reqwest)? {
            body.extend_from_slice(&chunk);
        }
        timer.lap(Phase::ContentDownload);

        let timings = timer.finish();
        if let Some(proxy) = proxy {
            tracing::info!("Proxy used: {}", proxy);
        }
        tracing::info!("Timing details for {}: {}", address, timings);

        let candidate = parse_first_candidate(&body)?;
        Ok(FetchOutcome { candidate, timings })
    }
}

/// Coordinates arrive as numeric strings; plain numbers are accepted too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCoordinate {
    Text(String),
    Number(f64),
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    lat: RawCoordinate,
    lon: RawCoordinate,
}

fn parse_coordinate(raw: &RawCoordinate, field: &str) -> Result<f64, FetchError> {
    let value = match raw {
        RawCoordinate::Number(n) => *n,
        RawCoordinate::Text(s) => s.trim().parse::<f64>().map_err(|_| {
            FetchError::Malformed(format!("{} '{}' is not a number", field, s))
        })?,
    };

    if !value.is_finite() {
        return Err(FetchError::Malformed(format!("{} is not finite", field)));
    }

    Ok(value)
}

/// Parses the first element of the service's JSON result array
///
/// Elements after the first are not inspected.
///
/// # Returns
///
/// * `Ok(None)` - The service found no match
/// * `Err(FetchError::Malformed)` - Body is not a JSON array, or its first element
///   lacks a numeric `lat`/`lon`
pub fn parse_first_candidate(body: &[u8]) -> Result<Option<GeocodeCandidate>, FetchError> {
    let results: Vec<serde_json::Value> =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let Some(first) = results.into_iter().next() else {
        return Ok(None);
    };

    let raw = RawCandidate::deserialize(first)
        .map_err(|e| FetchError::Malformed(format!("first result: {}", e)))?;

    Ok(Some(GeocodeCandidate {
        latitude: parse_coordinate(&raw.lat, "lat")?,
        longitude: parse_coordinate(&raw.lon, "lon")?,
    }))
}
