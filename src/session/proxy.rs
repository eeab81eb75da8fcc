use crate::GeoError;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use url::Url;

/// A validated egress proxy address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint(Url);

impl ProxyEndpoint {
    /// Parses a proxy URL such as `http://10.0.0.1:3128`
    pub fn parse(endpoint: &str) -> Result<Self, GeoError> {
        let url = Url::parse(endpoint).map_err(|e| GeoError::InvalidProxy {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        if url.host_str().is_none() {
            return Err(GeoError::InvalidProxy {
                endpoint: endpoint.to_string(),
                message: "missing host".to_string(),
            });
        }

        Ok(Self(url))
    }

    /// The proxy URL as a string
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered proxy list with a rotation cursor
///
/// The cursor only moves through [`ProxyRegistry::rotate`] and is always read and
/// written under its mutex.
#[derive(Debug)]
pub struct ProxyRegistry {
    endpoints: Vec<ProxyEndpoint>,
    cursor: Mutex<usize>,
    rotate_on_rate_limit: bool,
}

impl ProxyRegistry {
    /// Creates a registry from already-parsed endpoints
    pub fn new(endpoints: Vec<ProxyEndpoint>, rotate_on_rate_limit: bool) -> Self {
        Self {
            endpoints,
            cursor: Mutex::new(0),
            rotate_on_rate_limit,
        }
    }

    /// Parses every endpoint string and builds a registry
    pub fn from_strings(endpoints: &[String], rotate_on_rate_limit: bool) -> Result<Self, GeoError> {
        let parsed = endpoints
            .iter()
            .map(|e| ProxyEndpoint::parse(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(parsed, rotate_on_rate_limit))
    }

    /// A registry without proxies; requests go out directly
    pub fn direct() -> Self {
        Self::new(Vec::new(), false)
    }

    /// The proxy under the cursor, or `None` for direct connections
    pub fn current(&self) -> Option<ProxyEndpoint> {
        let cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        self.endpoints.get(*cursor).cloned()
    }

    /// Advances the cursor to the next proxy, wrapping around
    ///
    /// # Returns
    ///
    /// The newly selected proxy, or `None` when the registry is empty
    pub fn rotate(&self) -> Option<ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        *cursor = (*cursor + 1) % self.endpoints.len();
        let next = self.endpoints[*cursor].clone();
        tracing::info!("Proxy changed to {}", next);
        Some(next)
    }

    /// Whether HTTP 429 responses should trigger [`ProxyRegistry::rotate`]
    pub fn rotate_on_rate_limit(&self) -> bool {
        self.rotate_on_rate_limit
    }

    /// Number of configured proxies
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when requests go out without a proxy
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
