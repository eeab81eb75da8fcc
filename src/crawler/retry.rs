//! Retry controller around single geocoding attempts
//!
//! Transient failures (timeouts, HTTP 429, HTTP 503) are retried in a loop with
//! exponential backoff and jitter until the attempt budget runs out. Anything else
//! ends the lookup immediately.

use crate::config::RetryConfig;
use crate::crawler::client::{FetchError, GeocodeCandidate, Geocoder};
use crate::crawler::timings::PhaseTimings;
use crate::session::ProxyRegistry;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a lookup for one address
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("gave up after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: FetchError },

    #[error("failed after {attempts} attempt(s): {source}")]
    Fatal {
        attempts: u32,
        #[source]
        source: FetchError,
    },
}

impl LookupError {
    /// Attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            LookupError::Exhausted { attempts, .. } | LookupError::Fatal { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The error of the final attempt
    pub fn last_error(&self) -> &FetchError {
        match self {
            LookupError::Exhausted { last, .. } => last,
            LookupError::Fatal { source, .. } => source,
        }
    }
}

/// Successful lookup of one address
#[derive(Debug, Clone)]
pub struct Lookup {
    /// First candidate returned; `None` when the service found no match
    pub candidate: Option<GeocodeCandidate>,

    /// Attempts made, including the successful one
    pub attempts: u32,

    /// Timings of the successful attempt
    pub timings: PhaseTimings,
}

/// Backoff schedule for retryable failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: f64,
    pub service_unavailable_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
            service_unavailable_delay: Duration::from_millis(config.service_unavailable_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), without jitter
    ///
    /// Grows as `initial * multiplier^(retry - 1)` and is capped at `max_backoff`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `retry` after `error`, with jitter applied
    ///
    /// HTTP 503 waits at least `service_unavailable_delay`.
    pub fn delay_for<R: Rng + ?Sized>(&self, retry: u32, error: &FetchError, rng: &mut R) -> Duration {
        let base = self.base_delay(retry);
        let delay = if self.jitter > 0.0 && !base.is_zero() {
            let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
            base.mul_f64(factor.max(0.0))
        } else {
            base
        };

        match error {
            FetchError::ServiceUnavailable => delay.max(self.service_unavailable_delay),
            _ => delay,
        }
    }
}

/// Applies the retry policy around a [`Geocoder`]
pub struct RetryController<G> {
    geocoder: G,
    proxies: Arc<ProxyRegistry>,
    policy: RetryPolicy,
}

impl<G: Geocoder> RetryController<G> {
    pub fn new(geocoder: G, proxies: Arc<ProxyRegistry>, policy: RetryPolicy) -> Self {
        Self {
            geocoder,
            proxies,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn proxies(&self) -> &ProxyRegistry {
        &self.proxies
    }

    /// Looks up `address`, retrying transient failures
    ///
    /// # Returns
    ///
    /// * `Ok(Lookup)` - An attempt succeeded (the candidate list may be empty)
    /// * `Err(LookupError::Exhausted)` - Every attempt failed with a retryable error
    /// * `Err(LookupError::Fatal)` - An attempt failed with a non-retryable error
    pub async fn lookup(&self, address: &str) -> Result<Lookup, LookupError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let proxy = self.proxies.current();
            match &proxy {
                Some(proxy) => tracing::info!(
                    "Requesting data for address: {} using proxy {} (attempt {}/{})",
                    address,
                    proxy,
                    attempt,
                    self.policy.max_attempts
                ),
                None => tracing::info!(
                    "Requesting data for address: {} (attempt {}/{})",
                    address,
                    attempt,
                    self.policy.max_attempts
                ),
            }

            let error = match self.geocoder.fetch(address, proxy.as_ref()).await {
                Ok(outcome) => {
                    tracing::info!(
                        "Response received for {} in {:.2} seconds",
                        address,
                        outcome.timings.total().as_secs_f64()
                    );
                    return Ok(Lookup {
                        candidate: outcome.candidate,
                        attempts: attempt,
                        timings: outcome.timings,
                    });
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::error!("Request failed for {}: {}", address, error);
                return Err(LookupError::Fatal {
                    attempts: attempt,
                    source: error,
                });
            }

            if attempt >= self.policy.max_attempts {
                return Err(LookupError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            match error {
                FetchError::RateLimited if self.proxies.rotate_on_rate_limit() => {
                    tracing::info!("Rate limit exceeded for {}, changing proxy", address);
                    self.proxies.rotate();
                }
                FetchError::RateLimited => {
                    tracing::info!("Rate limit exceeded for {}", address);
                }
                _ => {}
            }

            let delay = {
                let mut rng = rand::thread_rng();
                self.policy.delay_for(attempt, &error, &mut rng)
            };
            tracing::warn!(
                "{} for {}. Retrying in {:.2}s ({}/{})",
                error,
                address,
                delay.as_secs_f64(),
                attempt,
                self.policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}
