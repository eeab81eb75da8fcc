use crate::config::types::{Config, CrawlerConfig, GeocoderConfig, OutputConfig, ProxyConfig, RetryConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_geocoder_config(&config.geocoder)?;
    validate_retry_config(&config.retry)?;
    validate_proxy_config(&config.proxy)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.request_timeout_secs
    {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be between 1 and request_timeout_secs ({}), got {}",
            config.request_timeout_secs, config.connect_timeout_secs
        )));
    }

    Ok(())
}

/// Validates geocoder endpoint configuration
fn validate_geocoder_config(config: &GeocoderConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.query().is_some() {
        return Err(ConfigError::Validation(format!(
            "base_url '{}' must not carry a query string",
            config.base_url
        )));
    }

    Url::parse(&config.referer)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid referer: {}", e)))?;

    if config.format.trim().is_empty() {
        return Err(ConfigError::Validation("format cannot be empty".to_string()));
    }

    if config.limit == Some(0) {
        return Err(ConfigError::Validation(
            "limit must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the retry policy
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.max_backoff_ms < config.initial_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
            config.max_backoff_ms, config.initial_backoff_ms
        )));
    }

    if !config.multiplier.is_finite() || config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "multiplier must be >= 1.0, got {}",
            config.multiplier
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be between 0.0 and 1.0, got {}",
            config.jitter
        )));
    }

    Ok(())
}

/// Validates proxy endpoints
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for endpoint in &config.endpoints {
        validate_proxy_endpoint(endpoint)?;
    }

    if config.rotate_on_rate_limit && config.endpoints.len() < 2 {
        tracing::warn!(
            "rotate-on-rate-limit is enabled but only {} proxy endpoint(s) are configured",
            config.endpoints.len()
        );
    }

    Ok(())
}

/// Validates a single proxy URL
fn validate_proxy_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid proxy endpoint '{}': {}", endpoint, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "Proxy endpoint '{}' has unsupported scheme '{}'",
            endpoint,
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Proxy endpoint '{}' has no host",
            endpoint
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.input_path.is_empty() {
        return Err(ConfigError::Validation(
            "input_path cannot be empty".to_string(),
        ));
    }

    if config.output_path.is_empty() {
        return Err(ConfigError::Validation(
            "output_path cannot be empty".to_string(),
        ));
    }

    if config.input_path == config.output_path {
        return Err(ConfigError::Validation(format!(
            "output_path must differ from input_path ('{}')",
            config.input_path
        )));
    }

    if config.log_path.is_empty() {
        return Err(ConfigError::Validation("log_path cannot be empty".to_string()));
    }

    Ok(())
}
