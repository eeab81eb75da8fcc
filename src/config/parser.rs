use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub(crate) fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so a run's output can be matched to the settings that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[crawler]
max-concurrent-requests = 4
request-timeout-secs = 10
connect-timeout-secs = 5

[geocoder]
base-url = "https://nominatim.openstreetmap.org/search.php"
referer = "https://nominatim.openstreetmap.org/ui/search.html"
limit = 1

[retry]
max-attempts = 3
initial-backoff-ms = 100
max-backoff-ms = 1000
multiplier = 2.0
jitter = 0.1
service-unavailable-delay-ms = 500

[proxy]
endpoints = ["http://127.0.0.1:3128"]
rotate-on-rate-limit = true

[output]
input-path = "input.csv"
output-path = "output.csv"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrent_requests, 4);
        assert_eq!(config.geocoder.format, "jsonv2");
        assert_eq!(config.geocoder.limit, Some(1));
        assert!(!config.geocoder.polygon_geojson);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.proxy.rotate_on_rate_limit);
        assert_eq!(config.output.log_path, "detailed_request_logs.txt");
        assert!(config.identity.user_agents_path.is_none());
    }

    #[test]
    fn test_sections_fall_back_to_defaults() {
        let config = parse_config(
            r#"
[geocoder]
base-url = "https://geo.example.com/search"
referer = "https://geo.example.com/"

[proxy]
rotate-on-rate-limit = false

[output]
input-path = "in.csv"
output-path = "out.csv"
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_concurrent_requests, 3);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.proxy.endpoints.is_empty());
    }

    #[test]
    fn test_rotate_on_rate_limit_is_required() {
        let result = parse_config(
            r#"
[geocoder]
base-url = "https://geo.example.com/search"
referer = "https://geo.example.com/"

[proxy]
endpoints = []

[output]
input-path = "in.csv"
output-path = "out.csv"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/geo-ripple.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("max-concurrent-requests = 4", "max-concurrent-requests = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
