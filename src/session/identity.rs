//! Client identity selection
//!
//! Identities are user-agent strings. The pool is read once; a crawler session picks
//! one at random and keeps it for every request it sends.

use crate::GeoError;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

/// Identities used when no user-agent file is configured
pub const DEFAULT_IDENTITIES: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Ordered sequence of client identity strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPool {
    identities: Vec<String>,
}

impl IdentityPool {
    /// Builds a pool from newline-delimited text
    ///
    /// Lines are trimmed and blank lines are skipped.
    ///
    /// # Returns
    ///
    /// * `Ok(IdentityPool)` - At least one identity was found
    /// * `Err(GeoError::EmptyIdentityPool)` - The text held no identities
    pub fn parse(content: &str) -> Result<Self, GeoError> {
        let identities: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if identities.is_empty() {
            return Err(GeoError::EmptyIdentityPool);
        }

        Ok(Self { identities })
    }

    /// Reads a newline-delimited identity file
    pub fn load(path: &Path) -> Result<Self, GeoError> {
        let content = std::fs::read_to_string(path)?;
        let pool = Self::parse(&content)?;
        tracing::debug!("Loaded {} identities from {}", pool.len(), path.display());
        Ok(pool)
    }

    /// Loads from `path` when given, otherwise falls back to [`DEFAULT_IDENTITIES`]
    pub fn from_optional_path(path: Option<&Path>) -> Result<Self, GeoError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Picks one identity uniformly at random
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        // parse() guarantees at least one entry
        self.identities
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Picks the identity for a new session using the thread-local generator
    pub fn choose_for_session(&self) -> String {
        self.choose(&mut rand::thread_rng()).to_string()
    }

    /// Number of identities in the pool
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Always false for a constructed pool
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self {
            identities: DEFAULT_IDENTITIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
