//! Runtime configuration for the price cache and swap executor
//!
//! Defaults come from [`crate::constants`]. `from_env` layers optional
//! environment overrides on top.

use crate::constants::{
    CACHE_TIME_SECS, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRY_ATTEMPTS, PRICES_URL,
    REQUEST_TIMEOUT_SECS, SIMULATED_EXECUTION_DELAY_MS, STALE_THRESHOLD_SECS,
};
use std::time::Duration;

/// Overrides the price list URL
pub const ENV_PRICES_URL: &str = "SWAP_PRICES_URL";

/// Overrides the stale threshold (seconds)
pub const ENV_STALE_SECS: &str = "SWAP_PRICE_STALE_SECS";

/// Overrides the maximum number of fetch attempts
pub const ENV_MAX_ATTEMPTS: &str = "SWAP_PRICE_MAX_ATTEMPTS";

/// Exponential backoff policy for price fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

/// Price cache configuration
#[derive(Debug, Clone)]
pub struct PriceCacheConfig {
    /// Price list endpoint used by the HTTP source
    pub prices_url: String,
    /// Age after which a snapshot must be refreshed before use
    pub stale_threshold: Duration,
    /// Age after which a snapshot is dropped entirely
    pub cache_time: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Retry policy for failed fetches
    pub retry: RetryPolicy,
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            prices_url: PRICES_URL.to_string(),
            stale_threshold: Duration::from_secs(STALE_THRESHOLD_SECS),
            cache_time: Duration::from_secs(CACHE_TIME_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl PriceCacheConfig {
    /// Builds a config from defaults plus any environment overrides
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_PRICES_URL) {
            config.prices_url = url;
        }

        if let Some(secs) = read_env::<u64>(ENV_STALE_SECS) {
            config.stale_threshold = Duration::from_secs(secs);
        }

        if let Some(attempts) = read_env::<u32>(ENV_MAX_ATTEMPTS) {
            config.retry.max_attempts = attempts.max(1);
        }

        config
    }

    pub fn with_stale_threshold(mut self, stale_threshold: Duration) -> Self {
        self.stale_threshold = stale_threshold;
        self
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Swap executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Delay applied before each swap commits
    pub execution_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            execution_delay: Duration::from_millis(SIMULATED_EXECUTION_DELAY_MS),
        }
    }
}

impl ExecutorConfig {
    /// Config with no settlement delay
    pub fn immediate() -> Self {
        Self {
            execution_delay: Duration::ZERO,
        }
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}
