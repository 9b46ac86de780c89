//! Constants for the token swap core
//!
//! Compile-time defaults for the price cache and swap executor. Runtime
//! overrides go through [`crate::config`].

/// Price list endpoint (JSON array of `{currency, date, price}` records)
pub const PRICES_URL: &str = "https://interview.switcheo.com/prices.json";

/// Base URL for token icons, one SVG per currency symbol
pub const TOKEN_ICONS_BASE_URL: &str =
    "https://raw.githubusercontent.com/Switcheo/token-icons/main/tokens";

/// How long before a price snapshot is considered stale (in seconds)
pub const STALE_THRESHOLD_SECS: u64 = 300;

/// How long a snapshot is kept at all for display purposes (in seconds)
pub const CACHE_TIME_SECS: u64 = 600;

/// HTTP request timeout when fetching prices (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of fetch attempts before surfacing a fetch error
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Initial backoff delay for retries (in milliseconds)
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay for retries (in milliseconds)
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Simulated settlement delay applied before each swap commits (in milliseconds)
pub const SIMULATED_EXECUTION_DELAY_MS: u64 = 1500;

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "token-swap-sdk/0.1.0";

/// Returns the icon URL for a currency symbol
pub fn token_icon_url(currency: &str) -> String {
    format!("{}/{}.svg", TOKEN_ICONS_BASE_URL, currency)
}
