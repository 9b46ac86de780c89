//! Types for the token swap core

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A price record as delivered by a price source, before filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRecord {
    /// Currency symbol
    pub currency: String,
    /// Unit price in USD, if the source had one
    pub price: Option<Decimal>,
    /// When the source last updated this price
    pub date: Option<DateTime<Utc>>,
}

impl PriceRecord {
    pub fn new(currency: impl Into<String>, price: Decimal) -> Self {
        Self {
            currency: currency.into(),
            price: Some(price),
            date: None,
        }
    }
}

/// Price of a single token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPrice {
    /// Currency symbol
    pub currency: String,

    /// Unit price in USD, always positive
    pub price: Decimal,

    /// Last updated timestamp
    pub date: DateTime<Utc>,
}

/// Immutable token price table valid at one point in time
///
/// Replaced wholesale on every refresh, never edited in place.
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    tokens: HashMap<String, TokenPrice>,
    fetched_at: DateTime<Utc>,
    fetched_instant: Instant,
    stale_threshold: Duration,
}

impl PriceSnapshot {
    /// Builds a snapshot from raw records
    ///
    /// Records with a missing or non-positive price are dropped. A repeated
    /// currency keeps the last record.
    pub fn from_records(
        records: impl IntoIterator<Item = PriceRecord>,
        stale_threshold: Duration,
    ) -> Self {
        let fetched_at = Utc::now();
        let mut tokens = HashMap::new();

        for record in records {
            let price = match record.price {
                Some(price) if price > Decimal::ZERO => price,
                _ => continue,
            };

            tokens.insert(
                record.currency.clone(),
                TokenPrice {
                    currency: record.currency,
                    price,
                    date: record.date.unwrap_or(fetched_at),
                },
            );
        }

        Self {
            tokens,
            fetched_at,
            fetched_instant: Instant::now(),
            stale_threshold,
        }
    }

    /// Price entry for a token
    pub fn token(&self, currency: &str) -> Option<&TokenPrice> {
        self.tokens.get(currency)
    }

    /// Unit price for a token
    pub fn price(&self, currency: &str) -> Option<Decimal> {
        self.tokens.get(currency).map(|t| t.price)
    }

    /// Currencies with a usable price, sorted alphabetically
    pub fn available_tokens(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.tokens.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Wall-clock time of the fetch that produced this snapshot
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Time since the snapshot was fetched
    pub fn age(&self) -> Duration {
        self.fetched_instant.elapsed()
    }

    /// Check if the snapshot must be refreshed before backing a new swap
    pub fn is_stale(&self) -> bool {
        self.age() >= self.stale_threshold
    }
}

/// Immutable copy of every ledger balance, tagged with the ledger version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    pub balances: HashMap<String, Decimal>,
    pub version: u64,
    pub taken_at: DateTime<Utc>,
}

impl BalanceView {
    /// Balance of a token, zero when absent
    pub fn balance(&self, token: &str) -> Decimal {
        self.balances.get(token).copied().unwrap_or(Decimal::ZERO)
    }
}

/// A proposed swap, as entered by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub from_token: String,
    pub to_token: String,
    pub from_amount: Decimal,
}

impl SwapRequest {
    pub fn new(
        from_token: impl Into<String>,
        to_token: impl Into<String>,
        from_amount: Decimal,
    ) -> Self {
        Self {
            from_token: from_token.into(),
            to_token: to_token.into(),
            from_amount,
        }
    }
}

/// A request that passed validation, priced against one snapshot
///
/// The `id` is the idempotency key for execution. Quotes are only issued by
/// [`crate::SwapValidator::validate`]; their fields are read-only, so an
/// executor never sees amounts the validator did not price.
///
/// ```compile_fail
/// use rust_decimal::Decimal;
/// use token_swap_sdk::SwapQuote;
///
/// let forged = SwapQuote {
///     id: uuid::Uuid::new_v4(),
///     from_token: "BTC".to_string(),
///     to_token: "ETH".to_string(),
///     from_amount: Decimal::ONE,
///     to_amount: Decimal::MAX,
///     rate: Decimal::MAX,
///     quoted_at: chrono::Utc::now(),
/// };
/// ```
///
/// ```compile_fail
/// # use rust_decimal::Decimal;
/// # use token_swap_sdk::SwapQuote;
/// fn inflate(mut quote: SwapQuote) -> SwapQuote {
///     quote.to_amount = Decimal::MAX;
///     quote
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapQuote {
    pub(crate) id: Uuid,
    from_token: String,
    to_token: String,
    from_amount: Decimal,
    to_amount: Decimal,
    rate: Decimal,
    quoted_at: DateTime<Utc>,
}

impl SwapQuote {
    pub(crate) fn new(
        id: Uuid,
        from_token: impl Into<String>,
        to_token: impl Into<String>,
        from_amount: Decimal,
        to_amount: Decimal,
        rate: Decimal,
    ) -> Self {
        Self {
            id,
            from_token: from_token.into(),
            to_token: to_token.into(),
            from_amount,
            to_amount,
            rate,
            quoted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn from_token(&self) -> &str {
        &self.from_token
    }

    pub fn to_token(&self) -> &str {
        &self.to_token
    }

    pub fn from_amount(&self) -> Decimal {
        self.from_amount
    }

    pub fn to_amount(&self) -> Decimal {
        self.to_amount
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn quoted_at(&self) -> DateTime<Utc> {
        self.quoted_at
    }

    /// Request for the opposite direction, spending the quoted output
    pub fn reversed(&self) -> SwapRequest {
        SwapRequest::new(&self.to_token, &self.from_token, self.to_amount)
    }
}

/// Record of a swap applied to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub quote_id: Uuid,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub rate: Decimal,
    pub applied_at: DateTime<Utc>,
}

/// Events broadcast by the price cache and swap executor
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapEvent {
    /// A new price snapshot replaced the old one
    PricesRefreshed {
        id: Uuid,
        token_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Price fetch failed after all retries
    PriceFetchFailed {
        id: Uuid,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A swap was committed to the ledger
    SwapApplied { id: Uuid, receipt: SwapReceipt },

    /// A swap request failed validation
    SwapRejected {
        id: Uuid,
        from_token: String,
        to_token: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A validated swap could not be committed
    SwapFailed {
        id: Uuid,
        quote_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl SwapEvent {
    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            SwapEvent::PricesRefreshed { id, .. } => *id,
            SwapEvent::PriceFetchFailed { id, .. } => *id,
            SwapEvent::SwapApplied { id, .. } => *id,
            SwapEvent::SwapRejected { id, .. } => *id,
            SwapEvent::SwapFailed { id, .. } => *id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            SwapEvent::PricesRefreshed { .. } => "PRICES_REFRESHED",
            SwapEvent::PriceFetchFailed { .. } => "PRICE_FETCH_FAILED",
            SwapEvent::SwapApplied { .. } => "SWAP_APPLIED",
            SwapEvent::SwapRejected { .. } => "SWAP_REJECTED",
            SwapEvent::SwapFailed { .. } => "SWAP_FAILED",
        }
    }
}

impl std::fmt::Display for SwapEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapEvent::PricesRefreshed { token_count, .. } => {
                write!(f, "Prices refreshed: {} tokens", token_count)
            }
            SwapEvent::PriceFetchFailed { error_message, .. } => {
                write!(f, "Price fetch failed: {}", error_message)
            }
            SwapEvent::SwapApplied { receipt, .. } => write!(
                f,
                "Swapped {} {} for {} {}",
                receipt.from_amount, receipt.from_token, receipt.to_amount, receipt.to_token
            ),
            SwapEvent::SwapRejected {
                from_token,
                to_token,
                reason,
                ..
            } => write!(f, "Swap {} -> {} rejected: {}", from_token, to_token, reason),
            SwapEvent::SwapFailed {
                quote_id, reason, ..
            } => write!(f, "Swap {} failed: {}", quote_id, reason),
        }
    }
}

/// Overall component health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data available
    Healthy,
    /// Only stale data available
    Degraded,
    /// No data available
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
