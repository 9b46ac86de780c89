//! Error types for the token swap core

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from a single attempt to fetch the price list
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Invalid response from the price source
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Price source returned a non-success status
    #[error("Provider API error: {0}")]
    ApiError(String),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,
}

/// Price retrieval failure surfaced after the retry policy is exhausted
///
/// Cloneable so every caller joined on one in-flight refresh gets the
/// same error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Every attempt failed
    #[error("Price fetch failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The background fetch task died before producing a result
    #[error("Price fetch aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Creates an Exhausted error
    pub fn exhausted(attempts: u32, last_error: &ProviderError) -> Self {
        Self::Exhausted {
            attempts,
            last_error: last_error.to_string(),
        }
    }
}

/// Ledger mutation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Debit larger than the current balance
    #[error("Insufficient {token} balance: requested {requested}, available {available}")]
    InsufficientFunds {
        token: String,
        requested: Decimal,
        available: Decimal,
    },

    /// Credit or debit of zero or a negative amount
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Balance arithmetic overflowed
    #[error("Balance overflow for {token}")]
    Overflow { token: String },

    /// A combined mutation could not be applied as a whole
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}

/// Errors returned by validation and execution of a swap
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    /// Amount is missing, malformed, zero or negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Source and destination are the same token
    #[error("Cannot swap {0} for itself")]
    IdenticalTokens(String),

    /// No usable price for one side of the swap
    #[error("No quote available for {token}")]
    QuoteUnavailable { token: String },

    /// Requested amount exceeds the held balance
    #[error("Insufficient {token} balance: requested {requested}, available {available}")]
    InsufficientFunds {
        token: String,
        requested: Decimal,
        available: Decimal,
    },

    /// Prices could not be retrieved
    #[error(transparent)]
    Prices(#[from] FetchError),

    /// Ledger rejected the mutation
    #[error(transparent)]
    Ledger(LedgerError),

    /// Swap ticket was driven through an illegal transition
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl SwapError {
    /// Creates an InvalidAmount error
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    /// Creates a QuoteUnavailable error
    pub fn quote_unavailable(token: &str) -> Self {
        Self::QuoteUnavailable {
            token: token.to_string(),
        }
    }

    /// True for a broken ledger invariant or lifecycle, both programming errors
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SwapError::Ledger(LedgerError::InvariantViolation(_)) | SwapError::Lifecycle(_)
        )
    }

    /// Balance available when the swap was rejected for lack of funds
    pub fn available(&self) -> Option<Decimal> {
        match self {
            SwapError::InsufficientFunds { available, .. } => Some(*available),
            _ => None,
        }
    }
}

impl From<LedgerError> for SwapError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                token,
                requested,
                available,
            } => SwapError::InsufficientFunds {
                token,
                requested,
                available,
            },
            other => SwapError::Ledger(other),
        }
    }
}

/// Illegal transition of a swap ticket
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid swap transition from {from} to {to}")]
pub struct LifecycleError {
    pub from: &'static str,
    pub to: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ledger_shortfall_maps_to_swap_shortfall() {
        let err: SwapError = LedgerError::InsufficientFunds {
            token: "ETH".to_string(),
            requested: dec!(10),
            available: dec!(5),
        }
        .into();

        assert_eq!(err.available(), Some(dec!(5)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_errors() {
        let fatal: SwapError = LedgerError::InvariantViolation("partial".into()).into();
        assert!(fatal.is_fatal());

        let lifecycle: SwapError = LifecycleError {
            from: "idle",
            to: "applied",
        }
        .into();
        assert!(lifecycle.is_fatal());

        let overflow: SwapError = LedgerError::Overflow {
            token: "BTC".into(),
        }
        .into();
        assert!(!overflow.is_fatal());
        assert!(!SwapError::IdenticalTokens("BTC".into()).is_fatal());
    }

    #[test]
    fn test_fetch_error_message() {
        let err = FetchError::exhausted(3, &ProviderError::Timeout);
        assert_eq!(
            err.to_string(),
            "Price fetch failed after 3 attempts: Request timeout"
        );
    }
}
