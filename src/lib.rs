//! # Token Swap SDK
//!
//! Price synchronization and swap execution core for a token swap form.
//!
//! - [`PriceCache`] fetches the token price list, serves it until it goes
//!   stale, retries failed fetches with backoff and collapses concurrent
//!   refreshes into one request.
//! - [`BalanceLedger`] holds the account's token balances.
//! - [`exchange`] computes rates and converted amounts with decimal math.
//! - [`SwapValidator`] checks a request against one price snapshot and one
//!   balance view.
//! - [`SwapExecutor`] applies a validated quote as one atomic, idempotent
//!   ledger mutation.
//! - [`SwapDesk`] runs a request through all of the above under the
//!   ledger's swap permit.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use token_swap_sdk::{
//!     BalanceLedger, ExecutorConfig, HttpPriceSource, PriceCache, PriceCacheConfig,
//!     SwapDesk, SwapRequest,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PriceCacheConfig::from_env();
//! let cache = PriceCache::new(Arc::new(HttpPriceSource::new(&config)?), config);
//! let ledger = Arc::new(BalanceLedger::with_balances([("ETH", Decimal::from(5))]));
//! let desk = SwapDesk::new(cache, ledger, ExecutorConfig::default());
//!
//! let request = SwapRequest::from_input("ETH", "USDC", "1.5")?;
//! let receipt = desk.swap(request).await?;
//! println!(
//!     "Swapped {} {} for {} {} at {}",
//!     receipt.from_amount, receipt.from_token, receipt.to_amount, receipt.to_token, receipt.rate
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! # use token_swap_sdk::{SwapDesk, SwapError, SwapRequest};
//! # async fn example(desk: SwapDesk, request: SwapRequest) {
//! match desk.swap(request).await {
//!     Ok(receipt) => println!("Applied quote {}", receipt.quote_id),
//!     Err(SwapError::InsufficientFunds { token, available, .. }) => {
//!         println!("You only have {} {} available", available, token)
//!     }
//!     Err(e) if e.is_fatal() => panic!("ledger corrupted: {}", e),
//!     Err(e) => eprintln!("Swap failed: {}", e),
//! }
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod desk;
pub mod error;
pub mod exchange;
pub mod executor;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod types;
pub mod validator;

// Re-export commonly used types
pub use cache::PriceCache;
pub use config::{ExecutorConfig, PriceCacheConfig, RetryPolicy};
pub use constants::token_icon_url;
pub use desk::SwapDesk;
pub use error::{FetchError, LedgerError, LifecycleError, ProviderError, SwapError};
pub use executor::SwapExecutor;
pub use ledger::BalanceLedger;
pub use lifecycle::{SwapState, SwapTicket};
pub use metrics::FetchMetrics;
pub use provider::PriceSource;
pub use providers::{FixedPriceSource, HttpPriceSource};
pub use types::{
    BalanceView, ComponentHealth, HealthStatus, PriceRecord, PriceSnapshot, SwapEvent, SwapQuote,
    SwapReceipt, SwapRequest, TokenPrice,
};
pub use validator::{parse_amount, SwapValidator};
