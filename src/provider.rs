//! Price source abstraction for fetching the token price list

use crate::{error::ProviderError, types::PriceRecord};
use async_trait::async_trait;

/// Trait for token price sources
///
/// Implementations return the raw price list; filtering of unusable
/// records and indexing by currency happen in the cache.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches the full token price list in a single request
    async fn fetch_prices(&self) -> Result<Vec<PriceRecord>, ProviderError>;

    /// Returns the name of this source
    fn source_name(&self) -> &'static str;
}
