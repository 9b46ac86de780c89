//! In-memory price source with a fixed price list

use crate::{error::ProviderError, provider::PriceSource, types::PriceRecord};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Price source serving a price list held in memory
///
/// Useful offline and in demos. Prices can be replaced at runtime.
#[derive(Clone, Default)]
pub struct FixedPriceSource {
    records: Arc<RwLock<Vec<PriceRecord>>>,
}

impl FixedPriceSource {
    /// Creates a source from `(currency, price)` pairs
    pub fn new<S: Into<String>>(prices: impl IntoIterator<Item = (S, Decimal)>) -> Self {
        let records = prices
            .into_iter()
            .map(|(currency, price)| PriceRecord::new(currency, price))
            .collect();

        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Sets or replaces the price of one currency
    pub async fn set_price(&self, currency: &str, price: Decimal) {
        let mut records = self.records.write().await;
        records.retain(|r| r.currency != currency);
        records.push(PriceRecord::new(currency, price));
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn fetch_prices(&self) -> Result<Vec<PriceRecord>, ProviderError> {
        Ok(self.records.read().await.clone())
    }

    fn source_name(&self) -> &'static str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_set_price_replaces_entry() {
        let source = FixedPriceSource::new([("BTC", dec!(45000))]);
        source.set_price("BTC", dec!(46000)).await;
        source.set_price("ETH", dec!(3000)).await;

        let records = source.fetch_prices().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .any(|r| r.currency == "BTC" && r.price == Some(dec!(46000))));
    }
}
