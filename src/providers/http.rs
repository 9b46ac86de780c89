//! HTTP price list source

use crate::{
    config::PriceCacheConfig,
    constants::USER_AGENT,
    error::ProviderError,
    provider::PriceSource,
    types::PriceRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// One entry of the price list response
///
/// Every field is loosely typed so one malformed entry cannot fail the
/// whole list.
#[derive(Debug, Deserialize)]
struct RawPriceRecord {
    #[serde(default)]
    currency: Option<serde_json::Value>,
    #[serde(default)]
    date: Option<serde_json::Value>,
    #[serde(default)]
    price: Option<serde_json::Value>,
}

/// Price source reading a JSON price list over HTTP GET
pub struct HttpPriceSource {
    client: Client,
    url: String,
}

impl HttpPriceSource {
    /// Creates a new HTTP source for the configured URL
    pub fn new(config: &PriceCacheConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self {
            client,
            url: config.prices_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parses the price list body
///
/// Entries without a currency string are skipped. Prices that are missing
/// or not numeric come back as `None` and are dropped later with the
/// non-positive ones.
pub(crate) fn parse_price_list(body: &str) -> Result<Vec<PriceRecord>, ProviderError> {
    let raw: Vec<RawPriceRecord> = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse price list: {}", e))
    })?;

    let total = raw.len();
    let records: Vec<PriceRecord> = raw
        .into_iter()
        .filter_map(|r| {
            let currency = r.currency.as_ref()?.as_str()?.trim();
            if currency.is_empty() {
                return None;
            }

            Some(PriceRecord {
                currency: currency.to_string(),
                price: r.price.as_ref().and_then(parse_decimal),
                date: r
                    .date
                    .as_ref()
                    .and_then(serde_json::Value::as_str)
                    .and_then(parse_date),
            })
        })
        .collect();

    if records.len() < total {
        tracing::debug!(
            skipped = total - records.len(),
            "Skipped price entries without a currency"
        );
    }

    Ok(records)
}

fn parse_decimal(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_prices(&self) -> Result<Vec<PriceRecord>, ProviderError> {
        tracing::debug!(url = %self.url, "Fetching price list");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::NetworkError(e)
            }
        })?;

        // Check for rate limiting
        if response.status().as_u16() == 429 {
            return Err(ProviderError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response.text().await.map_err(ProviderError::NetworkError)?;
        let records = parse_price_list(&body)?;

        tracing::debug!(count = records.len(), "Fetched price list");

        Ok(records)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
