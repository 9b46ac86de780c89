//! Token price cache
//!
//! Holds the latest [`PriceSnapshot`] and refreshes it from a
//! [`PriceSource`] when it goes stale.
//!
//! ## Guarantees
//!
//! - Readers always get a whole snapshot. The slot holds an
//!   `Arc<PriceSnapshot>` that is swapped in a single write.
//! - Concurrent refreshes collapse into one in-flight fetch whose result
//!   every caller shares.
//! - The fetch and its retries run on a spawned task. A caller that stops
//!   waiting does not cancel it, and the result still lands in the cache.
//!
//! ```no_run
//! use std::sync::Arc;
//! use token_swap_sdk::{HttpPriceSource, PriceCache, PriceCacheConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PriceCacheConfig::from_env();
//! let source = Arc::new(HttpPriceSource::new(&config)?);
//! let cache = PriceCache::new(source, config);
//!
//! let prices = cache.get_prices().await?;
//! for symbol in prices.available_tokens() {
//!     println!("{}: {:?}", symbol, prices.price(symbol));
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    config::PriceCacheConfig,
    constants::EVENT_CHANNEL_CAPACITY,
    error::{FetchError, ProviderError},
    metrics::{FetchMetrics, MetricsCollector},
    provider::PriceSource,
    types::{ComponentHealth, HealthStatus, PriceSnapshot, SwapEvent},
};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

type RefreshResult = Result<Arc<PriceSnapshot>, FetchError>;

/// A refresh that is running (or just finished) on a spawned task
struct InFlight {
    result: Shared<BoxFuture<'static, RefreshResult>>,
    task: AbortHandle,
}

struct CacheInner {
    source: Arc<dyn PriceSource>,
    config: PriceCacheConfig,
    snapshot: RwLock<Option<Arc<PriceSnapshot>>>,
    inflight: Mutex<Option<InFlight>>,
    metrics: MetricsCollector,
    events: broadcast::Sender<SwapEvent>,
}

/// Price cache with staleness and retry policy
///
/// Cheap to clone; clones share the same snapshot and in-flight fetch.
#[derive(Clone)]
pub struct PriceCache {
    inner: Arc<CacheInner>,
}

impl PriceCache {
    /// Creates a cache with its own event channel
    pub fn new(source: Arc<dyn PriceSource>, config: PriceCacheConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_events(source, config, events)
    }

    /// Creates a cache publishing into an existing event channel
    pub fn with_events(
        source: Arc<dyn PriceSource>,
        config: PriceCacheConfig,
        events: broadcast::Sender<SwapEvent>,
    ) -> Self {
        let metrics = MetricsCollector::new(source.source_name());

        Self {
            inner: Arc::new(CacheInner {
                source,
                config,
                snapshot: RwLock::new(None),
                inflight: Mutex::new(None),
                metrics,
                events,
            }),
        }
    }

    /// Returns a snapshot fresh enough to back a swap decision
    ///
    /// Serves the cached snapshot while it is younger than the stale
    /// threshold, otherwise refreshes first.
    pub async fn get_prices(&self) -> Result<Arc<PriceSnapshot>, FetchError> {
        let cached = self.inner.snapshot.read().await.clone();
        if let Some(snapshot) = cached {
            if !snapshot.is_stale() {
                tracing::debug!(
                    age_ms = snapshot.age().as_millis() as u64,
                    "Serving cached price snapshot"
                );
                return Ok(snapshot);
            }
        }

        self.refresh().await
    }

    /// Fetches a new snapshot, joining any refresh already in flight
    pub async fn refresh(&self) -> Result<Arc<PriceSnapshot>, FetchError> {
        let result = {
            let mut inflight = self.inner.inflight.lock().await;
            let running = inflight
                .as_ref()
                .filter(|pending| !pending.task.is_finished())
                .map(|pending| pending.result.clone());

            match running {
                Some(result) => {
                    tracing::debug!("Joining in-flight price refresh");
                    result
                }
                None => {
                    let inner = self.inner.clone();
                    let handle: JoinHandle<RefreshResult> =
                        tokio::spawn(async move { inner.fetch_and_store().await });
                    let task = handle.abort_handle();

                    let result = async move {
                        handle
                            .await
                            .unwrap_or_else(|e| Err(FetchError::Aborted(e.to_string())))
                    }
                    .boxed()
                    .shared();

                    *inflight = Some(InFlight {
                        result: result.clone(),
                        task,
                    });
                    result
                }
            }
        };

        result.await
    }

    /// Last snapshot regardless of staleness, for display
    ///
    /// Returns `None` once the snapshot is older than the cache time.
    pub async fn latest(&self) -> Option<Arc<PriceSnapshot>> {
        let snapshot = self.inner.snapshot.read().await.clone()?;
        if snapshot.age() >= self.inner.config.cache_time {
            return None;
        }
        Some(snapshot)
    }

    /// Starts a background task that refreshes prices on an interval
    pub fn spawn_refresh_task(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            tracing::info!(
                refresh_interval_secs = interval.as_secs(),
                source = cache.source_name(),
                "Starting price refresh task"
            );

            loop {
                if let Err(e) = cache.refresh().await {
                    tracing::warn!(error = %e, "Background price refresh failed");
                }
                sleep(interval).await;
            }
        })
    }

    /// Subscribes to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the name of the price source
    pub fn source_name(&self) -> &'static str {
        self.inner.source.source_name()
    }

    pub fn config(&self) -> &PriceCacheConfig {
        &self.inner.config
    }

    /// Gets fetch metrics including latency percentiles and success rate
    pub async fn fetch_metrics(&self) -> FetchMetrics {
        self.inner.metrics.get_metrics().await
    }

    /// Perform a health check on the price cache
    pub async fn health_check(&self) -> ComponentHealth {
        let mut details = HashMap::new();
        details.insert(
            "source_name".to_string(),
            serde_json::json!(self.source_name()),
        );

        let snapshot = self.inner.snapshot.read().await.clone();

        let (status, message) = match &snapshot {
            None => (
                HealthStatus::Unhealthy,
                "Price cache has no snapshot".to_string(),
            ),
            Some(s) if s.is_stale() => (
                HealthStatus::Degraded,
                format!("Price snapshot is stale (age: {:?})", s.age()),
            ),
            Some(_) => (
                HealthStatus::Healthy,
                "Price cache is operational with fresh data".to_string(),
            ),
        };

        if let Some(s) = &snapshot {
            details.insert("token_count".to_string(), serde_json::json!(s.len()));
            details.insert(
                "age_secs".to_string(),
                serde_json::json!(s.age().as_secs()),
            );
        }

        ComponentHealth {
            name: "price_cache".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: Utc::now(),
        }
    }
}

impl CacheInner {
    /// Fetches from the source with retries and stores the new snapshot
    async fn fetch_and_store(&self) -> RefreshResult {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.source.fetch_prices().await {
                Ok(records) => {
                    let snapshot = PriceSnapshot::from_records(records, self.config.stale_threshold);
                    if snapshot.is_empty() {
                        ProviderError::InvalidResponse("No usable prices returned".to_string())
                    } else {
                        let snapshot = Arc::new(snapshot);
                        *self.snapshot.write().await = Some(snapshot.clone());

                        tracing::info!(
                            count = snapshot.len(),
                            source = self.source.source_name(),
                            attempt,
                            latency_ms = start.elapsed().as_millis() as u64,
                            "Price snapshot refreshed"
                        );
                        self.metrics
                            .record_refresh(start.elapsed(), attempt, true)
                            .await;
                        let _ = self.events.send(SwapEvent::PricesRefreshed {
                            id: Uuid::new_v4(),
                            token_count: snapshot.len(),
                            timestamp: snapshot.fetched_at(),
                        });

                        return Ok(snapshot);
                    }
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                let err = FetchError::exhausted(attempt, &error);
                tracing::warn!(attempts = attempt, error = %error, "Price fetch exhausted retries");
                self.metrics
                    .record_refresh(start.elapsed(), attempt, false)
                    .await;
                let _ = self.events.send(SwapEvent::PriceFetchFailed {
                    id: Uuid::new_v4(),
                    error_message: err.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(err);
            }

            let backoff = retry.backoff_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Failed to fetch prices, retrying"
            );
            sleep(backoff).await;
        }
    }
}
