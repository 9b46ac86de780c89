//! Price fetch metrics
//!
//! Tracks latency percentiles, success rate and retry volume for the
//! price source behind a [`crate::PriceCache`].

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Snapshot of fetch metrics for one price source
#[derive(Debug, Clone, PartialEq)]
pub struct FetchMetrics {
    /// Name of the price source
    pub source_name: String,
    /// 50th percentile latency of successful refreshes in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful refreshes in milliseconds
    pub latency_p99_ms: f64,
    /// Share of refreshes that produced a snapshot (0.0 to 1.0)
    pub success_rate: f64,
    /// Refreshes tracked (lifetime)
    pub total_refreshes: u64,
    /// Refreshes that exhausted their retries (lifetime)
    pub failed_refreshes: u64,
    /// Individual network attempts, retries included (lifetime)
    pub total_attempts: u64,
}

impl FetchMetrics {
    /// Creates metrics with no data
    pub fn empty(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_refreshes: 0,
            failed_refreshes: 0,
            total_attempts: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct Counters {
    samples: VecDeque<LatencySample>,
    total_refreshes: u64,
    failed_refreshes: u64,
    total_attempts: u64,
}

/// Collects fetch outcomes for one price source
pub struct MetricsCollector {
    source_name: String,
    counters: RwLock<Counters>,
}

impl MetricsCollector {
    pub fn new(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            counters: RwLock::new(Counters {
                samples: VecDeque::with_capacity(MAX_SAMPLES),
                ..Counters::default()
            }),
        }
    }

    /// Records one refresh with its total duration and attempt count
    pub async fn record_refresh(&self, duration: Duration, attempts: u32, success: bool) {
        let mut counters = self.counters.write().await;

        counters.total_refreshes += 1;
        counters.total_attempts += u64::from(attempts);
        if !success {
            counters.failed_refreshes += 1;
        }

        if counters.samples.len() >= MAX_SAMPLES {
            counters.samples.pop_front();
        }
        counters.samples.push_back(LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            success,
        });
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> FetchMetrics {
        let counters = self.counters.read().await;

        if counters.samples.is_empty() {
            return FetchMetrics::empty(&self.source_name);
        }

        let mut latencies: Vec<f64> = counters
            .samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.total_cmp(b));

        let total = counters.total_refreshes;
        let failed = counters.failed_refreshes;

        FetchMetrics {
            source_name: self.source_name.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: (total - failed) as f64 / total as f64,
            total_refreshes: total,
            failed_refreshes: failed,
            total_attempts: counters.total_attempts,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
