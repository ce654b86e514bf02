//! Prometheus metrics for fragment loading.
//!
//! Enabled with the `metrics` feature. Attach to a loader with
//! `Loader::with_metrics`.
//!
//! - **Gauges**: fragments currently registered
//! - **Counters**: fetches by outcome, batches by result
//! - **Histograms**: fetch duration

#[cfg(feature = "metrics")]
use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::error::Result;

/// Prometheus metrics for a loader.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct VolleyMetrics {
    registry: Registry,
    fragments_registered: Gauge,
    fetches_total: CounterVec,
    batches_total: CounterVec,
    fetch_duration_seconds: Histogram,
}

#[cfg(feature = "metrics")]
impl VolleyMetrics {
    /// Create the metrics and register them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics fail to register (e.g., duplicate registration).
    pub fn new(registry: Registry) -> Result<Self> {
        let fragments_registered = Gauge::with_opts(Opts::new(
            "volley_fragments_registered",
            "Number of fragments currently registered",
        ))
        .map_err(|e| anyhow::anyhow!("Failed to create fragments_registered gauge: {}", e))?;

        let fetches_total = CounterVec::new(
            Opts::new(
                "volley_fetches_total",
                "Total number of fragment fetches by outcome",
            ),
            &["outcome"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create fetches_total counter: {}", e))?;

        let batches_total = CounterVec::new(
            Opts::new("volley_batches_total", "Total number of batches by result"),
            &["result"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create batches_total counter: {}", e))?;

        let fetch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "volley_fetch_duration_seconds",
                "Fragment fetch duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create fetch_duration_seconds histogram: {}", e))?;

        registry
            .register(Box::new(fragments_registered.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register fragments_registered: {}", e))?;
        registry
            .register(Box::new(fetches_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register fetches_total: {}", e))?;
        registry
            .register(Box::new(batches_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register batches_total: {}", e))?;
        registry
            .register(Box::new(fetch_duration_seconds.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register fetch_duration_seconds: {}", e))?;

        Ok(Self {
            registry,
            fragments_registered,
            fetches_total,
            batches_total,
            fetch_duration_seconds,
        })
    }

    /// Get the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a finished fetch. `outcome` is "success" or a
    /// [`FetchError::kind`](crate::domain::FetchError::kind) label.
    pub fn record_fetch(&self, outcome: &str, duration: Duration) {
        self.fetches_total.with_label_values(&[outcome]).inc();
        self.fetch_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record a finished batch ("loaded" or "failed").
    pub fn record_batch(&self, result: &str) {
        self.batches_total.with_label_values(&[result]).inc();
    }

    pub fn set_fragments_registered(&self, count: usize) {
        self.fragments_registered.set(count as f64);
    }
}
