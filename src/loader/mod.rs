//! Batch loading of fragments with registry deduplication.
//!
//! A [`Loader`] ties a [`Registry`] to an [`HttpClient`]. Given a list of
//! descriptors it drops the ones already registered, fires one fetch per
//! remaining entry without waiting on any of them, and reports a single
//! aggregated outcome once every fetch has resolved.
//!
//! ```text
//! load_batch(descriptors)
//!     │
//!     ├── empty / None ──────────────> (nothing)
//!     ├── all registered ────────────> on_all_success()   (synchronous, no network)
//!     └── missing set [m0, m1, .. mN]
//!           ├── spawn fetch(m0) ──> slot[0]
//!           ├── spawn fetch(m1) ──> slot[1]
//!           └── spawn fetch(mN) ──> slot[N]
//!                        │
//!                  join all slots
//!                        │
//!           no failures ─┴─ any failure
//!         on_all_success()   on_any_failure(BatchFailure)
//! ```
//!
//! Each fetch owns the slot at its position in the missing set, so repeated
//! names in one batch are tracked independently.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::domain::{
    BatchFailure, BatchId, BatchReport, FailedEntry, FetchDescriptor, FetchError, FetchOutcome,
    Loaded,
};
use crate::http::HttpClient;
use crate::registry::Registry;

#[cfg(feature = "metrics")]
use crate::metrics::VolleyMetrics;

mod fetch;

/// Configuration for a [`Loader`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Per-fetch timeout in milliseconds. With `None`, a fetch that never
    /// answers keeps its batch open forever.
    pub fetch_timeout_ms: Option<u64>,

    /// When a single fetch targets a name that is already registered, report
    /// success immediately and still perform the request (reporting again on
    /// completion). Set to `false` to report once and skip the request.
    pub refetch_existing: bool,

    /// Upper bound on concurrently executing requests for this loader.
    /// Fetches beyond the bound are still dispatched and wait for a slot.
    pub max_in_flight: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: None,
            refetch_existing: true,
            max_in_flight: None,
        }
    }
}

/// Point-in-time counters for a loader (shared between its clones).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LoaderStats {
    /// Requests issued to the HTTP client
    pub fetches_started: u64,
    /// Requests whose content was obtained and registered
    pub fetches_succeeded: u64,
    /// Requests that ended in a [`FetchError`]
    pub fetches_failed: u64,
    /// Requests currently executing
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    fetches_started: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    in_flight: AtomicUsize,
}

/// Fetches fragments into a registry, one at a time or in batches.
///
/// Cloning is cheap; clones share the registry, client, and counters.
#[derive(Clone)]
pub struct Loader<H: HttpClient> {
    registry: Arc<Registry>,
    http_client: Arc<H>,
    config: LoaderConfig,
    permits: Option<Arc<Semaphore>>,
    counters: Arc<Counters>,
    #[cfg(feature = "metrics")]
    metrics: Option<VolleyMetrics>,
}

/// Result of partitioning and dispatching a batch.
enum Dispatch<H: HttpClient> {
    Skipped,
    AlreadyLoaded,
    /// Called outside a tokio runtime; every missing entry failed unsent
    NoRuntime(BatchFailure),
    Started(InFlightBatch<H>),
}

/// A batch whose fetches have all been spawned.
struct InFlightBatch<H: HttpClient> {
    batch_id: BatchId,
    loader: Loader<H>,
    runtime: Handle,
    missing: Vec<FetchDescriptor>,
    handles: Vec<JoinHandle<Result<Loaded, FailedEntry>>>,
}

impl<H> Loader<H>
where
    H: HttpClient + 'static,
{
    pub fn new(registry: Arc<Registry>, http_client: Arc<H>) -> Self {
        Self {
            registry,
            http_client,
            config: LoaderConfig::default(),
            permits: None,
            counters: Arc::new(Counters::default()),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.permits = config
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        self.config = config;
        self
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: VolleyMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            fetches_started: self.counters.fetches_started.load(Ordering::Relaxed),
            fetches_succeeded: self.counters.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.counters.fetches_failed.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
        }
    }

    /// Load a batch of fragments and report through a callback pair.
    ///
    /// - `None` or an empty list: neither callback fires, returns `None`.
    /// - Every name already registered: `on_all_success` runs before this
    ///   function returns, no request is made, returns `None`.
    /// - Otherwise the missing fragments are fetched concurrently and the
    ///   returned task invokes exactly one of the callbacks, once, after the
    ///   last fetch resolves. Fragments that loaded stay registered even when
    ///   the batch reports failure.
    /// - Outside a tokio runtime nothing can be fetched: `on_any_failure`
    ///   runs before this function returns, listing every missing entry as
    ///   [`FetchError::Aborted`], and `None` is returned.
    pub fn load_batch<S, F>(
        &self,
        descriptors: Option<Vec<FetchDescriptor>>,
        on_all_success: S,
        on_any_failure: F,
    ) -> Option<JoinHandle<()>>
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce(BatchFailure) + Send + 'static,
    {
        let descriptors = descriptors.unwrap_or_default();
        match self.dispatch(&descriptors) {
            Dispatch::Skipped => None,
            Dispatch::AlreadyLoaded => {
                on_all_success();
                None
            }
            Dispatch::NoRuntime(failure) => {
                on_any_failure(failure);
                None
            }
            Dispatch::Started(batch) => {
                let runtime = batch.runtime.clone();
                Some(runtime.spawn(async move {
                    match batch.join().await {
                        BatchReport::Failed(failure) => on_any_failure(failure),
                        _ => on_all_success(),
                    }
                }))
            }
        }
    }

    /// Load a batch of fragments and wait for the aggregated report.
    ///
    /// Same semantics as [`Loader::load_batch`], returned as a value.
    pub async fn load_all(&self, descriptors: &[FetchDescriptor]) -> BatchReport {
        match self.dispatch(descriptors) {
            Dispatch::Skipped => BatchReport::Skipped,
            Dispatch::AlreadyLoaded => BatchReport::Loaded { fetched: 0 },
            Dispatch::NoRuntime(failure) => BatchReport::Failed(failure),
            Dispatch::Started(batch) => batch.join().await,
        }
    }

    /// Partition against the registry and spawn a fetch per missing entry.
    fn dispatch(&self, descriptors: &[FetchDescriptor]) -> Dispatch<H> {
        if descriptors.is_empty() {
            tracing::trace!("Empty batch, nothing to load");
            return Dispatch::Skipped;
        }

        let missing: Vec<FetchDescriptor> = descriptors
            .iter()
            .filter(|d| !self.registry.exists(&d.name))
            .cloned()
            .collect();

        if missing.is_empty() {
            tracing::debug!(
                requested = descriptors.len(),
                "All fragments already registered"
            );
            self.record_batch("loaded");
            return Dispatch::AlreadyLoaded;
        }

        let batch_id = BatchId::new();
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(
                    batch_id = %batch_id,
                    missing = missing.len(),
                    error = %e,
                    "No tokio runtime, cannot dispatch fetches"
                );
                self.record_batch("failed");
                let failed_entries = missing
                    .into_iter()
                    .map(|descriptor| FailedEntry {
                        name: descriptor.name,
                        url: descriptor.url,
                        error: FetchError::Aborted {
                            message: e.to_string(),
                        },
                    })
                    .collect();
                return Dispatch::NoRuntime(BatchFailure {
                    batch_id,
                    failed_entries,
                });
            }
        };

        tracing::debug!(
            batch_id = %batch_id,
            requested = descriptors.len(),
            missing = missing.len(),
            "Dispatching fragment fetches"
        );

        let handles = missing
            .iter()
            .map(|descriptor| {
                let loader = self.clone();
                let descriptor = descriptor.clone();
                runtime.spawn(async move { loader.fetch(&descriptor).await })
            })
            .collect();

        Dispatch::Started(InFlightBatch {
            batch_id,
            loader: self.clone(),
            runtime,
            missing,
            handles,
        })
    }

    #[cfg(feature = "metrics")]
    fn record_batch(&self, result: &'static str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_batch(result);
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn record_batch(&self, _result: &'static str) {}

    #[cfg(feature = "metrics")]
    fn record_fetch(&self, outcome: &'static str, duration: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_fetch(outcome, duration);
            metrics.set_fragments_registered(self.registry.len());
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn record_fetch(&self, _outcome: &'static str, _duration: Duration) {}
}

impl<H> InFlightBatch<H>
where
    H: HttpClient + 'static,
{
    /// Wait for every slot to resolve, then aggregate.
    async fn join(self) -> BatchReport {
        let InFlightBatch {
            batch_id,
            loader,
            missing,
            handles,
            ..
        } = self;

        let mut slots = vec![FetchOutcome::Pending; missing.len()];
        let results = futures::future::join_all(handles).await;

        for (index, result) in results.into_iter().enumerate() {
            slots[index] = match result {
                Ok(outcome) => outcome.into(),
                Err(join_error) => {
                    tracing::error!(
                        batch_id = %batch_id,
                        fragment = %missing[index].name,
                        error = %join_error,
                        "Fetch task did not complete"
                    );
                    FetchOutcome::Failure(FailedEntry {
                        name: missing[index].name.clone(),
                        url: missing[index].url.clone(),
                        error: FetchError::Aborted {
                            message: join_error.to_string(),
                        },
                    })
                }
            };
        }

        debug_assert!(slots.iter().all(|slot| !slot.is_pending()));

        let fetched = slots.len();
        let failed_entries: Vec<FailedEntry> = slots
            .into_iter()
            .filter_map(|slot| match slot {
                FetchOutcome::Failure(entry) => Some(entry),
                _ => None,
            })
            .collect();

        if failed_entries.is_empty() {
            tracing::info!(batch_id = %batch_id, fetched, "Batch loaded");
            loader.record_batch("loaded");
            BatchReport::Loaded { fetched }
        } else {
            tracing::warn!(
                batch_id = %batch_id,
                fetched,
                failed = failed_entries.len(),
                "Batch completed with failures"
            );
            loader.record_batch("failed");
            BatchReport::Failed(BatchFailure {
                batch_id,
                failed_entries,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockHttpClient};

    fn loader(mock: &MockHttpClient) -> Loader<MockHttpClient> {
        Loader::new(Arc::new(Registry::new()), Arc::new(mock.clone()))
    }

    #[test]
    fn test_config_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.fetch_timeout_ms, None);
        assert!(config.refetch_existing);
        assert_eq!(config.max_in_flight, None);
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config: LoaderConfig = serde_json::from_str(r#"{"fetch_timeout_ms": 2500}"#).unwrap();
        assert_eq!(config.fetch_timeout_ms, Some(2500));
        assert!(config.refetch_existing);
    }

    #[tokio::test]
    async fn test_load_all_empty_is_skipped() {
        let mock = MockHttpClient::new();
        let loader = loader(&mock);

        assert_eq!(loader.load_all(&[]).await, BatchReport::Skipped);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_load_all_counts_fetches() {
        let mock = MockHttpClient::new();
        mock.add_response("GET https://example.com/a", Ok(HttpResponse::ok("A")));
        mock.add_response("GET https://example.com/b", Ok(HttpResponse::ok("B")));
        let loader = loader(&mock);
        loader.registry().register("c", "C");

        let report = loader
            .load_all(&[
                FetchDescriptor::get("a", "https://example.com/a"),
                FetchDescriptor::get("b", "https://example.com/b"),
                FetchDescriptor::get("c", "https://example.com/c"),
            ])
            .await;

        assert_eq!(report, BatchReport::Loaded { fetched: 2 });
        let stats = loader.stats();
        assert_eq!(stats.fetches_started, 2);
        assert_eq!(stats.fetches_succeeded, 2);
        assert_eq!(stats.fetches_failed, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn test_loader_records_metrics() {
        let mock = MockHttpClient::new();
        mock.add_response("GET https://example.com/a", Ok(HttpResponse::ok("A")));
        let registry = prometheus::Registry::new();
        let loader = loader(&mock).with_metrics(VolleyMetrics::new(registry.clone()).unwrap());

        loader
            .load_all(&[
                FetchDescriptor::get("a", "https://example.com/a"),
                FetchDescriptor::get("b", "https://example.com/b"),
            ])
            .await;

        let families = registry.gather();
        let fetches = families
            .iter()
            .find(|f| f.get_name() == "volley_fetches_total")
            .expect("fetches_total metric not found");
        assert_eq!(fetches.get_metric().len(), 2);

        let registered = families
            .iter()
            .find(|f| f.get_name() == "volley_fragments_registered")
            .expect("fragments_registered metric not found");
        assert_eq!(registered.get_metric()[0].get_gauge().get_value(), 1.0);
    }

    #[test]
    fn test_load_batch_outside_runtime_fails_missing_entries() {
        let mock = MockHttpClient::new();
        let loader = loader(&mock);
        loader.registry().register("a", "A");

        let failures = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorded = failures.clone();
        let handle = loader.load_batch(
            Some(vec![
                FetchDescriptor::get("a", "https://example.com/a"),
                FetchDescriptor::get("b", "https://example.com/b"),
            ]),
            || panic!("unexpected success"),
            move |failure| recorded.lock().push(failure),
        );

        assert!(handle.is_none());
        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        let names: Vec<&str> = failures[0]
            .failed_names()
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(names, vec!["b"]);
        assert_eq!(failures[0].failed_entries[0].error.kind(), "aborted");
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_load_batch_outside_runtime_fast_path_still_succeeds() {
        let mock = MockHttpClient::new();
        let loader = loader(&mock);
        loader.registry().register("a", "A");

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let handle = loader.load_batch(
            Some(vec![FetchDescriptor::get("a", "https://example.com/a")]),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            |failure| panic!("unexpected failure: {:?}", failure),
        );

        assert!(handle.is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_entries_keep_request_order() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "GET https://example.com/c",
            Ok(HttpResponse {
                status: 500,
                body: "boom".to_string(),
            }),
        );
        mock.add_response("GET https://example.com/b", Ok(HttpResponse::ok("B")));
        let loader = loader(&mock);

        let report = loader
            .load_all(&[
                FetchDescriptor::get("a", "https://example.com/a"),
                FetchDescriptor::get("b", "https://example.com/b"),
                FetchDescriptor::get("c", "https://example.com/c"),
            ])
            .await;

        let BatchReport::Failed(failure) = report else {
            panic!("expected failure, got {:?}", report);
        };
        let names: Vec<&str> = failure.failed_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(failure.failed_entries[0].error.kind(), "transport");
        assert_eq!(
            failure.failed_entries[1].error,
            FetchError::Status {
                status: 500,
                body: "boom".to_string()
            }
        );
        assert!(loader.registry().exists("b"));
    }
}
