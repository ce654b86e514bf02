//! Fetching a single fragment.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::Loader;
use crate::domain::{FailedEntry, FetchDescriptor, FetchError, Loaded};
use crate::http::HttpClient;

impl<H> Loader<H>
where
    H: HttpClient + 'static,
{
    /// Fetch one fragment and register it.
    ///
    /// Always issues exactly one request, whether or not the name is already
    /// registered (registering an existing name is a no-op). Never retries.
    /// The registry is only touched on success.
    #[tracing::instrument(skip(self, descriptor), fields(fragment = %descriptor.name, url = %descriptor.url))]
    pub async fn fetch(&self, descriptor: &FetchDescriptor) -> Result<Loaded, FailedEntry> {
        // Held until the request resolves
        let _permit = match &self.permits {
            Some(permits) => match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    return Err(self.failed(
                        descriptor,
                        FetchError::Aborted {
                            message: e.to_string(),
                        },
                        Duration::ZERO,
                    ));
                }
            },
            None => None,
        };

        self.counters.fetches_started.fetch_add(1, Ordering::Relaxed);
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.counters.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.in_flight.fetch_sub(1, Ordering::Relaxed);
        });

        let started = Instant::now();
        match self.obtain_content(descriptor).await {
            Ok(content) => {
                let inserted = self.registry.register(descriptor.name.clone(), content);
                self.counters.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
                self.record_fetch("success", started.elapsed());
                tracing::info!(newly_registered = inserted, "Fragment loaded");
                Ok(Loaded {
                    name: descriptor.name.clone(),
                    url: descriptor.url.clone(),
                })
            }
            Err(error) => Err(self.failed(descriptor, error, started.elapsed())),
        }
    }

    /// Fetch one fragment in the background and report through a callback pair.
    ///
    /// If the name is already registered, `on_success` fires before this
    /// returns. With `refetch_existing` (the default) the request is still
    /// made and its completion reports again, so `on_success` may run twice;
    /// otherwise no request is made and `None` is returned.
    ///
    /// Outside a tokio runtime the request cannot be made: `on_failure` fires
    /// with [`FetchError::Aborted`] before this returns, and `None` is
    /// returned.
    pub fn fetch_one<S, F>(
        &self,
        descriptor: FetchDescriptor,
        on_success: S,
        on_failure: F,
    ) -> Option<JoinHandle<()>>
    where
        S: Fn(Loaded) + Send + 'static,
        F: FnOnce(FailedEntry) + Send + 'static,
    {
        if self.registry.exists(&descriptor.name) {
            tracing::debug!(
                fragment = %descriptor.name,
                refetch = self.config.refetch_existing,
                "Fragment already registered"
            );
            on_success(Loaded {
                name: descriptor.name.clone(),
                url: descriptor.url.clone(),
            });
            if !self.config.refetch_existing {
                return None;
            }
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(
                    fragment = %descriptor.name,
                    error = %e,
                    "No tokio runtime, cannot dispatch fetch"
                );
                on_failure(FailedEntry {
                    name: descriptor.name,
                    url: descriptor.url,
                    error: FetchError::Aborted {
                        message: e.to_string(),
                    },
                });
                return None;
            }
        };

        let loader = self.clone();
        Some(runtime.spawn(async move {
            match loader.fetch(&descriptor).await {
                Ok(loaded) => on_success(loaded),
                Err(failed) => on_failure(failed),
            }
        }))
    }

    async fn obtain_content(&self, descriptor: &FetchDescriptor) -> Result<String, FetchError> {
        let request = self.http_client.execute(descriptor);
        let response = match self.config.fetch_timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), request)
                .await
                .map_err(|_| FetchError::Timeout { timeout_ms })?,
            None => request.await,
        }?;

        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
                body: response.body,
            });
        }

        descriptor.extract_content(response.body)
    }

    fn failed(
        &self,
        descriptor: &FetchDescriptor,
        error: FetchError,
        elapsed: Duration,
    ) -> FailedEntry {
        self.counters.fetches_failed.fetch_add(1, Ordering::Relaxed);
        self.record_fetch(error.kind(), elapsed);
        tracing::warn!(kind = error.kind(), error = %error, "Fragment fetch failed");
        FailedEntry {
            name: descriptor.name.clone(),
            url: descriptor.url.clone(),
            error,
        }
    }
}
