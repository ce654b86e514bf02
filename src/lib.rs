//! Named fragment registry with deduplicated, batched HTTP loading.
//!
//! A [`Registry`] holds fragments (markup templates and the like) by name. A
//! [`Loader`] fetches fragments into it over HTTP, at most once per name per
//! batch, and reports a whole batch of fetches through a single aggregated
//! outcome: every fragment loaded, or the list of the ones that failed.
//!
//! ```no_run
//! use std::sync::Arc;
//! use volley::{FetchDescriptor, Loader, Registry, ReqwestHttpClient};
//!
//! # async fn run() {
//! let registry = Arc::new(Registry::new());
//! let loader = Loader::new(registry.clone(), Arc::new(ReqwestHttpClient::new()));
//!
//! loader.load_batch(
//!     Some(vec![
//!         FetchDescriptor::get("header", "https://example.com/tpl/header.html"),
//!         FetchDescriptor::get("footer", "https://example.com/tpl/footer.html"),
//!     ]),
//!     || tracing::info!("templates ready"),
//!     |failure| tracing::warn!(failed = ?failure.failed_names(), "templates missing"),
//! );
//! # }
//! ```

pub mod domain;
pub mod error;
pub mod http;
pub mod loader;
pub mod metrics;
pub mod registry;

// Re-export commonly used types
pub use domain::{
    BatchFailure, BatchId, BatchReport, FailedEntry, FetchDescriptor, FetchError, FetchOutcome,
    FragmentName, Loaded, Method,
};
pub use error::{Result, VolleyError};
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use loader::{Loader, LoaderConfig, LoaderStats};
#[cfg(feature = "metrics")]
pub use metrics::VolleyMetrics;
pub use registry::Registry;
