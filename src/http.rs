//! HTTP client abstraction for fetching fragments.
//!
//! This module defines the `HttpClient` trait to abstract request execution,
//! enabling testability with mock implementations.

use crate::domain::{FetchDescriptor, JSON_CONTENT_TYPE};
use crate::error::Result;
use async_trait::async_trait;

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for executing fragment requests.
///
/// Implementations return `Ok` for any response that arrived, whatever its
/// status; interpreting the status is the loader's job. `Err` means no
/// response was obtained.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new();
/// let response = client.execute(&FetchDescriptor::get("header", url)).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute the request described by `request`.
    ///
    /// The payload, if any, is sent as a JSON body with
    /// `Content-Type: application/json; charset=utf-8`.
    async fn execute(&self, request: &FetchDescriptor) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured reqwest client (proxies, default headers, TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(fragment = %request.name, method = %request.method, url = %request.url))]
    async fn execute(&self, request: &FetchDescriptor) -> Result<HttpResponse> {
        tracing::debug!("Executing fragment request");

        let mut req = self
            .client
            .request(request.method.into(), request.url.as_str());

        if let Some(payload) = &request.payload {
            let body = serde_json::to_vec(payload)?;
            tracing::trace!(body_len = body.len(), "Added JSON payload");
            req = req
                .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(body);
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            status = status,
            response_len = body.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Mock HTTP client for testing.
///
/// Responses are keyed by `"{METHOD} {url}"` and served in FIFO order per
/// key. Every call is recorded, including calls with no configured response.
///
/// # Example
/// ```
/// use volley::http::{HttpResponse, MockHttpClient};
///
/// let mock = MockHttpClient::new();
/// mock.add_response(
///     "GET https://example.com/header.html",
///     Ok(HttpResponse::ok("<h1>Header</h1>")),
/// );
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait for a trigger before completing.
enum MockResponse {
    Immediate(Result<HttpResponse>),
    Triggered {
        response: Result<HttpResponse>,
        trigger: oneshot::Receiver<()>,
    },
    /// Never completes
    Hang,
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub fragment: String,
    pub method: String,
    pub url: String,
    pub body: Option<String>,
    pub content_type: Option<String>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, key: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    /// Add a predetermined response for `"{METHOD} {url}"`.
    ///
    /// Multiple responses can be added for the same key - they will be
    /// returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.push(key, MockResponse::Immediate(response));
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the request to complete with the given response.
    pub fn add_response_with_trigger(
        &self,
        key: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            key,
            MockResponse::Triggered {
                response,
                trigger: rx,
            },
        );
        tx
    }

    /// Add a response that never arrives, simulating a hung connection.
    pub fn add_hanging_response(&self, key: &str) {
        self.push(key, MockResponse::Hang);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of requests currently in-flight (executing).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &FetchDescriptor) -> Result<HttpResponse> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        // Decrement even if the caller drops this future
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        let body = request
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.calls.lock().push(MockCall {
            fragment: request.name.to_string(),
            method: request.method.to_string(),
            url: request.url.clone(),
            content_type: body.as_ref().map(|_| JSON_CONTENT_TYPE.to_string()),
            body,
        });

        let key = format!("{} {}", request.method, request.url);
        let mock_response = self
            .responses
            .lock()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered { response, trigger }) => {
                // Proceed whether the trigger fired or was dropped
                let _ = trigger.await;
                response
            }
            Some(MockResponse::Hang) => std::future::pending().await,
            None => Err(crate::error::VolleyError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                key
            ))),
        }
    }
}
