//! Fragment names and fetch descriptors.
//!
//! A descriptor says where a named fragment lives and how to ask for it. It
//! is immutable once built and carries everything the transport needs.

use std::borrow::Borrow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::outcome::FetchError;
use crate::error::VolleyError;

/// Envelope field holding the fragment when the response is wrapped.
pub const ENVELOPE_FIELD: &str = "Template";

/// Content type sent with JSON request payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Unique name of a fragment in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentName(String);

impl FragmentName {
    pub fn new(name: impl Into<String>) -> Self {
        FragmentName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FragmentName {
    fn from(name: &str) -> Self {
        FragmentName(name.to_string())
    }
}

impl From<String> for FragmentName {
    fn from(name: String) -> Self {
        FragmentName(name)
    }
}

impl std::ops::Deref for FragmentName {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for FragmentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FragmentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP verb used to fetch a fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = VolleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(VolleyError::InvalidMethod(s.to_string())),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Describes how to fetch one named fragment.
///
/// # Example
/// ```
/// use volley::{FetchDescriptor, Method};
///
/// let plain = FetchDescriptor::get("header", "https://example.com/tpl/header.html");
/// let wrapped = FetchDescriptor::get("row", "https://example.com/api/templates")
///     .with_method(Method::Post)
///     .wrapped()
///     .with_payload(serde_json::json!({ "kind": "row" }));
///
/// assert!(!plain.expects_wrapped_payload);
/// assert!(wrapped.expects_wrapped_payload);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchDescriptor {
    /// Registry key for the fetched content
    pub name: FragmentName,
    /// Where the fragment is served from
    pub url: String,
    #[serde(default)]
    pub method: Method,
    /// When set, the response is a JSON envelope whose `Template` field holds the fragment
    #[serde(default)]
    pub expects_wrapped_payload: bool,
    /// JSON body sent with the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl FetchDescriptor {
    pub fn new(
        name: impl Into<FragmentName>,
        url: impl Into<String>,
        method: Method,
        expects_wrapped_payload: bool,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method,
            expects_wrapped_payload,
            payload,
        }
    }

    /// Plain GET of raw fragment text with no request body.
    pub fn get(name: impl Into<FragmentName>, url: impl Into<String>) -> Self {
        Self::new(name, url, Method::Get, false, None)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn wrapped(mut self) -> Self {
        self.expects_wrapped_payload = true;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Turn a successful response body into fragment content.
    ///
    /// Unwrapped descriptors take the body verbatim. Wrapped descriptors parse
    /// the body as JSON and require a string `Template` field.
    pub fn extract_content(&self, body: String) -> Result<String, FetchError> {
        if !self.expects_wrapped_payload {
            return Ok(body);
        }

        let envelope: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Envelope {
                message: format!("response is not valid JSON: {}", e),
            })?;

        match envelope.get(ENVELOPE_FIELD) {
            Some(serde_json::Value::String(content)) => Ok(content.clone()),
            Some(other) => Err(FetchError::Envelope {
                message: format!(
                    "'{}' field is not a string (found {})",
                    ENVELOPE_FIELD,
                    json_kind(other)
                ),
            }),
            None => Err(FetchError::Envelope {
                message: format!("response has no '{}' field", ENVELOPE_FIELD),
            }),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
