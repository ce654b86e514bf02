//! Error types for the fragment loader.

use thiserror::Error;

/// Result type alias using the volley error type.
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Main error type for the loader.
///
/// Individual fetch failures inside a batch are never surfaced through this
/// type; they are reported as [`FetchError`](crate::domain::FetchError) values
/// in the batch outcome. This type covers the transport layer and parsing.
#[derive(Error, Debug)]
pub enum VolleyError {
    /// The string could not be parsed as a supported HTTP method
    #[error("Invalid HTTP method: '{0}'")]
    InvalidMethod(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = VolleyError::InvalidMethod("FETCH".to_string());
        assert_eq!(err.to_string(), "Invalid HTTP method: 'FETCH'");

        let err: VolleyError = anyhow::anyhow!("mock exhausted").into();
        assert_eq!(err.to_string(), "mock exhausted");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: VolleyError = parse.unwrap_err().into();
        assert!(err.to_string().starts_with("Serialization error:"));
    }
}
