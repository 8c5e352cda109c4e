//! Error types for `zoho-books-http-tools`.

use thiserror::Error;

/// Errors surfaced by [`crate::client::UpstreamClient`].
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Credentials could not be obtained (relay down, no active account, ...).
    ///
    /// The message already carries the remediation text produced by the provider.
    #[error("{0}")]
    Credentials(String),

    /// The outbound URL could not be built or was rejected by the safety policy.
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// Transport failure (connect, timeout, TLS). URLs are redacted.
    #[error("Request error: {0}")]
    Request(String),

    /// The response body exceeded the configured size limit.
    #[error("Response too large: {0}")]
    ResponseTooLarge(String),

    /// JSON encoding failure while building the request body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for upstream calls.
pub type Result<T> = std::result::Result<T, UpstreamError>;
