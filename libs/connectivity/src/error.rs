//! Error types for dependency probing.

use thiserror::Error;

/// Errors returned by probe capabilities.
///
/// None of these escape [`crate::ConnectivityProbe`]; they are folded into
/// [`crate::ConnectionState`] messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Required credentials are not configured.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// Transport-level failure (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Http(String),

    /// The dependency answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The dependency answered but returned nothing usable.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// The dependency reported itself unavailable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Secret store lookup failed.
    #[error("secret store error: {0}")]
    Secret(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        ProbeError::Http(err.to_string())
    }
}
