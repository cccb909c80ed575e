use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while resolving food products
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Underlying HTTP request failed (connection, TLS, body decode)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request did not complete within the configured timeout
    #[error("{upstream} request timed out after {timeout:?}")]
    Timeout {
        upstream: &'static str,
        timeout: Duration,
    },

    /// Upstream answered with a non-success HTTP status
    #[error("{upstream} returned HTTP {status}")]
    UpstreamStatus {
        upstream: &'static str,
        status: reqwest::StatusCode,
    },

    /// Upstream body did not have the expected shape
    #[error("unexpected {upstream} response: {detail}")]
    UnexpectedResponse {
        upstream: &'static str,
        detail: String,
    },

    /// Token endpoint refused the client credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Record lacks both a usable name and a source-native identifier
    #[error("record has no usable name or identifier")]
    MissingIdentity,

    /// No serving could be scaled to a 100 g/ml equivalent
    #[error("no serving could be resolved to a 100g equivalent")]
    UnusableServings,

    /// Local store error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Resolver builder misconfiguration
    #[error("builder error: {0}")]
    Builder(String),
}

impl ResolveError {
    /// Transient failures are retried by the primary client; everything
    /// else fails the attempt immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::Timeout { .. } => true,
            ResolveError::UpstreamStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            ResolveError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
