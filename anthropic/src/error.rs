//! Error types for the Anthropic API client

use thiserror::Error;

/// Errors that can occur when interacting with the Anthropic API
#[derive(Debug, Error)]
pub enum ClaudeError {
    /// Missing `ANTHROPIC_API_KEY` environment variable
    #[error("Missing ANTHROPIC_API_KEY environment variable")]
    MissingApiKey,

    /// HTTP client could not be constructed
    #[error("Client construction failed: {0}")]
    ClientBuild(String),

    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Response parsing failed
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Rate limited - too many requests
    #[error("Rate limited - too many requests")]
    RateLimited,

    /// Unauthorized - invalid API key
    #[error("Unauthorized - invalid API key")]
    Unauthorized,

    /// API returned an error
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },
}

impl ClaudeError {
    /// Whether a retry of the same request may succeed
    ///
    /// Rate limits, timeouts, dropped connections, and server-side (5xx,
    /// including 529 overloaded) errors are transient. Authentication and
    /// request-shape errors are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout | Self::RequestFailed(_) => true,
            Self::ApiError { status, .. } => *status >= 500,
            Self::MissingApiKey
            | Self::ClientBuild(_)
            | Self::ResponseParseFailed(_)
            | Self::Unauthorized => false,
        }
    }
}
