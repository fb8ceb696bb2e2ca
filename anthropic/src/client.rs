//! Anthropic API client implementation

use crate::{
    error::ClaudeError,
    messages::{MessagesRequest, MessagesResponse},
};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    /// Create a new client with API key from environment
    ///
    /// # Errors
    ///
    /// Returns `ClaudeError::MissingApiKey` if `ANTHROPIC_API_KEY` is not set
    pub fn from_env() -> Result<Self, ClaudeError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ClaudeError::MissingApiKey)?;

        Ok(Self::new(api_key))
    }

    /// Create a new client with explicit API key and no request timeout
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Builder: Bound every request by `timeout`
    ///
    /// # Errors
    ///
    /// Returns `ClaudeError::ClientBuild` if the HTTP client cannot be built
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ClaudeError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClaudeError::ClientBuild(e.to_string()))?;
        Ok(self)
    }

    /// Builder: Point the client at a different API root (proxies, tests)
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create messages (non-streaming)
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, timeouts, API errors, or parsing failures
    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    pub async fn messages(&self, request: MessagesRequest) -> Result<MessagesResponse, ClaudeError> {
        let response = self.client
            .post(format!("{}/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClaudeError::Timeout
                } else {
                    ClaudeError::RequestFailed(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::OK => {
                let parsed = response.json::<MessagesResponse>().await
                    .map_err(|e| ClaudeError::ResponseParseFailed(e.to_string()))?;
                tracing::debug!(
                    input_tokens = parsed.usage.input_tokens,
                    output_tokens = parsed.usage.output_tokens,
                    "Claude response received"
                );
                Ok(parsed)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Err(ClaudeError::RateLimited)
            }
            StatusCode::UNAUTHORIZED => {
                Err(ClaudeError::Unauthorized)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClaudeError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            }
        }
    }
}
