//! Client module - one chat-completion request with classification and retry
//!
//! [`RequestClient`] builds one request payload per attempt, sends it through
//! a [`ChatEndpoint`], classifies non-success responses into
//! [`ApiError`](crate::error::ApiError) kinds, and retries `overloaded`
//! failures against a fixed ascending delay sequence. Each wait is announced
//! through the injected [`AgentObserver`](crate::observer::AgentObserver) so
//! the host can show a countdown. No state is retained between calls.
//!
//! The HTTP transport lives behind the [`ChatEndpoint`] trait; tests
//! substitute scripted endpoints.

pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Config;
use crate::conversation::Message;
use crate::error::{ApiError, ApiErrorKind, QuillError, Result};
use crate::observer::AgentObserver;
use crate::tools::ToolSpec;

pub use wire::{ApiRequest, ModelResponse, StopReason, SystemBlock, Usage};

/// The API version header value.
const API_VERSION: &str = "2023-06-01";

/// Classify an HTTP failure status plus its parsed error body into a
/// structured [`ApiError`].
///
/// The explicit "server temporarily overloaded" signal (HTTP 529 or an
/// `overloaded_error` body) is the only retryable classification.
pub fn classify_response(
    status: u16,
    error_type: &str,
    message: &str,
    retry_after: Option<u64>,
) -> ApiError {
    let kind = if status == 529 || error_type == "overloaded_error" {
        ApiErrorKind::Overloaded
    } else {
        match status {
            429 => ApiErrorKind::RateLimited,
            400 => ApiErrorKind::InvalidRequest,
            401 => ApiErrorKind::Unauthenticated,
            500..=599 => ApiErrorKind::ServerError,
            _ => ApiErrorKind::Unknown,
        }
    };

    let mut err = ApiError::new(status, kind, message);
    if let Some(seconds) = retry_after {
        err = err.with_retry_after(seconds);
    }
    err
}

/// Transport seam for the chat-completion endpoint.
///
/// [`HttpEndpoint`] is the production implementation; tests use scripted
/// endpoints to drive the client and the agent loop without a network.
#[async_trait]
pub trait ChatEndpoint: Send + Sync {
    /// Send one request and return the parsed response, or a classified
    /// error for non-success statuses.
    async fn complete(&self, request: &ApiRequest) -> Result<ModelResponse>;
}

/// HTTPS transport for the model endpoint.
pub struct HttpEndpoint {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpEndpoint {
    /// Create a new endpoint with the given API key and URL.
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl ChatEndpoint for HttpEndpoint {
    async fn complete(&self, request: &ApiRequest) -> Result<ModelResponse> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();

            let (error_type, message) =
                match serde_json::from_str::<wire::ApiErrorEnvelope>(&body) {
                    Ok(envelope) => (envelope.error.error_type, envelope.error.message),
                    Err(_) => (String::new(), body),
                };

            return Err(QuillError::from(classify_response(
                status,
                &error_type,
                &message,
                retry_after,
            )));
        }

        Ok(response.json::<ModelResponse>().await?)
    }
}

/// Sends chat-completion requests with bounded retry on overload.
///
/// The retry policy is a fixed ordered delay sequence consumed
/// left-to-right, one entry per failed attempt; after exhaustion the
/// classified error surfaces to the caller. Only `overloaded` failures are
/// retried — rate limits carry a wait hint the host should respect instead.
pub struct RequestClient {
    endpoint: Box<dyn ChatEndpoint>,
    model: String,
    max_tokens: u32,
    cache_system_prompt: bool,
    retry_delays: Vec<Duration>,
}

impl RequestClient {
    /// Create a client over the real HTTPS endpoint.
    ///
    /// # Errors
    /// Returns a configuration error if no API key is set.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                QuillError::Config(
                    "No API key configured; set QUILLCLAW_API_KEY or api.api_key".to_string(),
                )
            })?;
        let endpoint = HttpEndpoint::new(api_key, &config.api.base_url);
        Ok(Self::with_endpoint(Box::new(endpoint), config))
    }

    /// Create a client over a custom endpoint (tests, proxies).
    pub fn with_endpoint(endpoint: Box<dyn ChatEndpoint>, config: &Config) -> Self {
        Self {
            endpoint,
            model: config.api.model.clone(),
            max_tokens: config.api.max_tokens,
            cache_system_prompt: config.api.cache_system_prompt,
            retry_delays: config
                .api
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }

    /// Send one chat-completion request, retrying overloaded responses.
    ///
    /// # Arguments
    /// * `messages` - Bounded conversation history
    /// * `system` - System prompt (already summary-prefixed by the caller)
    /// * `tools` - Tool catalog; omitted from the payload when empty
    /// * `observer` - Receives a notification before each retry wait
    ///
    /// # Errors
    /// Returns the classified [`ApiError`] for terminal failures, or a
    /// transport error for connection-level problems.
    pub async fn send(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolSpec],
        observer: &dyn AgentObserver,
    ) -> Result<ModelResponse> {
        let mut attempt = 0usize;
        loop {
            // One payload per attempt; nothing is carried over between calls.
            let request = self.build_request(messages, system, tools);
            match self.endpoint.complete(&request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let retryable =
                        matches!(&err, QuillError::Api(api) if api.is_retryable());
                    if !retryable || attempt >= self.retry_delays.len() {
                        return Err(err);
                    }

                    let delay = self.retry_delays[attempt];
                    attempt += 1;
                    warn!(
                        attempt = attempt,
                        max_attempts = self.retry_delays.len(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Model endpoint overloaded, retrying"
                    );
                    observer.retry_wait(attempt, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolSpec],
    ) -> ApiRequest {
        ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: messages.to_vec(),
            system: system.map(|text| vec![SystemBlock::new(text, self.cache_system_prompt)]),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
        }
    }
}
