//! HTTP client for the Anthropic Messages API.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::anthropic::sse::SseDecoder;
use crate::anthropic::types::{ErrorResponse, MessagesRequest, MessagesResponse, StreamEvent};
use crate::config::AnthropicConfig;

#[derive(Error, Debug)]
pub enum AnthropicError {
    #[error("ANTHROPIC_API_KEY not configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Anthropic API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Upstream stream error: {0}")]
    Stream(String),
}

/// Stream of decoded events from a streaming request.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, AnthropicError>> + Send>>;

/// Something that can answer chat requests. Implemented by
/// [`AnthropicClient`]; tests substitute their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a request and wait for the whole response.
    async fn create(&self, request: MessagesRequest) -> Result<MessagesResponse, AnthropicError>;

    /// Send a request and stream the response events.
    async fn stream(&self, request: MessagesRequest) -> Result<EventStream, AnthropicError>;
}

/// Explicitly constructed handle to the Anthropic API.
#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    api_version: String,
    api_key: String,
}

impl AnthropicClient {
    /// Build a client. Fails with [`AnthropicError::MissingApiKey`] if neither
    /// the config nor the environment provides a key.
    pub fn new(config: &AnthropicConfig, timeout: Duration) -> Result<Self, AnthropicError> {
        let api_key = config
            .resolve_api_key()
            .ok_or(AnthropicError::MissingApiKey)?;

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            api_version: config.api_version.clone(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &MessagesRequest) -> Result<reqwest::Response, AnthropicError> {
        debug!(
            model = request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending upstream request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|err| err.error.message)
            .unwrap_or(body);

        Err(AnthropicError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatBackend for AnthropicClient {
    async fn create(&self, mut request: MessagesRequest) -> Result<MessagesResponse, AnthropicError> {
        request.stream = false;
        let response = self.send(&request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn stream(&self, mut request: MessagesRequest) -> Result<EventStream, AnthropicError> {
        request.stream = true;
        let response = self.send(&request).await?;

        let mut decoder = SseDecoder::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| -> Vec<Result<StreamEvent, AnthropicError>> {
                match chunk {
                    Ok(bytes) => decoder
                        .push(&bytes)
                        .into_iter()
                        .map(|data| match serde_json::from_str::<StreamEvent>(&data) {
                            Ok(StreamEvent::Error { error }) => {
                                Err(AnthropicError::Stream(error.message))
                            }
                            other => other.map_err(AnthropicError::from),
                        })
                        .collect(),
                    Err(err) => vec![Err(AnthropicError::Http(err))],
                }
            })
            .flat_map(stream::iter);

        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_fails_construction() {
        let config = AnthropicConfig {
            api_key: Some(String::new()),
            ..AnthropicConfig::default()
        };
        let err = AnthropicClient::new(&config, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, AnthropicError::MissingApiKey));
        assert_eq!(err.to_string(), "ANTHROPIC_API_KEY not configured");
    }

    #[test]
    fn test_endpoint_and_debug_hide_key() {
        let config = AnthropicConfig {
            base_url: "http://localhost:9999/".to_string(),
            api_key: Some("sk-secret".to_string()),
            ..AnthropicConfig::default()
        };
        let client = AnthropicClient::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9999/v1/messages");
        assert!(!format!("{client:?}").contains("sk-secret"));
    }
}
