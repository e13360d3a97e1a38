//! Outbound HTTP to providers
//!
//! The router hands a fully-built [`ProviderRequest`] to a [`ProviderTransport`].
//! [`HttpTransport`] is the reqwest-backed implementation; tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::types::ProviderKind;

/// A single provider call, ready to send
#[derive(Clone)]
pub struct ProviderRequest {
    pub provider: ProviderKind,
    pub url: String,
    /// Query parameters. May carry the API key, so never logged.
    pub query: Vec<(&'static str, String)>,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl std::fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| *k).collect();
        let query_names: Vec<&str> = self.query.iter().map(|(k, _)| *k).collect();
        f.debug_struct("ProviderRequest")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("query", &query_names)
            .field("headers", &header_names)
            .finish()
    }
}

/// Transport-level failure talking to a provider
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid JSON in response: {0}")]
    Decode(String),
}

/// Sends provider requests and returns the decoded JSON body
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn send(&self, request: &ProviderRequest) -> Result<Value, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport. `None` keeps reqwest's default (no overall timeout).
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderTransport for HttpTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<Value, TransportError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        debug!(
            "{} responded with status {} ({} bytes)",
            request.provider,
            status,
            text.len()
        );

        let parsed = serde_json::from_str::<Value>(&text);

        if !status.is_success() {
            let message = parsed
                .ok()
                .as_ref()
                .and_then(api_error_message)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "Unknown API Error".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        parsed.map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// `error.message` from a provider error body. Gemini wraps single errors in an array.
fn api_error_message(body: &Value) -> Option<String> {
    let error = match body {
        Value::Array(items) => items.first()?.get("error")?,
        _ => body.get("error")?,
    };
    match error {
        Value::String(s) => Some(s.clone()),
        _ => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
