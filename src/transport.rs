//! HTTP transport seam
//!
//! The fallback engine talks to providers through the [`Transport`]
//! trait, so the whole failover path is testable without sockets. The
//! production implementation keeps one long-lived `reqwest::Client` per
//! provider, created once at startup and shared by all callers; the
//! connection pool is never rebuilt per call.

use crate::error::{Error, Result};
use crate::registry::Registry;
use reqwest::Client;
use std::collections::HashMap;
use thiserror::Error as ThisError;
use tracing::debug;

/// Provider-specific payload produced by an adapter
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// Provider the payload is addressed to; selects the client pool
    pub provider: String,
    /// Full request URL (may embed a credential as a query parameter;
    /// never log it raw)
    pub url: String,
    /// Header name/value pairs, credentials included
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: serde_json::Value,
}

/// Raw provider response before adapter parsing
#[derive(Debug, Clone)]
pub struct WireResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, read to completion
    pub body: String,
}

/// Transport-level failure, before any status interpretation
#[derive(Debug, Clone, ThisError)]
pub enum TransportError {
    /// The provider's configured timeout elapsed
    #[error("request timed out")]
    Timeout,
    /// Connection or protocol failure below HTTP semantics
    #[error("connection failed: {0}")]
    Connect(String),
}

/// Executes a wire request against a provider endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and read the full response body
    async fn execute(&self, request: WireRequest)
        -> std::result::Result<WireResponse, TransportError>;
}

/// Production transport with one client (connection pool) per provider
pub struct HttpTransport {
    clients: HashMap<String, Client>,
}

impl HttpTransport {
    /// Build one client per registered provider, each carrying that
    /// provider's timeout
    pub fn from_registry(registry: &Registry) -> Result<Self> {
        let mut clients = HashMap::with_capacity(registry.len());
        for descriptor in registry.list() {
            let client = Client::builder()
                .timeout(descriptor.timeout)
                .build()
                .map_err(|e| {
                    Error::Config(format!(
                        "failed to build HTTP client for '{}': {e}",
                        descriptor.name
                    ))
                })?;
            clients.insert(descriptor.name.clone(), client);
        }
        Ok(Self { clients })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: WireRequest,
    ) -> std::result::Result<WireResponse, TransportError> {
        let client = self
            .clients
            .get(&request.provider)
            .ok_or_else(|| TransportError::Connect(format!("no client for '{}'", request.provider)))?;

        debug!(provider = %request.provider, "dispatching provider request");

        let mut builder = client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        Ok(WireResponse { status, body })
    }
}
