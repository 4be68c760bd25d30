//! Wire-format adapters
//!
//! One module per protocol family, each translating the generic
//! [`GenerationRequest`] into a provider-specific payload and translating
//! the provider response (or error) back into a normalized completion.
//! Dispatch is a closed match over [`AdapterKind`]: adding a provider is
//! a new registry entry, and a new adapter only if it speaks a new wire
//! format.

use crate::error::{ProviderError, ProviderErrorKind};
use crate::registry::ProviderDescriptor;
use crate::request::{GenerationRequest, TokenUsage};
use crate::transport::WireRequest;
use crate::util::redact_error;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod cohere;
pub mod custom;
pub mod google;
pub mod openai;

/// Wire protocol family a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// OpenAI `/chat/completions` and the many compatible gateways
    #[serde(rename = "openai_chat")]
    OpenAiChatCompatible,
    /// Anthropic `/v1/messages`
    #[serde(rename = "anthropic_messages")]
    AnthropicMessages,
    /// Google `models/{model}:generateContent`
    #[serde(rename = "google_generative")]
    GoogleGenerative,
    /// Cohere `/v2/chat`
    #[serde(rename = "cohere_v2")]
    CohereV2,
    /// Plain prompt/response endpoints such as local Ollama-style servers
    #[serde(rename = "custom_sdk")]
    CustomSdk,
}

/// Normalized completion produced by `parse`
#[derive(Debug, Clone)]
pub struct Completion {
    /// Extracted text content
    pub content: String,
    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
}

/// Build the provider-specific payload and headers for a request
#[must_use]
pub fn build(
    descriptor: &ProviderDescriptor,
    request: &GenerationRequest,
    api_key: &str,
) -> WireRequest {
    match descriptor.adapter {
        AdapterKind::OpenAiChatCompatible => openai::build(descriptor, request, api_key),
        AdapterKind::AnthropicMessages => anthropic::build(descriptor, request, api_key),
        AdapterKind::GoogleGenerative => google::build(descriptor, request, api_key),
        AdapterKind::CohereV2 => cohere::build(descriptor, request, api_key),
        AdapterKind::CustomSdk => custom::build(descriptor, request, api_key),
    }
}

/// Parse a provider response into a normalized completion.
///
/// Non-2xx statuses are mapped to a [`ProviderErrorKind`] uniformly
/// across families; body extraction is family-specific. All error text is
/// redacted before it leaves this module.
pub fn parse(
    descriptor: &ProviderDescriptor,
    status: u16,
    body: &str,
    api_key: &str,
) -> Result<Completion, ProviderError> {
    if !(200..300).contains(&status) {
        return Err(error_from_status(descriptor, status, body, api_key));
    }
    let parsed = match descriptor.adapter {
        AdapterKind::OpenAiChatCompatible => openai::parse_body(body),
        AdapterKind::AnthropicMessages => anthropic::parse_body(body),
        AdapterKind::GoogleGenerative => google::parse_body(body),
        AdapterKind::CohereV2 => cohere::parse_body(body),
        AdapterKind::CustomSdk => custom::parse_body(body),
    };
    parsed.map_err(|message| {
        ProviderError::new(
            &descriptor.name,
            ProviderErrorKind::InvalidResponse,
            redact_error(&message, api_key),
        )
    })
}

/// Map an HTTP status to a failure kind
#[must_use]
pub fn kind_for_status(status: u16) -> ProviderErrorKind {
    match status {
        401 | 403 => ProviderErrorKind::AuthFailure,
        402 => ProviderErrorKind::QuotaExceeded,
        429 => ProviderErrorKind::RateLimited,
        500..=599 => ProviderErrorKind::Transient5xx,
        _ => ProviderErrorKind::InvalidResponse,
    }
}

fn error_from_status(
    descriptor: &ProviderDescriptor,
    status: u16,
    body: &str,
    api_key: &str,
) -> ProviderError {
    let detail = extract_error_message(body).unwrap_or_else(|| body.to_string());
    ProviderError::new(
        &descriptor.name,
        kind_for_status(status),
        redact_error(&format!("HTTP {status}: {detail}"), api_key),
    )
}

// Most providers wrap errors as {"error": {"message": ...}} or
// {"error": "..."}; pull the message out so trails stay readable.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}
