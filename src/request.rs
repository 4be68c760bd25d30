//! Generation request/response types
//!
//! These are created per call and carry no cross-call state. The attempt
//! trail records every provider tried during a single logical request.

use crate::error::ProviderErrorKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A generic text-generation request, consumed read-only by the router
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// User prompt
    pub prompt: String,
    /// Optional system prompt
    pub system: Option<String>,
    /// Maximum tokens to generate; falls back to the provider default
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Caller-supplied id for idempotent logging and tracing
    pub request_id: String,
}

impl GenerationRequest {
    /// Create a new request with a generated request id
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: None,
            temperature: None,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the generated request id with a caller-supplied one
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Outcome of a single provider attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// The provider returned a usable completion
    Success,
    /// The provider failed or was denied locally
    Failure,
}

/// One entry in the attempt trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Provider name
    pub provider: String,
    /// Whether the attempt succeeded
    pub outcome: AttemptOutcome,
    /// Observed latency; zero for local rate-limit denials
    pub latency_ms: u64,
    /// Failure classification, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProviderErrorKind>,
}

impl Attempt {
    /// Record a successful attempt
    #[must_use]
    pub fn success(provider: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            provider: provider.into(),
            outcome: AttemptOutcome::Success,
            latency_ms,
            error_kind: None,
        }
    }

    /// Record a failed attempt
    #[must_use]
    pub fn failure(provider: impl Into<String>, latency_ms: u64, kind: ProviderErrorKind) -> Self {
        Self {
            provider: provider.into(),
            outcome: AttemptOutcome::Failure,
            latency_ms,
            error_kind: Some(kind),
        }
    }
}

/// Token usage information, when the provider reports it
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// A normalized completion returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Name of the provider that served the request
    pub provider: String,
    /// Normalized text content
    pub content: String,
    /// Token usage, if the provider reported it
    pub usage: Option<TokenUsage>,
    /// Ordered record of every provider tried, successful attempt last
    pub trail: Vec<Attempt>,
}
