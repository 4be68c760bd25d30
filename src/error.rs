//! Error types for llm-relay
//!
//! Individual provider failures are never surfaced directly to callers;
//! they are absorbed by the fallback loop and only reported as part of
//! an [`AggregateError`] once every candidate has been tried.

use crate::request::Attempt;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a single provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// 401/403, a bad or revoked credential; the provider is disabled
    /// for the rest of the process once this is observed
    AuthFailure,
    /// 429 from the provider, or a local token-bucket denial
    RateLimited,
    /// The request exceeded the provider's configured timeout, or the
    /// caller cancelled while it was in flight
    Timeout,
    /// 5xx from the provider, or a failed connection attempt
    Transient5xx,
    /// The response body did not match the provider's documented shape
    InvalidResponse,
    /// 402 or an explicit quota-exhausted response
    QuotaExceeded,
}

impl ProviderErrorKind {
    /// Stable string label used in logs and metric events
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailure => "auth_failure",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Transient5xx => "transient_5xx",
            Self::InvalidResponse => "invalid_response",
            Self::QuotaExceeded => "quota_exceeded",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single provider attempt failure.
///
/// The message has already been redacted by the adapter layer; raw
/// provider bodies and credentials never reach this type.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {kind}: {message}")]
pub struct ProviderError {
    /// Name of the provider that failed
    pub provider: String,
    /// Failure classification
    pub kind: ProviderErrorKind,
    /// Redacted, truncated message
    pub message: String,
}

impl ProviderError {
    /// Create a new provider error from an already-redacted message
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }
}

/// The full attempt trail of a `generate` call that did not succeed
#[derive(Debug, Clone, Default)]
pub struct AggregateError {
    /// Every attempt made before the call terminated, in order
    pub attempts: Vec<Attempt>,
}

impl AggregateError {
    /// Create an aggregate error from an attempt trail
    #[must_use]
    pub fn new(attempts: Vec<Attempt>) -> Self {
        Self { attempts }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} provider(s) attempted", self.attempts.len())?;
        if self.attempts.is_empty() {
            return Ok(());
        }
        write!(f, ": ")?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match attempt.error_kind {
                Some(kind) => write!(f, "{}={}", attempt.provider, kind)?,
                None => write!(f, "{}=ok", attempt.provider)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete provider configuration; fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Every candidate provider was attempted and failed
    #[error("all providers exhausted: {0}")]
    Exhausted(AggregateError),

    /// The caller cancelled the call, or the request deadline elapsed,
    /// before any provider succeeded
    #[error("generation cancelled: {0}")]
    Cancelled(AggregateError),
}

impl Error {
    /// The attempt trail carried by exhaustion and cancellation errors
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::Exhausted(agg) | Self::Cancelled(agg) => &agg.attempts,
            Self::Config(_) => &[],
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
