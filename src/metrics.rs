//! Metric event emission
//!
//! The router emits one event per attempt and one per completed call;
//! the actual metrics backend is an external collaborator behind the
//! [`MetricsSink`] trait. The default sink renders events as structured
//! tracing records.

use crate::error::ProviderErrorKind;
use crate::request::AttemptOutcome;
use serde::Serialize;
use tracing::info;

/// Emitted after every attempt, including local rate-limit denials
#[derive(Debug, Clone, Serialize)]
pub struct AttemptEvent {
    /// Provider attempted
    pub provider: String,
    /// Attempt outcome
    pub outcome: AttemptOutcome,
    /// Observed latency; zero for local denials
    pub latency_ms: u64,
    /// Failure classification, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProviderErrorKind>,
}

/// Terminal outcome of a `generate` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// A provider returned a completion
    Success,
    /// Every candidate was attempted and failed
    Exhausted,
    /// Caller cancellation or deadline expiry
    Cancelled,
}

/// Emitted once per completed `generate` call
#[derive(Debug, Clone, Serialize)]
pub struct CallEvent {
    /// Caller-supplied request id
    pub request_id: String,
    /// Number of providers that produced a trail entry
    pub providers_tried: u32,
    /// Terminal outcome
    pub outcome: CallOutcome,
    /// End-to-end latency of the call
    pub total_latency_ms: u64,
}

/// Sink for router metric events
pub trait MetricsSink: Send + Sync {
    /// One provider attempt finished
    fn attempt(&self, event: &AttemptEvent);
    /// One `generate` call finished
    fn call(&self, event: &CallEvent);
}

/// Default sink that emits structured tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn attempt(&self, event: &AttemptEvent) {
        info!(
            target: "llm_relay::metrics",
            provider = %event.provider,
            outcome = ?event.outcome,
            latency_ms = event.latency_ms,
            error_kind = event.error_kind.map(|k| k.as_str()),
            "attempt"
        );
    }

    fn call(&self, event: &CallEvent) {
        info!(
            target: "llm_relay::metrics",
            request_id = %event.request_id,
            providers_tried = event.providers_tried,
            outcome = ?event.outcome,
            total_latency_ms = event.total_latency_ms,
            "generate"
        );
    }
}
