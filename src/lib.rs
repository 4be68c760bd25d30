//! llm-relay - Multi-Provider LLM Failover Router
//!
//! This crate routes text-generation requests across a configured fleet
//! of LLM providers:
//! - Registry: immutable provider descriptors loaded from TOML
//! - Limiter: per-provider token-bucket rate limiting (minute + day)
//! - Health: circuit breaker and latency/success statistics
//! - Adapters: wire formats for OpenAI, Anthropic, Google, Cohere, and
//!   Ollama-style local endpoints
//! - Strategy: candidate ordering (priority, fastest, round-robin,
//!   intelligent scoring)
//! - Router: the failover engine tying it all together
//! - Metrics: structured per-attempt and per-call events

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
pub mod config;
pub mod error;
pub mod health;
pub mod limiter;
pub mod metrics;
pub mod registry;
pub mod request;
pub mod router;
pub mod secrets;
pub mod strategy;
pub mod transport;
mod util;

pub use adapters::{AdapterKind, Completion};
pub use config::{BreakerConfig, ProviderConfig, RouterConfig};
pub use error::{AggregateError, Error, ProviderError, ProviderErrorKind, Result};
pub use health::{CircuitState, ProviderStatus};
pub use metrics::{AttemptEvent, CallEvent, CallOutcome, MetricsSink, TracingMetrics};
pub use registry::{ProviderDescriptor, Registry};
pub use request::{
    Attempt, AttemptOutcome, GenerationRequest, GenerationResult, TokenUsage,
};
pub use router::FallbackRouter;
pub use secrets::{EnvSecretStore, SecretStore};
pub use strategy::SelectionPolicy;
pub use transport::{HttpTransport, Transport, TransportError, WireRequest, WireResponse};
