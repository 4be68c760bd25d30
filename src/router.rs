//! Fallback engine
//!
//! The orchestrating core: orders candidates, attempts each in turn with
//! a per-attempt timeout, records outcomes into the health tracker, and
//! returns on first success or an aggregated failure once every
//! candidate has been exhausted. No other component may implement its
//! own retry logic against the provider set, and a single `generate`
//! call never retries the same provider twice.

use crate::adapters;
use crate::config::RouterConfig;
use crate::error::{AggregateError, Error, ProviderErrorKind, Result};
use crate::health::{BreakerSettings, HealthTracker, ProviderStatus};
use crate::limiter::RateLimiter;
use crate::metrics::{AttemptEvent, CallEvent, CallOutcome, MetricsSink, TracingMetrics};
use crate::registry::{ProviderDescriptor, Registry};
use crate::request::{Attempt, GenerationRequest, GenerationResult};
use crate::secrets::{EnvSecretStore, SecretStore};
use crate::strategy::{self, SelectionPolicy};
use crate::transport::{HttpTransport, Transport, TransportError, WireResponse};
use crate::util::mask_api_key;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Multi-provider failover router
pub struct FallbackRouter {
    registry: Arc<Registry>,
    limiter: RateLimiter,
    health: Arc<HealthTracker>,
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn MetricsSink>,
    policy: SelectionPolicy,
    round_robin_cursor: AtomicUsize,
    // provider name -> resolved API key; providers whose key could not be
    // resolved are disabled at construction
    api_keys: HashMap<String, String>,
    deadline: Option<Duration>,
}

impl fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: HashMap<&str, String> = self
            .api_keys
            .iter()
            .map(|(name, key)| (name.as_str(), mask_api_key(key)))
            .collect();
        f.debug_struct("FallbackRouter")
            .field("providers", &self.registry.len())
            .field("policy", &self.policy)
            .field("api_keys", &masked)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl FallbackRouter {
    /// Build a router from configuration, resolving credentials from the
    /// process environment
    pub fn new(config: &RouterConfig) -> Result<Self> {
        Self::with_secret_store(config, &EnvSecretStore)
    }

    /// Build a router with an explicit secret store
    pub fn with_secret_store(config: &RouterConfig, secrets: &dyn SecretStore) -> Result<Self> {
        let registry = Arc::new(Registry::from_config(config)?);
        let limiter = RateLimiter::from_registry(&registry);
        let health = Arc::new(HealthTracker::from_registry(
            &registry,
            BreakerSettings::from(&config.breaker),
        ));
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_registry(&registry)?);

        let mut api_keys = HashMap::with_capacity(registry.len());
        for descriptor in registry.list() {
            match secrets.resolve(&descriptor.api_key_env) {
                Some(key) => {
                    api_keys.insert(descriptor.name.clone(), key);
                }
                // Local endpoints commonly run keyless; anything else
                // without a credential is unusable until an admin reset.
                None if descriptor.adapter == adapters::AdapterKind::CustomSdk => {
                    api_keys.insert(descriptor.name.clone(), String::new());
                }
                None => {
                    warn!(
                        provider = %descriptor.name,
                        reference = %descriptor.api_key_env,
                        "credential not resolvable, disabling provider"
                    );
                    api_keys.insert(descriptor.name.clone(), String::new());
                    health.disable(&descriptor.name);
                }
            }
        }

        Ok(Self {
            registry,
            limiter,
            health,
            transport,
            metrics: Arc::new(TracingMetrics),
            policy: config.policy,
            round_robin_cursor: AtomicUsize::new(0),
            api_keys,
            deadline: config.request_deadline(),
        })
    }

    /// Replace the transport (used by tests and embedders)
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the metrics sink
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Generate text, failing over across providers until one succeeds
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult> {
        self.generate_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Generate with a caller-supplied cancellation token.
    ///
    /// Cancellation aborts the in-flight network call, records that
    /// attempt as a timeout so health statistics stay accurate for
    /// abandoned calls, and returns [`Error::Cancelled`] carrying the
    /// partial attempt trail.
    #[instrument(skip(self, request, cancel), fields(request_id = %request.request_id))]
    pub async fn generate_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResult> {
        let call_start = Instant::now();
        let deadline_at = self.deadline.map(|d| tokio::time::Instant::now() + d);

        let candidates: Vec<&ProviderDescriptor> = self
            .registry
            .list()
            .iter()
            .filter(|descriptor| descriptor.enabled)
            .filter(|descriptor| {
                self.health
                    .snapshot(&descriptor.name)
                    .map_or(false, |snapshot| !snapshot.disabled)
            })
            .collect();

        let ordered = strategy::order(self.policy, candidates, &self.health, &self.round_robin_cursor);
        debug!(candidates = ordered.len(), "candidate order computed");

        let mut trail: Vec<Attempt> = Vec::with_capacity(ordered.len());

        for descriptor in ordered {
            if cancel.is_cancelled() || deadline_passed(deadline_at) {
                return self.finish_cancelled(&request, trail, call_start);
            }

            let name = descriptor.name.as_str();

            // Local admission check; a denial is an attempt-trail entry
            // but not a health observation. A spent local budget says
            // nothing about provider-side health.
            if !self.limiter.allow(name) {
                debug!(provider = name, "local rate limit denied candidate");
                let attempt = Attempt::failure(name, 0, ProviderErrorKind::RateLimited);
                self.emit_attempt(&attempt);
                trail.push(attempt);
                continue;
            }

            // Circuit check; ordering already pushed open circuits to the
            // tail, so skipping here records nothing (no double penalty).
            if !self.health.is_eligible(name) {
                debug!(provider = name, "circuit not eligible, skipping");
                continue;
            }

            let api_key = self.api_keys.get(name).cloned().unwrap_or_default();
            let wire = adapters::build(descriptor, &request, &api_key);

            let attempt_start = Instant::now();
            let response = tokio::select! {
                response = self.transport.execute(wire) => Some(response),
                () = cancel.cancelled() => None,
                () = sleep_until_deadline(deadline_at) => None,
            };
            let latency_ms = attempt_start.elapsed().as_millis() as u64;

            let Some(response) = response else {
                // The in-flight attempt still counts against the provider.
                self.health.record_outcome(name, false, latency_ms);
                let attempt = Attempt::failure(name, latency_ms, ProviderErrorKind::Timeout);
                self.emit_attempt(&attempt);
                trail.push(attempt);
                return self.finish_cancelled(&request, trail, call_start);
            };

            match self.interpret(descriptor, response, &api_key) {
                Ok(content) => {
                    self.health.record_outcome(name, true, latency_ms);
                    let attempt = Attempt::success(name, latency_ms);
                    self.emit_attempt(&attempt);
                    trail.push(attempt);

                    info!(provider = name, latency_ms, "generation served");
                    self.emit_call(&request, &trail, CallOutcome::Success, call_start);
                    return Ok(GenerationResult {
                        provider: name.to_string(),
                        content: content.content,
                        usage: content.usage,
                        trail,
                    });
                }
                Err(error) => {
                    self.health.record_outcome(name, false, latency_ms);
                    if error.kind == ProviderErrorKind::AuthFailure {
                        // A misconfigured credential does not recover on
                        // retry; keep this provider out of future orders.
                        self.health.disable(name);
                    }
                    warn!(provider = name, kind = %error.kind, %error, "attempt failed");
                    let attempt = Attempt::failure(name, latency_ms, error.kind);
                    self.emit_attempt(&attempt);
                    trail.push(attempt);
                }
            }
        }

        self.emit_call(&request, &trail, CallOutcome::Exhausted, call_start);
        Err(Error::Exhausted(AggregateError::new(trail)))
    }

    /// Status rows for dashboards and observability consumers
    #[must_use]
    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        self.health.statuses()
    }

    /// Administrative reset of a provider disabled by an auth failure or
    /// held open by its circuit. Returns false for unknown providers.
    pub fn reset_provider(&self, name: &str) -> bool {
        self.health.reset(name)
    }

    /// The registry this router serves
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn interpret(
        &self,
        descriptor: &ProviderDescriptor,
        response: std::result::Result<WireResponse, TransportError>,
        api_key: &str,
    ) -> std::result::Result<adapters::Completion, crate::error::ProviderError> {
        match response {
            Ok(wire) => adapters::parse(descriptor, wire.status, &wire.body, api_key),
            Err(TransportError::Timeout) => Err(crate::error::ProviderError::new(
                &descriptor.name,
                ProviderErrorKind::Timeout,
                "request timed out",
            )),
            // Connection failures are transient infrastructure errors,
            // not a distinct kind in the taxonomy.
            Err(TransportError::Connect(message)) => Err(crate::error::ProviderError::new(
                &descriptor.name,
                ProviderErrorKind::Transient5xx,
                crate::util::redact_error(&message, api_key),
            )),
        }
    }

    fn finish_cancelled(
        &self,
        request: &GenerationRequest,
        trail: Vec<Attempt>,
        call_start: Instant,
    ) -> Result<GenerationResult> {
        self.emit_call(request, &trail, CallOutcome::Cancelled, call_start);
        Err(Error::Cancelled(AggregateError::new(trail)))
    }

    fn emit_attempt(&self, attempt: &Attempt) {
        self.metrics.attempt(&AttemptEvent {
            provider: attempt.provider.clone(),
            outcome: attempt.outcome,
            latency_ms: attempt.latency_ms,
            error_kind: attempt.error_kind,
        });
    }

    fn emit_call(
        &self,
        request: &GenerationRequest,
        trail: &[Attempt],
        outcome: CallOutcome,
        call_start: Instant,
    ) {
        self.metrics.call(&CallEvent {
            request_id: request.request_id.clone(),
            providers_tried: trail.len() as u32,
            outcome,
            total_latency_ms: call_start.elapsed().as_millis() as u64,
        });
    }
}

fn deadline_passed(deadline_at: Option<tokio::time::Instant>) -> bool {
    deadline_at.is_some_and(|at| tokio::time::Instant::now() >= at)
}

async fn sleep_until_deadline(deadline_at: Option<tokio::time::Instant>) {
    match deadline_at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
