//! End-to-end failover behavior against a scripted transport.

use async_trait::async_trait;
use llm_relay::{
    AttemptOutcome, CircuitState, Error, FallbackRouter, GenerationRequest, ProviderErrorKind,
    RouterConfig, SecretStore, Transport, TransportError, WireRequest, WireResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Secret store backed by a fixed map, so tests never touch process env.
struct FixedSecrets(HashMap<String, String>);

impl FixedSecrets {
    fn for_providers(names: &[&str]) -> Self {
        let map = names
            .iter()
            .map(|n| (format!("{}_KEY", n.to_uppercase()), format!("sk-{n}-0123456789")))
            .collect();
        Self(map)
    }
}

impl SecretStore for FixedSecrets {
    fn resolve(&self, reference: &str) -> Option<String> {
        self.0.get(reference).cloned()
    }
}

/// Transport that replays a per-provider script of canned responses and
/// records the order providers were called in.
struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<WireResponse, TransportError>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, provider: &str, reply: Result<WireResponse, TransportError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_default()
            .push_back(reply);
    }

    fn push_ok(&self, provider: &str, status: u16, body: &str) {
        self.push(
            provider,
            Ok(WireResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        self.calls.lock().unwrap().push(request.provider.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&request.provider)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted reply for {}", request.provider))
    }
}

/// Transport whose requests never complete; used to exercise cancellation.
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn execute(&self, _request: WireRequest) -> Result<WireResponse, TransportError> {
        std::future::pending().await
    }
}

fn config(extra: &str) -> RouterConfig {
    let toml = format!(
        r#"
policy = "priority"
{extra}

[[providers]]
name = "alpha"
tier = 1
endpoint = "https://alpha.example.com/v1"
api_key_env = "ALPHA_KEY"
adapter = "openai_chat"
default_model = "alpha-large"

[[providers]]
name = "beta"
tier = 2
endpoint = "https://beta.example.com/v1"
api_key_env = "BETA_KEY"
adapter = "openai_chat"
default_model = "beta-large"
"#
    );
    RouterConfig::from_toml_str(&toml).expect("valid config")
}

fn ok_body(text: &str) -> String {
    format!(
        r#"{{"choices": [{{"message": {{"role": "assistant", "content": "{text}"}}}}],
            "usage": {{"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}}}}"#
    )
}

fn router(config: &RouterConfig, transport: Arc<dyn Transport>) -> FallbackRouter {
    let secrets = FixedSecrets::for_providers(&["alpha", "beta"]);
    FallbackRouter::with_secret_store(config, &secrets)
        .expect("router construction")
        .with_transport(transport)
}

#[tokio::test]
async fn failover_serves_from_secondary_after_primary_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok("alpha", 503, r#"{"error": {"message": "overloaded"}}"#);
    transport.push_ok("beta", 200, &ok_body("served by beta"));

    let router = router(&config(""), transport.clone());
    let result = router
        .generate(GenerationRequest::new("describe failover"))
        .await
        .expect("beta should serve");

    assert_eq!(result.provider, "beta");
    assert_eq!(result.content, "served by beta");
    assert_eq!(result.usage.as_ref().unwrap().total_tokens, 8);
    assert_eq!(transport.calls(), vec!["alpha", "beta"]);

    assert_eq!(result.trail.len(), 2);
    assert_eq!(result.trail[0].provider, "alpha");
    assert_eq!(
        result.trail[0].error_kind,
        Some(ProviderErrorKind::Transient5xx)
    );
    assert_eq!(result.trail[1].outcome, AttemptOutcome::Success);
}

#[tokio::test]
async fn rate_limited_provider_is_recorded_but_not_penalized() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok("alpha", 200, &ok_body("first"));
    transport.push_ok("beta", 200, &ok_body("second"));

    let mut cfg = config("");
    cfg.providers[0].requests_per_minute = 1;
    let router = router(&cfg, transport.clone());

    let first = router.generate(GenerationRequest::new("one")).await.unwrap();
    assert_eq!(first.provider, "alpha");

    // Alpha's minute budget is spent; the denial appears in the trail
    // without a network call and without a health penalty.
    let second = router.generate(GenerationRequest::new("two")).await.unwrap();
    assert_eq!(second.provider, "beta");
    assert_eq!(second.trail.len(), 2);
    assert_eq!(second.trail[0].provider, "alpha");
    assert_eq!(
        second.trail[0].error_kind,
        Some(ProviderErrorKind::RateLimited)
    );
    assert_eq!(second.trail[0].latency_ms, 0);
    assert_eq!(transport.calls(), vec!["alpha", "beta"]);

    let statuses = router.provider_statuses();
    let alpha = statuses.iter().find(|s| s.name == "alpha").unwrap();
    assert_eq!(alpha.circuit_state, CircuitState::Closed);
    assert!((alpha.success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_recovers_through_half_open() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok("alpha", 500, "");
    transport.push_ok("alpha", 500, "");
    transport.push_ok("alpha", 200, &ok_body("alpha recovered"));
    for _ in 0..3 {
        transport.push_ok("beta", 200, &ok_body("beta"));
    }

    let cfg = config(
        r#"
[breaker]
failure_threshold = 2
window_secs = 60
cooldown_secs = 1
"#,
    );
    let router = router(&cfg, transport.clone());

    // Two consecutive failures trip alpha's breaker.
    for _ in 0..2 {
        let result = router.generate(GenerationRequest::new("x")).await.unwrap();
        assert_eq!(result.provider, "beta");
    }
    let alpha_state = |router: &FallbackRouter| {
        router
            .provider_statuses()
            .into_iter()
            .find(|s| s.name == "alpha")
            .unwrap()
            .circuit_state
    };
    assert_eq!(alpha_state(&router), CircuitState::Open);

    // While open, alpha is skipped without a trail entry.
    let during_cooldown = router.generate(GenerationRequest::new("x")).await.unwrap();
    assert_eq!(during_cooldown.provider, "beta");
    assert_eq!(during_cooldown.trail.len(), 1);

    // After the cooldown a single trial request goes through; success
    // closes the circuit again.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(alpha_state(&router), CircuitState::HalfOpen);

    let recovered = router.generate(GenerationRequest::new("x")).await.unwrap();
    assert_eq!(recovered.provider, "alpha");
    assert_eq!(recovered.content, "alpha recovered");
    assert_eq!(alpha_state(&router), CircuitState::Closed);
    assert_eq!(
        transport.calls(),
        vec!["alpha", "beta", "alpha", "beta", "beta", "alpha"]
    );
}

#[tokio::test]
async fn cancellation_aborts_in_flight_attempt() {
    let router = router(&config(""), Arc::new(StalledTransport));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = router
        .generate_with_cancel(GenerationRequest::new("never finishes"), cancel)
        .await
        .expect_err("cancellation should abort the call");
    // The call returns promptly after the 50ms cancellation, not after
    // the provider timeout.
    assert!(started.elapsed() < Duration::from_millis(150));

    let Error::Cancelled(aggregate) = err else {
        panic!("expected cancelled error, got {err}");
    };
    // The abandoned in-flight attempt is recorded so health statistics
    // reflect it.
    assert_eq!(aggregate.attempts.len(), 1);
    assert_eq!(aggregate.attempts[0].provider, "alpha");
    assert_eq!(
        aggregate.attempts[0].error_kind,
        Some(ProviderErrorKind::Timeout)
    );

    let statuses = router.provider_statuses();
    let alpha = statuses.iter().find(|s| s.name == "alpha").unwrap();
    assert!(alpha.success_rate < 1.0);
}

#[tokio::test]
async fn exhaustion_reports_every_attempt() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok("alpha", 429, r#"{"error": {"message": "slow down"}}"#);
    transport.push(
        "beta",
        Err(TransportError::Connect("connection refused".to_string())),
    );

    let router = router(&config(""), transport.clone());
    let err = router
        .generate(GenerationRequest::new("doomed"))
        .await
        .expect_err("both providers fail");

    let Error::Exhausted(aggregate) = err else {
        panic!("expected exhaustion, got {err}");
    };
    assert_eq!(aggregate.attempts.len(), 2);
    assert_eq!(
        aggregate.attempts[0].error_kind,
        Some(ProviderErrorKind::RateLimited)
    );
    assert_eq!(
        aggregate.attempts[1].error_kind,
        Some(ProviderErrorKind::Transient5xx)
    );
    let rendered = format!("{aggregate}");
    assert!(rendered.contains("alpha=rate_limited"));
    assert!(rendered.contains("beta=transient_5xx"));
}
