//! Per-provider health tracking and circuit breaking
//!
//! One record per provider, each behind its own mutex so unrelated
//! providers never contend. Reads return snapshots; the record itself is
//! never shared by reference outside this module.
//!
//! Circuit transitions:
//! - Closed → Open when consecutive failures reach the threshold within
//!   the sliding window
//! - Open → HalfOpen lazily on an eligibility check once the cool-down
//!   has elapsed (no background timer)
//! - HalfOpen → Closed when the single trial request succeeds
//! - HalfOpen → Open when the trial fails, restarting the cool-down

use crate::registry::Registry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// EWMA smoothing factor for latency observations
const EWMA_ALPHA: f64 = 0.3;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests permitted
    Closed,
    /// Requests short-circuited locally without a network call
    Open,
    /// A single trial request permitted to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable string label for logs and status output
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds, resolved to durations
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Sliding window within which consecutive failures accumulate
    pub window: Duration,
    /// Cool-down before an open circuit permits a half-open trial
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

impl From<&crate::config::BreakerConfig> for BreakerSettings {
    fn from(config: &crate::config::BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            window: config.window(),
            cooldown: config.cooldown(),
        }
    }
}

#[derive(Debug)]
struct Record {
    success_count: u64,
    failure_count: u64,
    consecutive_failures: u32,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    // Monotonic clock for window/cool-down math
    last_failure_instant: Option<Instant>,
    ewma_latency_ms: f64,
    state: CircuitState,
    opened_at: Option<Instant>,
    disabled: bool,
}

struct Entry {
    record: Mutex<Record>,
    // Gates the single half-open trial across concurrent callers
    trial_in_flight: AtomicBool,
}

/// Read-only copy of a provider's health record
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// Provider name
    pub provider: String,
    /// Lifetime success count
    pub success_count: u64,
    /// Lifetime failure count
    pub failure_count: u64,
    /// Current consecutive failure streak
    pub consecutive_failures: u32,
    /// Wall-clock time of the last success
    pub last_success_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the last failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Smoothed latency in milliseconds
    pub ewma_latency_ms: f64,
    /// Effective circuit state (an expired cool-down reads as half-open)
    pub circuit_state: CircuitState,
    /// Administratively disabled after an auth failure
    pub disabled: bool,
}

impl HealthSnapshot {
    /// Fraction of recorded outcomes that succeeded; a provider with no
    /// history scores 1.0 so it is not penalized before its first call
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

/// One status row for the observability surface
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Provider name
    pub name: String,
    /// Effective circuit state
    pub circuit_state: CircuitState,
    /// Lifetime success rate
    pub success_rate: f64,
    /// Smoothed latency in milliseconds
    pub ewma_latency_ms: f64,
    /// Administratively disabled
    pub disabled: bool,
}

/// Tracks rolling statistics and circuit state for every provider
pub struct HealthTracker {
    entries: HashMap<String, Entry>,
    settings: BreakerSettings,
}

impl HealthTracker {
    /// Create one record per registered provider. EWMA latency is seeded
    /// from the descriptor's timeout so an unproven provider does not win
    /// "fastest" ties against providers with measured low latency.
    #[must_use]
    pub fn from_registry(registry: &Registry, settings: BreakerSettings) -> Self {
        let entries = registry
            .list()
            .iter()
            .map(|descriptor| {
                let record = Record {
                    success_count: 0,
                    failure_count: 0,
                    consecutive_failures: 0,
                    last_success_at: None,
                    last_failure_at: None,
                    last_failure_instant: None,
                    ewma_latency_ms: descriptor.timeout.as_millis() as f64,
                    state: CircuitState::Closed,
                    opened_at: None,
                    disabled: false,
                };
                (
                    descriptor.name.clone(),
                    Entry {
                        record: Mutex::new(record),
                        trial_in_flight: AtomicBool::new(false),
                    },
                )
            })
            .collect();
        Self { entries, settings }
    }

    /// Record the outcome of one attempt and drive the state machine.
    ///
    /// Local rate-limit denials are deliberately not recorded here: a
    /// spent local budget is not evidence of provider-side unhealthiness.
    pub fn record_outcome(&self, provider: &str, success: bool, latency_ms: u64) {
        let Some(entry) = self.entries.get(provider) else {
            return;
        };
        let mut record = lock(&entry.record);
        let now = Utc::now();

        record.ewma_latency_ms =
            EWMA_ALPHA * latency_ms as f64 + (1.0 - EWMA_ALPHA) * record.ewma_latency_ms;

        if success {
            record.success_count += 1;
            record.consecutive_failures = 0;
            record.last_success_at = Some(now);
            if record.state == CircuitState::HalfOpen {
                debug!(provider, "half-open trial succeeded, closing circuit");
                record.state = CircuitState::Closed;
                record.opened_at = None;
            }
            // A success while Open (only reachable through a race) does
            // not close the circuit directly; recovery still goes through
            // the half-open trial.
        } else {
            record.failure_count += 1;
            let streak_alive = record
                .last_failure_instant
                .is_some_and(|at| at.elapsed() <= self.settings.window);
            record.consecutive_failures = if streak_alive {
                record.consecutive_failures + 1
            } else {
                1
            };
            record.last_failure_at = Some(now);
            record.last_failure_instant = Some(Instant::now());

            match record.state {
                CircuitState::Closed
                    if record.consecutive_failures >= self.settings.failure_threshold =>
                {
                    warn!(
                        provider,
                        failures = record.consecutive_failures,
                        "failure threshold reached, opening circuit"
                    );
                    record.state = CircuitState::Open;
                    record.opened_at = Some(Instant::now());
                }
                CircuitState::HalfOpen => {
                    debug!(provider, "half-open trial failed, reopening circuit");
                    record.state = CircuitState::Open;
                    record.opened_at = Some(Instant::now());
                }
                _ => {}
            }
        }

        entry.trial_in_flight.store(false, Ordering::Release);
    }

    /// Whether a request may be sent to `provider` right now.
    ///
    /// Evaluates the lazy Open → HalfOpen transition, and in half-open
    /// state admits exactly one trial at a time via an atomic in-flight
    /// flag.
    #[must_use]
    pub fn is_eligible(&self, provider: &str) -> bool {
        let Some(entry) = self.entries.get(provider) else {
            return false;
        };
        let mut record = lock(&entry.record);
        if record.disabled {
            return false;
        }
        match record.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = record
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.settings.cooldown);
                if !cooled {
                    return false;
                }
                debug!(provider, "cool-down elapsed, moving circuit to half-open");
                record.state = CircuitState::HalfOpen;
                entry.trial_in_flight.store(true, Ordering::Release);
                true
            }
            CircuitState::HalfOpen => entry
                .trial_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    /// Read-only copy of a provider's record
    #[must_use]
    pub fn snapshot(&self, provider: &str) -> Option<HealthSnapshot> {
        let entry = self.entries.get(provider)?;
        let record = lock(&entry.record);
        Some(HealthSnapshot {
            provider: provider.to_string(),
            success_count: record.success_count,
            failure_count: record.failure_count,
            consecutive_failures: record.consecutive_failures,
            last_success_at: record.last_success_at,
            last_failure_at: record.last_failure_at,
            ewma_latency_ms: record.ewma_latency_ms,
            circuit_state: self.effective_state(&record),
            disabled: record.disabled,
        })
    }

    /// Administratively disable a provider for the rest of the process.
    /// Used for auth failures, which do not recover on retry.
    pub fn disable(&self, provider: &str) {
        if let Some(entry) = self.entries.get(provider) {
            warn!(provider, "provider administratively disabled");
            lock(&entry.record).disabled = true;
        }
    }

    /// Explicit administrative reset: re-enables a disabled provider and
    /// closes its circuit. Returns false for unknown providers.
    pub fn reset(&self, provider: &str) -> bool {
        let Some(entry) = self.entries.get(provider) else {
            return false;
        };
        let mut record = lock(&entry.record);
        record.disabled = false;
        record.state = CircuitState::Closed;
        record.opened_at = None;
        record.consecutive_failures = 0;
        entry.trial_in_flight.store(false, Ordering::Release);
        true
    }

    /// Status rows for every tracked provider, in unspecified order
    #[must_use]
    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let record = lock(&entry.record);
                let total = record.success_count + record.failure_count;
                let success_rate = if total == 0 {
                    1.0
                } else {
                    record.success_count as f64 / total as f64
                };
                ProviderStatus {
                    name: name.clone(),
                    circuit_state: self.effective_state(&record),
                    success_rate,
                    ewma_latency_ms: record.ewma_latency_ms,
                    disabled: record.disabled,
                }
            })
            .collect()
    }

    // What the state would read as on the next eligibility check, without
    // claiming the half-open trial slot.
    fn effective_state(&self, record: &Record) -> CircuitState {
        if record.state == CircuitState::Open
            && record
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.settings.cooldown)
        {
            CircuitState::HalfOpen
        } else {
            record.state
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;

    fn tracker(settings: BreakerSettings) -> HealthTracker {
        let config = RouterConfig::from_toml_str(
            r#"
[[providers]]
name = "p"
endpoint = "https://p.example.com"
api_key_env = "P_KEY"
adapter = "openai_chat"
default_model = "m"
timeout_ms = 10000
"#,
        )
        .unwrap();
        let registry = Registry::from_config(&config).unwrap();
        HealthTracker::from_registry(&registry, settings)
    }

    fn fast_settings() -> BreakerSettings {
        BreakerSettings {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_new_provider_is_closed_with_pessimistic_latency() {
        let tracker = tracker(BreakerSettings::default());
        let snapshot = tracker.snapshot("p").unwrap();
        assert_eq!(snapshot.circuit_state, CircuitState::Closed);
        assert_eq!(snapshot.ewma_latency_ms, 10_000.0);
        assert_eq!(snapshot.success_rate(), 1.0);
        assert!(tracker.is_eligible("p"));
    }

    #[test]
    fn test_circuit_opens_at_threshold_only() {
        let tracker = tracker(fast_settings());
        tracker.record_outcome("p", false, 100);
        tracker.record_outcome("p", false, 100);
        assert_eq!(
            tracker.snapshot("p").unwrap().circuit_state,
            CircuitState::Closed
        );
        tracker.record_outcome("p", false, 100);
        assert_eq!(
            tracker.snapshot("p").unwrap().circuit_state,
            CircuitState::Open
        );
        assert!(!tracker.is_eligible("p"));
    }

    #[test]
    fn test_success_resets_streak() {
        let tracker = tracker(fast_settings());
        tracker.record_outcome("p", false, 100);
        tracker.record_outcome("p", false, 100);
        tracker.record_outcome("p", true, 100);
        assert_eq!(tracker.snapshot("p").unwrap().consecutive_failures, 0);
        tracker.record_outcome("p", false, 100);
        tracker.record_outcome("p", false, 100);
        assert_eq!(
            tracker.snapshot("p").unwrap().circuit_state,
            CircuitState::Closed
        );
    }

    #[test]
    fn test_half_open_after_cooldown_admits_single_trial() {
        let tracker = tracker(fast_settings());
        for _ in 0..3 {
            tracker.record_outcome("p", false, 100);
        }
        assert!(!tracker.is_eligible("p"));

        std::thread::sleep(Duration::from_millis(60));
        // First check claims the trial slot, second is refused.
        assert!(tracker.is_eligible("p"));
        assert!(!tracker.is_eligible("p"));
    }

    #[test]
    fn test_trial_success_closes_circuit() {
        let tracker = tracker(fast_settings());
        for _ in 0..3 {
            tracker.record_outcome("p", false, 100);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(tracker.is_eligible("p"));
        tracker.record_outcome("p", true, 100);
        assert_eq!(
            tracker.snapshot("p").unwrap().circuit_state,
            CircuitState::Closed
        );
        assert!(tracker.is_eligible("p"));
    }

    #[test]
    fn test_trial_failure_reopens_circuit() {
        let tracker = tracker(fast_settings());
        for _ in 0..3 {
            tracker.record_outcome("p", false, 100);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(tracker.is_eligible("p"));
        tracker.record_outcome("p", false, 100);
        // Cool-down restarted, so the circuit reads Open again.
        assert!(!tracker.is_eligible("p"));
    }

    #[test]
    fn test_stale_failure_restarts_streak() {
        let settings = BreakerSettings {
            failure_threshold: 2,
            window: Duration::from_millis(30),
            cooldown: Duration::from_secs(30),
        };
        let tracker = tracker(settings);
        tracker.record_outcome("p", false, 100);
        std::thread::sleep(Duration::from_millis(50));
        tracker.record_outcome("p", false, 100);
        // Two failures, but outside the window: streak restarted at 1.
        assert_eq!(tracker.snapshot("p").unwrap().consecutive_failures, 1);
        assert_eq!(
            tracker.snapshot("p").unwrap().circuit_state,
            CircuitState::Closed
        );
    }

    #[test]
    fn test_ewma_moves_toward_observations() {
        let tracker = tracker(BreakerSettings::default());
        tracker.record_outcome("p", true, 100);
        let after_one = tracker.snapshot("p").unwrap().ewma_latency_ms;
        // 0.3 * 100 + 0.7 * 10000
        assert!((after_one - 7030.0).abs() < 1e-6);
        tracker.record_outcome("p", true, 100);
        assert!(tracker.snapshot("p").unwrap().ewma_latency_ms < after_one);
    }

    #[test]
    fn test_disable_and_reset() {
        let tracker = tracker(BreakerSettings::default());
        tracker.disable("p");
        assert!(!tracker.is_eligible("p"));
        assert!(tracker.snapshot("p").unwrap().disabled);
        assert!(tracker.reset("p"));
        assert!(tracker.is_eligible("p"));
        assert!(!tracker.reset("missing"));
    }

    #[test]
    fn test_statuses_reports_all_providers() {
        let tracker = tracker(BreakerSettings::default());
        tracker.record_outcome("p", true, 50);
        tracker.record_outcome("p", false, 50);
        let statuses = tracker.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "p");
        assert!((statuses[0].success_rate - 0.5).abs() < 1e-9);
    }
}
