//! Candidate ordering policies
//!
//! Every policy first partitions candidates into those the circuit
//! breaker currently permits and those it does not. Ineligible providers
//! are appended at the end of the order as a last resort only; by the
//! time they would actually be attempted, an open circuit whose cool-down
//! has elapsed reads as half-open and admits a trial.

use crate::health::{CircuitState, HealthSnapshot, HealthTracker};
use crate::registry::ProviderDescriptor;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How candidates are ordered for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Tier ascending, ties broken by configuration order
    Priority,
    /// Lowest observed EWMA latency first
    Fastest,
    /// Priority order rotated by a shared counter on each call
    RoundRobin,
    /// Composite score of tier, latency and success rate (default)
    #[default]
    Intelligent,
}

// Intelligent-policy weights. Tier dominates; a full tier step outweighs
// one second of latency difference or a 50-point success-rate swing.
const TIER_STEP_WEIGHT: f64 = 100.0;
const LATENCY_PENALTY_PER_MS: f64 = 0.01;
const SUCCESS_RATE_BONUS: f64 = 20.0;

fn score(descriptor: &ProviderDescriptor, snapshot: &HealthSnapshot) -> f64 {
    let tier_weight = TIER_STEP_WEIGHT * f64::from(u8::MAX - descriptor.tier);
    let latency_penalty = snapshot.ewma_latency_ms * LATENCY_PENALTY_PER_MS;
    let success_bonus = snapshot.success_rate() * SUCCESS_RATE_BONUS;
    tier_weight - latency_penalty + success_bonus
}

/// Order `candidates` for one request under `policy`.
///
/// `candidates` must be in registry (configuration) order; that order is
/// the stable tie-break for same-tier providers.
pub(crate) fn order<'a>(
    policy: SelectionPolicy,
    candidates: Vec<&'a ProviderDescriptor>,
    health: &HealthTracker,
    round_robin_cursor: &AtomicUsize,
) -> Vec<&'a ProviderDescriptor> {
    let mut eligible = Vec::with_capacity(candidates.len());
    let mut ineligible = Vec::new();

    for descriptor in candidates {
        let Some(snapshot) = health.snapshot(&descriptor.name) else {
            continue;
        };
        if snapshot.circuit_state == CircuitState::Open {
            ineligible.push((descriptor, snapshot));
        } else {
            eligible.push((descriptor, snapshot));
        }
    }

    match policy {
        SelectionPolicy::Priority => {
            eligible.sort_by_key(|(descriptor, _)| descriptor.tier);
        }
        SelectionPolicy::Fastest => {
            eligible.sort_by(|(_, a), (_, b)| {
                a.ewma_latency_ms.total_cmp(&b.ewma_latency_ms)
            });
        }
        SelectionPolicy::RoundRobin => {
            eligible.sort_by_key(|(descriptor, _)| descriptor.tier);
            if !eligible.is_empty() {
                let start = round_robin_cursor.fetch_add(1, Ordering::Relaxed) % eligible.len();
                eligible.rotate_left(start);
            }
        }
        SelectionPolicy::Intelligent => {
            eligible.sort_by(|(da, sa), (db, sb)| score(db, sb).total_cmp(&score(da, sa)));
        }
    }

    // Last-resort tail keeps priority order regardless of policy.
    ineligible.sort_by_key(|(descriptor, _)| descriptor.tier);

    eligible
        .into_iter()
        .chain(ineligible)
        .map(|(descriptor, _)| descriptor)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::health::BreakerSettings;
    use crate::registry::Registry;
    use std::time::Duration;

    fn fixture() -> (Registry, HealthTracker) {
        let config = RouterConfig::from_toml_str(
            r#"
[[providers]]
name = "alpha"
tier = 1
endpoint = "https://alpha.example.com"
api_key_env = "ALPHA_KEY"
adapter = "openai_chat"
default_model = "m"
timeout_ms = 10000

[[providers]]
name = "beta"
tier = 1
endpoint = "https://beta.example.com"
api_key_env = "BETA_KEY"
adapter = "openai_chat"
default_model = "m"
timeout_ms = 10000

[[providers]]
name = "gamma"
tier = 2
endpoint = "https://gamma.example.com"
api_key_env = "GAMMA_KEY"
adapter = "openai_chat"
default_model = "m"
timeout_ms = 10000
"#,
        )
        .unwrap();
        let registry = Registry::from_config(&config).unwrap();
        let settings = BreakerSettings {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(300),
        };
        let health = HealthTracker::from_registry(&registry, settings);
        (registry, health)
    }

    fn names(ordered: &[&ProviderDescriptor]) -> Vec<String> {
        ordered.iter().map(|d| d.name.clone()).collect()
    }

    #[test]
    fn test_priority_is_tier_then_config_order() {
        let (registry, health) = fixture();
        let cursor = AtomicUsize::new(0);
        let ordered = order(
            SelectionPolicy::Priority,
            registry.list().iter().collect(),
            &health,
            &cursor,
        );
        assert_eq!(names(&ordered), ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_fastest_prefers_measured_latency() {
        let (registry, health) = fixture();
        // gamma proves itself fast; alpha/beta keep the pessimistic seed.
        for _ in 0..20 {
            health.record_outcome("gamma", true, 20);
        }
        let cursor = AtomicUsize::new(0);
        let ordered = order(
            SelectionPolicy::Fastest,
            registry.list().iter().collect(),
            &health,
            &cursor,
        );
        assert_eq!(names(&ordered)[0], "gamma");
    }

    #[test]
    fn test_round_robin_rotates_start() {
        let (registry, health) = fixture();
        let cursor = AtomicUsize::new(0);
        let first = order(
            SelectionPolicy::RoundRobin,
            registry.list().iter().collect(),
            &health,
            &cursor,
        );
        let second = order(
            SelectionPolicy::RoundRobin,
            registry.list().iter().collect(),
            &health,
            &cursor,
        );
        assert_eq!(names(&first)[0], "alpha");
        assert_eq!(names(&second)[0], "beta");
    }

    #[test]
    fn test_open_circuit_moves_to_tail() {
        let (registry, health) = fixture();
        for _ in 0..3 {
            health.record_outcome("alpha", false, 100);
        }
        let cursor = AtomicUsize::new(0);
        for policy in [
            SelectionPolicy::Priority,
            SelectionPolicy::Fastest,
            SelectionPolicy::Intelligent,
        ] {
            let ordered = order(policy, registry.list().iter().collect(), &health, &cursor);
            assert_eq!(ordered.last().unwrap().name, "alpha", "policy {policy:?}");
            assert_eq!(ordered.len(), 3);
        }
    }

    #[test]
    fn test_intelligent_prefers_lower_tier() {
        let (registry, health) = fixture();
        // Even a much faster tier-2 provider does not beat tier 1.
        for _ in 0..20 {
            health.record_outcome("gamma", true, 10);
        }
        let cursor = AtomicUsize::new(0);
        let ordered = order(
            SelectionPolicy::Intelligent,
            registry.list().iter().collect(),
            &health,
            &cursor,
        );
        assert_ne!(names(&ordered)[0], "gamma");
    }

    #[test]
    fn test_intelligent_breaks_tier_ties_by_health() {
        let (registry, health) = fixture();
        health.record_outcome("beta", true, 50);
        for _ in 0..5 {
            // Failures under the streak threshold keep beta... alpha degraded
            health.record_outcome("alpha", false, 9000);
            health.record_outcome("alpha", true, 9000);
        }
        let cursor = AtomicUsize::new(0);
        let ordered = order(
            SelectionPolicy::Intelligent,
            registry.list().iter().collect(),
            &health,
            &cursor,
        );
        assert_eq!(names(&ordered)[0], "beta");
    }
}
