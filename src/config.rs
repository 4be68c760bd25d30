//! Router configuration
//!
//! Loaded once at startup from TOML; descriptors are immutable for the
//! process lifetime (hot-reload is out of scope).

use crate::adapters::AdapterKind;
use crate::error::{Error, Result};
use crate::strategy::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_true() -> bool {
    true
}
fn default_tier() -> u8 {
    1
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_ms() -> u64 {
    60_000
}
fn default_rpm() -> u32 {
    60
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    60
}
fn default_cooldown_secs() -> u64 {
    30
}

/// Configuration for a single provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name
    pub name: String,
    /// Priority tier; lower tiers are tried earlier when healthy
    #[serde(default = "default_tier")]
    pub tier: u8,
    /// Base endpoint URL; adapters append their own paths
    pub endpoint: String,
    /// Name of the environment variable holding the API key. The key
    /// itself never appears in configuration or logs.
    pub api_key_env: String,
    /// Wire protocol family for this provider
    pub adapter: AdapterKind,
    /// Model used when the caller does not specify one
    pub default_model: String,
    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Local admission budget, requests per minute
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    /// Optional daily request budget
    #[serde(default)]
    pub requests_per_day: Option<u32>,
    /// Disabled providers are never considered as candidates
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Sliding window within which consecutive failures accumulate
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Cool-down before an open circuit permits a half-open trial
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl BreakerConfig {
    /// Sliding failure window as a [`Duration`]
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Cool-down as a [`Duration`]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Top-level router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Candidate ordering policy
    #[serde(default)]
    pub policy: SelectionPolicy,
    /// Circuit breaker thresholds
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Optional global per-call deadline in milliseconds. Worst-case
    /// latency is otherwise the sum of per-candidate timeouts.
    #[serde(default)]
    pub request_deadline_ms: Option<u64>,
    /// Provider list, in priority-tie-break order
    pub providers: Vec<ProviderConfig>,
}

impl RouterConfig {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("invalid router config: {e}")))
    }

    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Global per-call deadline as a [`Duration`], if configured
    #[must_use]
    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_ms.map(Duration::from_millis)
    }
}
