//! Provider registry
//!
//! Validates the configured provider list once at startup and exposes it
//! as immutable descriptors. Insertion order is preserved and used as the
//! tie-break for same-tier providers.

use crate::adapters::AdapterKind;
use crate::config::{ProviderConfig, RouterConfig};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Immutable description of one provider
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Unique provider name
    pub name: String,
    /// Priority tier; lower is tried earlier
    pub tier: u8,
    /// Base endpoint URL
    pub endpoint: String,
    /// Environment variable naming the credential; the value is resolved
    /// by a [`crate::secrets::SecretStore`] and never stored here
    pub api_key_env: String,
    /// Wire protocol family
    pub adapter: AdapterKind,
    /// Default model id
    pub default_model: String,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Per-request timeout
    pub timeout: Duration,
    /// Requests-per-minute admission budget
    pub requests_per_minute: u32,
    /// Optional daily budget
    pub requests_per_day: Option<u32>,
    /// Whether this provider is a candidate at all
    pub enabled: bool,
}

impl ProviderDescriptor {
    fn from_config(config: &ProviderConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(Error::Config("provider with empty name".to_string()));
        }
        if config.endpoint.trim().is_empty() {
            return Err(Error::Config(format!(
                "provider '{}' has no endpoint",
                config.name
            )));
        }
        if config.api_key_env.trim().is_empty() {
            return Err(Error::Config(format!(
                "provider '{}' has no credential reference",
                config.name
            )));
        }
        if config.default_model.trim().is_empty() {
            return Err(Error::Config(format!(
                "provider '{}' has no default model",
                config.name
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            tier: config.tier,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
            adapter: config.adapter,
            default_model: config.default_model.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_millis(config.timeout_ms),
            requests_per_minute: config.requests_per_minute,
            requests_per_day: config.requests_per_day,
            enabled: config.enabled,
        })
    }
}

/// Validated, immutable provider set
#[derive(Debug)]
pub struct Registry {
    providers: Vec<ProviderDescriptor>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry from configuration, failing fast on missing
    /// required fields or duplicate names
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        if config.providers.is_empty() {
            return Err(Error::Config("no providers configured".to_string()));
        }

        let mut providers = Vec::with_capacity(config.providers.len());
        let mut index = HashMap::with_capacity(config.providers.len());

        for provider_config in &config.providers {
            let descriptor = ProviderDescriptor::from_config(provider_config)?;
            if index
                .insert(descriptor.name.clone(), providers.len())
                .is_some()
            {
                return Err(Error::Config(format!(
                    "duplicate provider name '{}'",
                    descriptor.name
                )));
            }
            providers.push(descriptor);
        }

        Ok(Self { providers, index })
    }

    /// All descriptors, in configuration order
    #[must_use]
    pub fn list(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// Look up a descriptor by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.index.get(name).map(|&i| &self.providers[i])
    }

    /// Number of configured providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty (never true after `from_config`)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
