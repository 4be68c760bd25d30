//! Credential resolution
//!
//! Descriptors carry only an opaque reference (an environment variable
//! name by default); the value is resolved once at router construction
//! through this seam and kept out of configuration, logs, and errors.

/// Resolves an opaque credential reference to an API key
pub trait SecretStore: Send + Sync {
    /// Resolve `reference` to a key, or `None` if it is not available
    fn resolve(&self, reference: &str) -> Option<String>;
}

/// Default store backed by process environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn resolve(&self, reference: &str) -> Option<String> {
        std::env::var(reference).ok().filter(|v| !v.is_empty())
    }
}
