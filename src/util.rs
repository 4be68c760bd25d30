//! Shared credential-hygiene helpers
//!
//! Every provider error message passes through this module before it is
//! stored in an attempt trail, logged, or returned to a caller.

/// Characters of a key left visible at each edge when masking
const MASK_EDGE_CHARS: usize = 4;

/// Keys at or below this length are fully masked; showing any edge of a
/// short key would reveal most of it
const MASK_FULLY_BELOW: usize = 2 * MASK_EDGE_CHARS;

/// Maximum length of a provider error message kept in the attempt trail
const MAX_ERROR_LEN: usize = 300;

/// Sensitive patterns that must never appear in stored error text
const SENSITIVE_PATTERNS: &[&str] = &[
    "api_key",
    "api-key",
    "apikey",
    "x-api-key",
    "authorization",
    "bearer",
    "credential",
    "secret",
    "token",
];

/// Render a key as `sk-a...wxyz` for logs and `Debug` output.
///
/// Keys too short to keep anything hidden come back as `****`.
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= MASK_FULLY_BELOW {
        return "****".to_string();
    }
    format!(
        "{}...{}",
        &key[..MASK_EDGE_CHARS],
        &key[key.len() - MASK_EDGE_CHARS..]
    )
}

/// Redact a provider error message before it enters an attempt trail.
///
/// Removes any occurrence of the live API key, replaces messages that
/// mention credential material with a generic one, and truncates long
/// provider bodies.
#[must_use]
pub fn redact_error(error: &str, api_key: &str) -> String {
    // Any non-empty key is scrubbed, however short; a short configured
    // key in an error body is still a leak.
    let mut text = if !api_key.is_empty() && error.contains(api_key) {
        error.replace(api_key, "[redacted]")
    } else {
        error.to_string()
    };

    let lower = text.to_lowercase();
    for pattern in SENSITIVE_PATTERNS {
        if lower.contains(pattern) {
            return "provider rejected the request (credential details redacted)".to_string();
        }
    }

    if text.len() > MAX_ERROR_LEN {
        text = format!("{}...(truncated)", truncate_safe(&text, MAX_ERROR_LEN));
    }
    text
}

/// Truncate a string to at most `max` bytes without splitting a UTF-8
/// character.
#[must_use]
pub fn truncate_safe(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
