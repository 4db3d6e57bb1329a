//! Coordination key generation.
//!
//! Every key this crate writes lives under a reserved namespace prefix so
//! that quotas never collide with unrelated data in the same store. The
//! layout `"{prefix}:{unique_key}"` is a persisted contract: processes
//! running different versions must derive the same key to share a quota.

use crate::error::{Result, TurnstileError};

/// Namespace prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "turnstile";

/// Longest key segment accepted, in bytes.
const MAX_SEGMENT_LEN: usize = 1024;

/// A fully namespaced key in the coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StoreKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives [`StoreKey`]s from caller-supplied identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    /// Create a key builder with a custom namespace prefix.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_segment("key prefix", &prefix)?;
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the store key for `unique_key`.
    ///
    /// Deterministic and side-effect free.
    pub fn build(&self, unique_key: &str) -> Result<StoreKey> {
        validate_segment("unique key", unique_key)?;
        Ok(StoreKey(format!("{}:{}", self.prefix, unique_key)))
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

/// Redis keys are binary safe, but whitespace and control characters break
/// `redis-cli` tooling and log lines, so they are rejected here.
fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TurnstileError::Config(format!("{} must not be empty", what)));
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(TurnstileError::Config(format!(
            "{} is {} bytes, longer than the {} byte limit",
            what,
            value.len(),
            MAX_SEGMENT_LEN
        )));
    }
    if let Some(c) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(TurnstileError::Config(format!(
            "{} {:?} contains disallowed character {:?}",
            what, value, c
        )));
    }
    Ok(())
}

/// Derive a unique key from the calling module path and a function name.
///
/// ```
/// let key = turnstile::function_key!(fetch_quote);
/// assert!(key.ends_with("::fetch_quote"));
/// ```
#[macro_export]
macro_rules! function_key {
    ($name:ident) => {
        concat!(module_path!(), "::", stringify!($name))
    };
}
