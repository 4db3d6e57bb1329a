//! Error types for Turnstile.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// A denied admission is never an error: [`RateLimiter::acquire`] waits it
/// out. Only invalid input and store failures surface here.
///
/// [`RateLimiter::acquire`]: crate::ratelimit::RateLimiter::acquire
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Invalid rate spec, key or configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store answered, but not with something we understand
    #[error("Backend error: {0}")]
    Backend(String),

    /// The store could not be reached or rejected the script
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An externally imposed deadline passed before admission
    #[error("Admission deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    /// Whether this error came from invalid caller input or configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, TurnstileError::Config(_))
    }

    /// Whether this error came from the coordination store.
    pub fn is_backend(&self) -> bool {
        matches!(self, TurnstileError::Backend(_) | TurnstileError::Redis(_))
    }
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
