//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::backend::{Backend, Decision};
use super::key::{KeyBuilder, StoreKey};
use super::spec::RateSpec;
use crate::error::{Result, TurnstileError};

/// Shortest pause between a denied attempt and the next one, so a store
/// reporting a zero retry hint cannot drive a spin loop.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Summary of a successful [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    /// Number of admission script evaluations, including the admitting one
    pub attempts: u32,
    /// Time spent suspended between denied attempts
    pub waited: Duration,
}

/// Admission control over a shared coordination store.
///
/// The limiter keeps no window state of its own: every decision is made by
/// the backend in one atomic step, so any number of limiters, in any number
/// of processes, can share a quota through the same store. It is safe to
/// share across tasks.
pub struct RateLimiter<B: Backend + ?Sized> {
    backend: Arc<B>,
    keys: KeyBuilder,
}

impl<B: Backend + ?Sized> RateLimiter<B> {
    /// Create a rate limiter with the default key prefix.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            keys: KeyBuilder::default(),
        }
    }

    /// Create a rate limiter with a custom key builder.
    pub fn with_keys(backend: Arc<B>, keys: KeyBuilder) -> Self {
        Self { backend, keys }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Wait until one unit of work under `unique_key` may proceed.
    ///
    /// Denials are waited out for the store's retry hint and retried with
    /// no upper bound; wrap the call in a timeout (or use
    /// [`acquire_timeout`](Self::acquire_timeout)) for a hard deadline.
    /// Dropping the future while it waits leaves no state behind.
    pub async fn acquire(&self, unique_key: &str, spec: &RateSpec) -> Result<Admission> {
        let key = self.keys.build(unique_key)?;
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let decision = self.evaluate(&key, spec).await?;

            if decision.admitted {
                let waited = started.elapsed();
                trace!(
                    key = %key,
                    attempts = attempts,
                    waited = ?waited,
                    "Admitted"
                );
                return Ok(Admission { attempts, waited });
            }

            let delay = decision.retry_after.max(MIN_RETRY_DELAY);
            debug!(
                key = %key,
                spec = %spec,
                in_window = decision.in_window,
                retry_after = ?delay,
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Make a single admission attempt without waiting.
    pub async fn try_acquire(&self, unique_key: &str, spec: &RateSpec) -> Result<Decision> {
        let key = self.keys.build(unique_key)?;
        self.evaluate(&key, spec).await
    }

    /// [`acquire`](Self::acquire) with a deadline.
    ///
    /// Fails with [`TurnstileError::DeadlineExceeded`] if no admission
    /// happens within `timeout`. An admission the store commits just as the
    /// deadline fires is not refunded.
    pub async fn acquire_timeout(
        &self,
        unique_key: &str,
        spec: &RateSpec,
        timeout: Duration,
    ) -> Result<Admission> {
        match tokio::time::timeout(timeout, self.acquire(unique_key, spec)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(unique_key = %unique_key, timeout = ?timeout, "Admission deadline exceeded");
                Err(TurnstileError::DeadlineExceeded(timeout))
            }
        }
    }

    /// Release an admission.
    ///
    /// Admissions age out of the window on their own, so there is nothing
    /// to free; a unit counts for exactly one window from its admission.
    pub fn release(&self) {
        trace!("Release requested, nothing to free");
    }

    /// Count admissions currently in the window for `unique_key` without
    /// recording one.
    pub async fn window_count(&self, unique_key: &str, spec: &RateSpec) -> Result<u64> {
        let key = self.keys.build(unique_key)?;
        self.backend.window_count(&key, spec).await
    }

    async fn evaluate(&self, key: &StoreKey, spec: &RateSpec) -> Result<Decision> {
        let token = Uuid::new_v4().to_string();
        trace!(key = %key, spec = %spec, token = %token, "Evaluating admission");

        self.backend
            .evaluate_admission(key, spec, &token)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Admission evaluation failed");
                e
            })
    }
}

impl<B: Backend + ?Sized> Clone for RateLimiter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            keys: self.keys.clone(),
        }
    }
}

impl<B: Backend + ?Sized> std::fmt::Debug for RateLimiter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("keys", &self.keys)
            .finish()
    }
}
