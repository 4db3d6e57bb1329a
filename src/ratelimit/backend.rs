//! Backend trait for abstracting coordination store clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::key::StoreKey;
use super::spec::RateSpec;
use crate::error::Result;

/// Outcome of one evaluation of the admission script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the unit of work may proceed now
    pub admitted: bool,
    /// Estimated wait until a slot frees; zero when admitted
    pub retry_after: Duration,
    /// Admissions counted in the window after this evaluation
    pub in_window: u64,
}

impl Decision {
    pub fn admitted(in_window: u64) -> Self {
        Self {
            admitted: true,
            retry_after: Duration::ZERO,
            in_window,
        }
    }

    pub fn denied(retry_after: Duration, in_window: u64) -> Self {
        Self {
            admitted: false,
            retry_after,
            in_window,
        }
    }
}

/// Capability the rate limiter needs from a coordination store.
///
/// Each method runs as one atomic operation in the store, against the
/// store's own clock. Implementations must be safe to call from many tasks
/// at once.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Discard expired admissions for `key`, then either record a new
    /// admission tagged with `token` or report how long until a slot frees.
    ///
    /// A denial leaves the recorded admissions untouched.
    async fn evaluate_admission(
        &self,
        key: &StoreKey,
        spec: &RateSpec,
        token: &str,
    ) -> Result<Decision>;

    /// Count admissions currently inside the window without writing.
    async fn window_count(&self, key: &StoreKey, spec: &RateSpec) -> Result<u64>;

    /// The store's notion of "now".
    async fn server_time(&self) -> Result<Duration>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn evaluate_admission(
        &self,
        key: &StoreKey,
        spec: &RateSpec,
        token: &str,
    ) -> Result<Decision> {
        (**self).evaluate_admission(key, spec, token).await
    }

    async fn window_count(&self, key: &StoreKey, spec: &RateSpec) -> Result<u64> {
        (**self).window_count(key, spec).await
    }

    async fn server_time(&self) -> Result<Duration> {
        (**self).server_time().await
    }
}
