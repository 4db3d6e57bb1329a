//! Scoped and wrapping forms of [`RateLimiter::acquire`].
//!
//! Both reduce to one `acquire` before the work and the no-op `release`
//! after it; they differ only in how the work is handed over.

use std::future::Future;

use super::backend::Backend;
use super::limiter::{Admission, RateLimiter};
use super::spec::RateSpec;
use crate::error::Result;

/// Held for the duration of one admitted unit of work.
///
/// Dropping the permit releases it, also when the work fails or panics.
#[must_use = "the admitted work should run while the permit is held"]
pub struct Permit<'a, B: Backend + ?Sized> {
    limiter: &'a RateLimiter<B>,
    admission: Admission,
}

impl<B: Backend + ?Sized> Permit<'_, B> {
    pub fn admission(&self) -> Admission {
        self.admission
    }
}

impl<B: Backend + ?Sized> Drop for Permit<'_, B> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

impl<B: Backend + ?Sized> RateLimiter<B> {
    /// Wait for admission and return a guard scoping the admitted work.
    pub async fn enter(&self, unique_key: &str, spec: &RateSpec) -> Result<Permit<'_, B>> {
        let admission = self.acquire(unique_key, spec).await?;
        Ok(Permit {
            limiter: self,
            admission,
        })
    }

    /// Wait for admission, then run `work` and hand back its output as is.
    ///
    /// ```no_run
    /// # async fn demo() -> turnstile::error::Result<()> {
    /// use std::sync::Arc;
    /// use turnstile::ratelimit::{RateLimiter, RateSpec};
    /// use turnstile::store::RedisBackend;
    ///
    /// let backend = Arc::new(RedisBackend::connect("redis://127.0.0.1/").await?);
    /// let limiter = RateLimiter::new(backend);
    /// let spec = RateSpec::per_minute(1200)?;
    ///
    /// let quote = limiter.run("quotes-api", &spec, || async { 42 }).await?;
    /// assert_eq!(quote, 42);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run<F, Fut, T>(&self, unique_key: &str, spec: &RateSpec, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.enter(unique_key, spec).await?;
        Ok(work().await)
    }

    /// Bind a key and spec once, for repeated calls through [`Limited::call`].
    pub fn limited(&self, unique_key: impl Into<String>, spec: RateSpec) -> Limited<'_, B> {
        Limited {
            limiter: self,
            unique_key: unique_key.into(),
            spec,
        }
    }
}

/// A key and rate spec bound to a limiter, applied to every call.
pub struct Limited<'a, B: Backend + ?Sized> {
    limiter: &'a RateLimiter<B>,
    unique_key: String,
    spec: RateSpec,
}

impl<B: Backend + ?Sized> Limited<'_, B> {
    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    pub fn spec(&self) -> &RateSpec {
        &self.spec
    }

    /// Run `work` once admitted.
    pub async fn call<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.limiter.run(&self.unique_key, &self.spec, work).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use std::sync::Arc;
    use std::time::Duration;

    fn limiter() -> RateLimiter<MemoryBackend> {
        RateLimiter::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_work_output() {
        let limiter = limiter();
        let spec = RateSpec::per_second(5).unwrap();

        for i in 0..5 {
            let out = limiter.run("echo", &spec, || async move { i }).await.unwrap();
            assert_eq!(out, i);
        }
        assert_eq!(limiter.window_count("echo", &spec).await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_propagates_work_failure_unchanged() {
        let limiter = limiter();
        let spec = RateSpec::per_second(5).unwrap();

        let out: std::result::Result<(), &str> = limiter
            .run("fallible", &spec, || async { Err("upstream down") })
            .await
            .unwrap();
        assert_eq!(out, Err("upstream down"));
        // The admission still counts
        assert_eq!(limiter.window_count("fallible", &spec).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_does_not_start_work_on_config_error() {
        let limiter = limiter();
        let spec = RateSpec::per_second(5).unwrap();
        let mut ran = false;

        let err = limiter
            .run("bad key", &spec, || {
                ran = true;
                async {}
            })
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(!ran);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_scopes_work() {
        let limiter = limiter();
        let spec = RateSpec::per_second(1).unwrap();

        {
            let permit = limiter.enter("scoped", &spec).await.unwrap();
            assert_eq!(permit.admission().attempts, 1);
        }

        // Dropping the permit does not give the slot back
        assert!(!limiter.try_acquire("scoped", &spec).await.unwrap().admitted);

        let permit = limiter.enter("scoped", &spec).await.unwrap();
        assert_eq!(permit.admission().attempts, 2);
        assert!(permit.admission().waited >= Duration::from_millis(995));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limited_wrapper_shares_quota_across_calls() {
        let limiter = limiter();
        let fetch = limiter.limited(crate::function_key!(fetch), RateSpec::per_second(2).unwrap());

        assert_eq!(fetch.call(|| async { "a" }).await.unwrap(), "a");
        assert_eq!(fetch.call(|| async { "b" }).await.unwrap(), "b");
        assert_eq!(
            limiter.window_count(fetch.unique_key(), fetch.spec()).await.unwrap(),
            2
        );
    }

    #[test]
    fn test_panicking_work_keeps_admission() {
        let limiter = limiter();
        let spec = RateSpec::per_second(1).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio_test::block_on(async {
                let _permit = limiter.enter("panicky", &spec).await.unwrap();
                panic!("work failed");
            })
        }));
        assert!(outcome.is_err());

        let decision = tokio_test::block_on(limiter.try_acquire("panicky", &spec)).unwrap();
        assert!(!decision.admitted);
    }
}
