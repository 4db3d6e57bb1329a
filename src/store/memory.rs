//! In-process backend with the same admission semantics as the Redis script.
//!
//! State is not shared across processes, so this backend only coordinates
//! tasks within one process. It is what the test-suite runs against, since
//! its clock follows tokio's (pausable) time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use crate::error::Result;
use crate::ratelimit::{Backend, Decision, RateSpec, StoreKey};

/// Evaluations between two sweeps of expired keys.
const DEFAULT_RECLAIM_INTERVAL: u64 = 1024;

/// `at + window`, or `None` when that lies beyond what `Instant` can hold.
fn deadline(at: Instant, window: Duration) -> Option<Instant> {
    at.checked_add(window)
}

/// Admissions recorded for one key.
#[derive(Debug)]
struct Window {
    /// (admitted at, token), oldest first
    entries: VecDeque<(Instant, String)>,
    /// Equivalent of the key TTL in Redis; `None` never expires
    expires_at: Option<Instant>,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            entries: VecDeque::new(),
            expires_at: Some(now),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Drop everything admitted at or before `now - window`.
    fn prune(&mut self, now: Instant, window: Duration) {
        if self.is_expired(now) {
            self.entries.clear();
            return;
        }
        while let Some((admitted_at, _)) = self.entries.front() {
            match deadline(*admitted_at, window) {
                Some(end) if end <= now => {
                    self.entries.pop_front();
                }
                _ => break,
            }
        }
    }

    fn live_count(&self, now: Instant, window: Duration) -> u64 {
        if self.is_expired(now) {
            return 0;
        }
        self.entries
            .iter()
            .filter(|(admitted_at, _)| deadline(*admitted_at, window).map_or(true, |end| end > now))
            .count() as u64
    }
}

/// A [`Backend`] that keeps window state in a concurrent map.
///
/// Each evaluation holds the map's lock for its key, so evaluations for one
/// key are serialized exactly like script executions in Redis. Expired keys
/// are swept every `reclaim_interval` evaluations.
#[derive(Debug)]
pub struct MemoryBackend {
    windows: DashMap<String, Window>,
    started: Instant,
    evaluations: AtomicU64,
    reclaim_interval: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_reclaim_interval(DEFAULT_RECLAIM_INTERVAL)
    }

    /// Sweep expired keys once every `interval` evaluations (at least 1).
    pub fn with_reclaim_interval(interval: u64) -> Self {
        Self {
            windows: DashMap::new(),
            started: Instant::now(),
            evaluations: AtomicU64::new(0),
            reclaim_interval: interval.max(1),
        }
    }

    /// Drop keys whose TTL has passed, like Redis expiry does.
    ///
    /// Returns the number of keys removed.
    pub fn reclaim_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        let removed = before - self.windows.len();
        if removed > 0 {
            trace!(removed = removed, "Reclaimed expired keys");
        }
        removed
    }

    /// Number of keys currently held, expired or not.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    /// Runs before any key lock is taken; `retain` needs every shard.
    fn maybe_reclaim(&self) {
        let seen = self.evaluations.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.reclaim_interval == 0 {
            self.reclaim_expired();
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn evaluate_admission(
        &self,
        key: &StoreKey,
        spec: &RateSpec,
        token: &str,
    ) -> Result<Decision> {
        self.maybe_reclaim();

        let now = Instant::now();
        let window_len = spec.window();

        let mut window = self
            .windows
            .entry(key.as_str().to_string())
            .or_insert_with(|| Window::new(now));
        window.prune(now, window_len);

        let count = window.entries.len() as u64;
        if count < spec.quota() {
            window.entries.retain(|(_, existing)| existing != token);
            window.entries.push_back((now, token.to_string()));
            window.expires_at = deadline(now, window_len);

            trace!(key = %key, in_window = window.entries.len(), "Recorded admission");
            return Ok(Decision::admitted(window.entries.len() as u64));
        }

        let retry_after = window
            .entries
            .front()
            .map(|(oldest, _)| match deadline(*oldest, window_len) {
                Some(end) => end.saturating_duration_since(now),
                None => window_len,
            })
            .unwrap_or(Duration::ZERO);
        Ok(Decision::denied(retry_after, count))
    }

    async fn window_count(&self, key: &StoreKey, spec: &RateSpec) -> Result<u64> {
        let now = Instant::now();
        Ok(self
            .windows
            .get(key.as_str())
            .map(|window| window.live_count(now, spec.window()))
            .unwrap_or(0))
    }

    async fn server_time(&self) -> Result<Duration> {
        Ok(self.started.elapsed())
    }
}
