//! Redis adapter for the [`Backend`] capability.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::Script;
use tracing::{debug, info, trace};

use super::script;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Backend, Decision, RateSpec, StoreKey};

/// Evaluates admissions with Lua scripts on a Redis server.
///
/// Generic over the async connection type so that both
/// [`ConnectionManager`] and a plain multiplexed connection can be used.
/// The connection is cloned per call; redis-rs multiplexes clones over one
/// socket, so concurrent evaluations never contend on a lock here.
pub struct RedisBackend<C = ConnectionManager> {
    connection: C,
    admit: Script,
    count: Script,
}

impl RedisBackend<ConnectionManager> {
    /// Connect to the Redis server at `url` with an auto-reconnecting
    /// connection manager.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!(url = %url, "Connected to Redis");
        Ok(Self::new(manager))
    }
}

impl<C> RedisBackend<C>
where
    C: ConnectionLike + Clone + Send + Sync,
{
    /// Wrap an existing connection.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            admit: Script::new(script::ADMIT),
            count: Script::new(script::COUNT),
        }
    }
}

impl<C> std::fmt::Debug for RedisBackend<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("admit_sha", &self.admit.get_hash())
            .finish()
    }
}

#[async_trait]
impl<C> Backend for RedisBackend<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn evaluate_admission(
        &self,
        key: &StoreKey,
        spec: &RateSpec,
        token: &str,
    ) -> Result<Decision> {
        let mut con = self.connection.clone();
        let reply: Vec<i64> = self
            .admit
            .key(key.as_str())
            .arg(spec.quota())
            .arg(spec.window_micros())
            .arg(token)
            .invoke_async(&mut con)
            .await?;

        trace!(key = %key, reply = ?reply, "Admission script evaluated");
        decode_decision(&reply)
    }

    async fn window_count(&self, key: &StoreKey, spec: &RateSpec) -> Result<u64> {
        let mut con = self.connection.clone();
        let count: i64 = self
            .count
            .key(key.as_str())
            .arg(spec.window_micros())
            .invoke_async(&mut con)
            .await?;

        u64::try_from(count)
            .map_err(|_| TurnstileError::Backend(format!("negative window count {}", count)))
    }

    async fn server_time(&self) -> Result<Duration> {
        let mut con = self.connection.clone();
        let (secs, micros): (u64, u64) = redis::cmd("TIME").query_async(&mut con).await?;
        debug!(secs = secs, micros = micros, "Read Redis server time");
        Ok(Duration::from_secs(secs) + Duration::from_micros(micros))
    }
}

/// Validate the `{admitted, retry_after_us, in_window}` script reply.
fn decode_decision(reply: &[i64]) -> Result<Decision> {
    let (admitted, retry_us, in_window) = match *reply {
        [admitted, retry_us, in_window] => (admitted, retry_us, in_window),
        _ => {
            return Err(TurnstileError::Backend(format!(
                "admission script returned {} values, expected 3",
                reply.len()
            )))
        }
    };

    let in_window = u64::try_from(in_window).map_err(|_| {
        TurnstileError::Backend(format!("negative window count {}", in_window))
    })?;

    match admitted {
        1 => Ok(Decision::admitted(in_window)),
        0 => {
            let retry_us = u64::try_from(retry_us).map_err(|_| {
                TurnstileError::Backend(format!("negative retry hint {}", retry_us))
            })?;
            Ok(Decision::denied(Duration::from_micros(retry_us), in_window))
        }
        other => Err(TurnstileError::Backend(format!(
            "admission flag must be 0 or 1, got {}",
            other
        ))),
    }
}
