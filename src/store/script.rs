//! Lua scripts executed atomically inside Redis.
//!
//! Window state for a key is a sorted set whose members are admission
//! tokens and whose scores are admission times in microseconds, read from
//! the server's `TIME` so every caller shares one clock.
//!
//! Numbers are passed to `redis.call` as Lua numbers, which Redis formats
//! with `%.17g`; microsecond timestamps stay exact well past the year 2200.
//!
//! `ADMIT` reads `TIME` and then writes, which Redis before 5.0 only allows
//! after `redis.replicate_commands()`. Requires Redis 3.2 or newer.

/// KEYS[1] = window key
/// ARGV[1] = quota, ARGV[2] = window in microseconds, ARGV[3] = admission token
///
/// Returns `{admitted, retry_after_us, in_window}`.
pub const ADMIT: &str = r#"
local key = KEYS[1]
local quota = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local token = ARGV[3]

redis.replicate_commands()
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)

if count < quota then
  redis.call('ZADD', key, now, token)
  redis.call('PEXPIRE', key, math.ceil(window / 1000))
  return {1, 0, redis.call('ZCARD', key)}
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local retry = tonumber(oldest[2]) + window - now
if retry < 0 then
  retry = 0
end
return {0, retry, count}
"#;

/// KEYS[1] = window key
/// ARGV[1] = window in microseconds
///
/// Returns the number of admissions newer than `now - window`. Never writes.
pub const COUNT: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
return redis.call('ZCOUNT', KEYS[1], now - tonumber(ARGV[1]) + 1, '+inf')
"#;
