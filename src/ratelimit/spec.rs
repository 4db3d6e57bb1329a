//! Rate specification: how many admissions fit in a rolling window.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};

/// Unit used to express a window length in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Seconds
    #[default]
    Second,
    /// Minutes
    Minute,
    /// Hours
    Hour,
    /// Days
    Day,
}

impl TimeUnit {
    /// Get the duration of one of this unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// Longest accepted window in microseconds. Lua numbers are doubles, so
/// window arithmetic in the store is exact only up to 2^53.
pub const MAX_WINDOW_MICROS: u64 = 1 << 53;

/// Quota of admissions permitted within any rolling window.
///
/// Validated at construction and immutable afterwards. Two specs with the
/// same quota and window are interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateSpec {
    quota: u64,
    window: Duration,
}

impl RateSpec {
    /// Create a new rate spec.
    ///
    /// Fails when `quota` is zero, when `window` is shorter than one
    /// microsecond (the resolution the stores count in), or when it is
    /// longer than [`MAX_WINDOW_MICROS`].
    pub fn new(quota: u64, window: Duration) -> Result<Self> {
        if quota == 0 {
            return Err(TurnstileError::Config(
                "rate quota must be a positive number of admissions".to_string(),
            ));
        }
        if window.as_micros() == 0 {
            return Err(TurnstileError::Config(format!(
                "rate window must be positive, got {:?}",
                window
            )));
        }
        if window.as_micros() > MAX_WINDOW_MICROS as u128 {
            return Err(TurnstileError::Config(format!(
                "rate window {:?} exceeds the {} microsecond limit",
                window, MAX_WINDOW_MICROS
            )));
        }
        Ok(Self { quota, window })
    }

    /// `quota` admissions per `amount` units of time.
    pub fn from_unit(quota: u64, amount: u32, unit: TimeUnit) -> Result<Self> {
        Self::new(quota, unit.duration() * amount)
    }

    pub fn per_second(quota: u64) -> Result<Self> {
        Self::from_unit(quota, 1, TimeUnit::Second)
    }

    pub fn per_minute(quota: u64) -> Result<Self> {
        Self::from_unit(quota, 1, TimeUnit::Minute)
    }

    pub fn per_hour(quota: u64) -> Result<Self> {
        Self::from_unit(quota, 1, TimeUnit::Hour)
    }

    pub fn per_day(quota: u64) -> Result<Self> {
        Self::from_unit(quota, 1, TimeUnit::Day)
    }

    /// Maximum admissions within one window.
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Length of the rolling window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole microseconds, as handed to the store.
    pub fn window_micros(&self) -> u64 {
        self.window.as_micros() as u64
    }
}

impl std::fmt::Display for RateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:?}", self.quota, self.window)
    }
}
