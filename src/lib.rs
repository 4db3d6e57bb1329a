//! Turnstile - Distributed Admission Control
//!
//! This crate decides, for every unit of work requested by any number of
//! processes, whether it may proceed now, so that no more than a configured
//! quota is admitted within any rolling window. Processes share nothing but
//! a Redis server; each decision is one atomic script evaluation there.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{Result, TurnstileError};
pub use ratelimit::{Admission, Backend, Decision, KeyBuilder, RateLimiter, RateSpec};
