//! Admission control: rate specs, store keys, the backend capability and
//! the rate limiter built on top of them.

mod backend;
mod key;
mod limiter;
mod permit;
mod spec;

pub use backend::{Backend, Decision};
pub use key::{KeyBuilder, StoreKey, DEFAULT_PREFIX};
pub use limiter::{Admission, RateLimiter};
pub use permit::{Limited, Permit};
pub use spec::{RateSpec, TimeUnit, MAX_WINDOW_MICROS};
